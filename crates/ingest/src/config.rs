//! 파일 프로세서 설정
//!
//! [`ProcessorConfig`]는 core의 [`InputConfig`](evetail_core::config::InputConfig)에서
//! 입력 파일 하나에 대한 설정을 만들고, 내부 타이밍 값을 추가합니다.
//!
//! # 사용 예시
//! ```ignore
//! use evetail_core::config::EvetailConfig;
//! use evetail_ingest::config::ProcessorConfig;
//!
//! let core_config = EvetailConfig::default();
//! let config = ProcessorConfig::from_core(&core_config.input, "/var/log/suricata/eve.json");
//! ```

use std::path::PathBuf;
use std::time::Duration;

use evetail_core::config::{InputConfig, MAX_BATCH_SIZE};
use serde_json::{Map, Value};

use crate::error::IngestError;

/// 파일 프로세서 설정
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// 입력 파일 경로
    pub path: PathBuf,
    /// 북마크 디렉토리 (`None`이면 입력 파일 옆)
    pub bookmark_dir: Option<PathBuf>,
    /// 북마크 사용 여부
    pub bookmarks_enabled: bool,
    /// 유효한 북마크가 없을 때 파일 끝에서 시작
    pub start_at_end: bool,
    /// 파일 끝에 도달하면 종료
    pub oneshot: bool,
    /// 배치 크기
    pub batch_size: usize,
    /// 모든 레코드에 병합할 고정 필드
    pub custom_fields: Map<String, Value>,

    // --- 확장 설정 (core에 없는 내부 타이밍) ---
    /// 데이터 끝에서 다음 폴링까지 대기
    pub idle_interval: Duration,
    /// 커밋 실패 후 재시도까지 대기
    pub commit_backoff: Duration,
    /// 파일 열기/북마크 초기화 실패 후 재시도까지 대기
    pub open_retry_interval: Duration,
    /// 통계 로그 주기
    pub report_interval: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/log/suricata/eve.json"),
            bookmark_dir: None,
            bookmarks_enabled: true,
            start_at_end: false,
            oneshot: false,
            batch_size: 1000,
            custom_fields: Map::new(),
            idle_interval: Duration::from_secs(1),
            commit_backoff: Duration::from_secs(1),
            open_retry_interval: Duration::from_secs(1),
            report_interval: Duration::from_secs(60),
        }
    }
}

impl ProcessorConfig {
    /// core의 `InputConfig`에서 입력 파일 하나의 설정을 생성합니다.
    ///
    /// 타이밍 필드는 `report_interval`을 제외하고 기본값이 적용됩니다.
    pub fn from_core(input: &InputConfig, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bookmark_dir: (!input.bookmark_dir.is_empty())
                .then(|| PathBuf::from(&input.bookmark_dir)),
            bookmarks_enabled: !input.disable_bookmarks,
            start_at_end: input.end,
            oneshot: input.oneshot,
            batch_size: input.batch_size,
            custom_fields: input.custom_fields.clone(),
            report_interval: Duration::from_secs(input.report_interval_secs),
            ..Self::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.path.as_os_str().is_empty() {
            return Err(config_error("path", "input path must not be empty"));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(config_error("batch_size", &format!("must be 1-{MAX_BATCH_SIZE}")));
        }

        for (field, value) in [
            ("idle_interval", self.idle_interval),
            ("commit_backoff", self.commit_backoff),
            ("open_retry_interval", self.open_retry_interval),
            ("report_interval", self.report_interval),
        ] {
            if value.is_zero() {
                return Err(config_error(field, "must be greater than 0"));
            }
        }

        Ok(())
    }
}

fn config_error(field: &str, reason: &str) -> IngestError {
    IngestError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 프로세서 설정 빌더
#[derive(Default)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl ProcessorConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 입력 파일 경로를 설정합니다.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// 북마크 디렉토리를 설정합니다.
    pub fn bookmark_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.bookmark_dir = Some(dir.into());
        self
    }

    /// 북마크 사용 여부를 설정합니다.
    pub fn bookmarks_enabled(mut self, enabled: bool) -> Self {
        self.config.bookmarks_enabled = enabled;
        self
    }

    /// 북마크가 없을 때 파일 끝에서 시작할지 설정합니다.
    pub fn start_at_end(mut self, end: bool) -> Self {
        self.config.start_at_end = end;
        self
    }

    /// oneshot 모드를 설정합니다.
    pub fn oneshot(mut self, oneshot: bool) -> Self {
        self.config.oneshot = oneshot;
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// 고정 필드를 추가합니다.
    pub fn custom_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.custom_fields.insert(key.into(), value);
        self
    }

    /// 데이터 끝 대기 간격을 설정합니다.
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.config.idle_interval = interval;
        self
    }

    /// 커밋 재시도 간격을 설정합니다.
    pub fn commit_backoff(mut self, backoff: Duration) -> Self {
        self.config.commit_backoff = backoff;
        self
    }

    /// 파일 열기 재시도 간격을 설정합니다.
    pub fn open_retry_interval(mut self, interval: Duration) -> Self {
        self.config.open_retry_interval = interval;
        self
    }

    /// 통계 로그 주기를 설정합니다.
    pub fn report_interval(mut self, interval: Duration) -> Self {
        self.config.report_interval = interval;
        self
    }

    /// 설정을 검증하고 `ProcessorConfig`를 생성합니다.
    pub fn build(self) -> Result<ProcessorConfig, IngestError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ProcessorConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let mut input = InputConfig {
            bookmark_dir: "/var/lib/evetail".to_owned(),
            end: true,
            disable_bookmarks: true,
            oneshot: true,
            batch_size: 200,
            report_interval_secs: 5,
            ..Default::default()
        };
        input
            .custom_fields
            .insert("sensor".to_owned(), Value::String("s1".to_owned()));

        let config = ProcessorConfig::from_core(&input, "/data/eve.json");
        assert_eq!(config.path, PathBuf::from("/data/eve.json"));
        assert_eq!(config.bookmark_dir, Some(PathBuf::from("/var/lib/evetail")));
        assert!(!config.bookmarks_enabled);
        assert!(config.start_at_end);
        assert!(config.oneshot);
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.report_interval, Duration::from_secs(5));
        assert_eq!(config.custom_fields.len(), 1);
        // 확장 필드는 기본값
        assert_eq!(config.commit_backoff, Duration::from_secs(1));
    }

    #[test]
    fn from_core_empty_bookmark_dir_is_none() {
        let config = ProcessorConfig::from_core(&InputConfig::default(), "/data/eve.json");
        assert!(config.bookmark_dir.is_none());
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let config = ProcessorConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_intervals() {
        let config = ProcessorConfig {
            commit_backoff: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("commit_backoff"));
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = ProcessorConfigBuilder::new()
            .path("/tmp/eve.json")
            .batch_size(50)
            .idle_interval(Duration::from_millis(10))
            .custom_field("site", Value::from(3))
            .build()
            .unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.idle_interval, Duration::from_millis(10));
        assert_eq!(config.custom_fields.get("site"), Some(&Value::from(3)));
    }

    #[test]
    fn builder_rejects_invalid_config() {
        assert!(ProcessorConfigBuilder::new().batch_size(0).build().is_err());
    }
}
