//! 설정 관리 -- evetail.toml 파싱 및 런타임 설정
//!
//! [`EvetailConfig`]는 데몬과 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`EVETAIL_INPUT_BATCH_SIZE=500` 형식)
//! 3. 설정 파일 (`evetail.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), evetail_core::error::EvetailError> {
//! use evetail_core::config::EvetailConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = EvetailConfig::load("evetail.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = EvetailConfig::parse("[input]\nbatch_size = 500")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ConfigError, EvetailError};

/// 배치 크기 상한
pub const MAX_BATCH_SIZE: usize = 100_000;

/// evetail 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvetailConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 입력(EVE 로그 파일) 설정
    #[serde(default)]
    pub input: InputConfig,
    /// 출력(싱크) 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl EvetailConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EvetailError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음, 검증 없음).
    ///
    /// 환경변수로 보완될 수 있는 값이 있으므로 검증은 `load()`에서 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EvetailError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EvetailError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EvetailError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, EvetailError> {
        toml::from_str(toml_str).map_err(|e| {
            EvetailError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `EVETAIL_{SECTION}_{FIELD}`
    /// 예: `EVETAIL_INPUT_PATHS=/var/log/suricata/eve.json,/data/eve2.json`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "EVETAIL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "EVETAIL_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "EVETAIL_GENERAL_PID_FILE");

        // Input
        override_csv(&mut self.input.paths, "EVETAIL_INPUT_PATHS");
        override_string(&mut self.input.bookmark_dir, "EVETAIL_INPUT_BOOKMARK_DIR");
        override_bool(&mut self.input.end, "EVETAIL_INPUT_END");
        override_bool(
            &mut self.input.disable_bookmarks,
            "EVETAIL_INPUT_DISABLE_BOOKMARKS",
        );
        override_bool(&mut self.input.oneshot, "EVETAIL_INPUT_ONESHOT");
        override_usize(&mut self.input.batch_size, "EVETAIL_INPUT_BATCH_SIZE");
        override_bool(&mut self.input.add_filename, "EVETAIL_INPUT_ADD_FILENAME");
        override_csv(&mut self.input.tags, "EVETAIL_INPUT_TAGS");
        override_u64(
            &mut self.input.report_interval_secs,
            "EVETAIL_INPUT_REPORT_INTERVAL_SECS",
        );

        // Output
        override_string(&mut self.output.kind, "EVETAIL_OUTPUT_KIND");
        override_string(&mut self.output.path, "EVETAIL_OUTPUT_PATH");

        // Metrics
        override_bool(&mut self.metrics.enabled, "EVETAIL_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "EVETAIL_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "EVETAIL_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EvetailError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.input.paths.is_empty() {
            return Err(invalid(
                "input.paths",
                "at least one input path is required".to_owned(),
            ));
        }
        for (i, path) in self.input.paths.iter().enumerate() {
            if path.trim().is_empty() {
                return Err(invalid("input.paths", "input path must not be empty".to_owned()));
            }
            // 같은 파일을 두 프로세서가 읽으면 북마크가 서로 덮어써집니다.
            if self.input.paths[..i].contains(path) {
                return Err(invalid(
                    "input.paths",
                    format!("duplicate input path '{path}'"),
                ));
            }
        }

        if self.input.batch_size == 0 || self.input.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "input.batch_size",
                format!("must be 1-{MAX_BATCH_SIZE}"),
            ));
        }

        if self.input.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(invalid("input.tags", "tags must not be empty".to_owned()));
        }

        if self.input.report_interval_secs == 0 {
            return Err(invalid(
                "input.report_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        let valid_kinds = ["file", "stdout"];
        if !valid_kinds.contains(&self.output.kind.as_str()) {
            return Err(invalid(
                "output.kind",
                format!("must be one of: {}", valid_kinds.join(", ")),
            ));
        }
        if self.output.kind == "file" && self.output.path.is_empty() {
            return Err(invalid(
                "output.path",
                "path must not be empty when output kind is 'file'".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "must be greater than 0 when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> EvetailError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 사용 안 함)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 입력 설정
///
/// `paths`의 각 파일마다 독립적인 파일 프로세서가 하나씩 생성됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// 추적할 EVE 로그 파일 경로 목록
    pub paths: Vec<String>,
    /// 북마크 디렉토리 (빈 문자열이면 입력 파일 옆에 `<file>.bookmark` 생성)
    pub bookmark_dir: String,
    /// 유효한 북마크가 없을 때 파일 끝에서 시작
    pub end: bool,
    /// 북마크를 읽지도 쓰지도 않음
    pub disable_bookmarks: bool,
    /// 파일 끝에 도달하면 커밋 후 종료
    pub oneshot: bool,
    /// 배치 크기 (이 개수만큼 제출되면 커밋)
    pub batch_size: usize,
    /// 레코드에 원본 파일명을 기록
    pub add_filename: bool,
    /// 모든 레코드에 붙일 태그
    pub tags: Vec<String>,
    /// 통계 로그 주기 (초)
    pub report_interval_secs: u64,
    /// 모든 레코드에 병합할 고정 최상위 필드
    pub custom_fields: Map<String, Value>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            paths: vec!["/var/log/suricata/eve.json".to_owned()],
            bookmark_dir: String::new(),
            end: false,
            disable_bookmarks: false,
            oneshot: false,
            batch_size: 1000,
            add_filename: true,
            tags: Vec::new(),
            report_interval_secs: 60,
            custom_fields: Map::new(),
        }
    }
}

/// 출력 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 싱크 종류 (file, stdout)
    pub kind: String,
    /// `file` 싱크의 출력 경로 (append 모드)
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: "file".to_owned(),
            path: "/var/lib/evetail/events.json".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9106,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
