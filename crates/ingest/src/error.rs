//! 수집 파이프라인 에러 타입
//!
//! [`IngestError`]는 리더, 북마크, 프로세서에서 발생하는 모든 에러를 표현합니다.
//! `From<IngestError> for EvetailError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use std::path::PathBuf;

use evetail_core::error::{DecodeError, EvetailError, PipelineError, SinkError};

/// 수집 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 입력 파일 열기 실패 (없음, 권한 없음 등)
    #[error("failed to open {}: {source}", path.display())]
    FileOpen {
        /// 입력 파일 경로
        path: PathBuf,
        /// 원인
        source: std::io::Error,
    },

    /// 한 줄을 레코드로 디코딩하지 못함
    #[error("malformed event at line {line_number}: {reason}")]
    MalformedEvent {
        /// 1부터 시작하는 줄 번호
        line_number: u64,
        /// 원본 줄
        line: String,
        /// 디코딩 실패 사유
        reason: DecodeError,
    },

    /// 북마크 파일이 없거나 손상됨
    #[error("no usable bookmark at {}: {reason}", path.display())]
    NoBookmark {
        /// 북마크 파일 경로
        path: PathBuf,
        /// 사유
        reason: String,
    },

    /// 북마크 쓰기 실패
    #[error("failed to write bookmark {}: {source}", path.display())]
    BookmarkIo {
        /// 북마크 파일 경로
        path: PathBuf,
        /// 원인
        source: std::io::Error,
    },

    /// 요청한 줄 수만큼 건너뛰지 못함 (파일이 더 짧음)
    #[error("wanted to skip {wanted} lines, file only had {skipped}")]
    SkipShort {
        /// 요청한 줄 수
        wanted: u64,
        /// 실제로 건너뛴 줄 수
        skipped: u64,
    },

    /// 싱크 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// 레코드 하나에만 영향을 주는 에러인지 확인합니다.
    ///
    /// `true`이면 해당 줄만 건너뛰고 세션을 유지합니다.
    pub fn is_record_local(&self) -> bool {
        matches!(self, Self::MalformedEvent { .. })
    }
}

impl From<IngestError> for EvetailError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Sink(e) => EvetailError::Sink(e),
            IngestError::Io(e) => EvetailError::Io(e),
            other => EvetailError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_event_display() {
        let err = IngestError::MalformedEvent {
            line_number: 42,
            line: "{oops".to_owned(),
            reason: DecodeError::MissingTimestamp,
        };
        let msg = err.to_string();
        assert!(msg.contains("42"));
        assert!(msg.contains("missing timestamp"));
        assert!(err.is_record_local());
    }

    #[test]
    fn file_open_display_contains_path() {
        let err = IngestError::FileOpen {
            path: PathBuf::from("/var/log/suricata/eve.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/var/log/suricata/eve.json"));
        assert!(!err.is_record_local());
    }

    #[test]
    fn skip_short_display() {
        let err = IngestError::SkipShort {
            wanted: 10,
            skipped: 3,
        };
        assert_eq!(err.to_string(), "wanted to skip 10 lines, file only had 3");
    }

    #[test]
    fn converts_to_evetail_error() {
        let err: EvetailError = IngestError::Config {
            field: "batch_size".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            EvetailError::Pipeline(PipelineError::InitFailed(_))
        ));

        let err: EvetailError = IngestError::Sink(SinkError::Commit("down".to_owned())).into();
        assert!(matches!(err, EvetailError::Sink(_)));
    }
}
