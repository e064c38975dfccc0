//! 에러 타입 -- 도메인별 에러 정의

/// evetail 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum EvetailError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 싱크(저장소) 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// 이벤트 디코딩 에러
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),
}

/// 싱크 에러
///
/// `Submit`은 레코드 단위 실패, `Commit`은 배치 단위 실패입니다.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 레코드 제출 실패
    #[error("submit failed: {0}")]
    Submit(String),

    /// 배치 커밋 실패
    #[error("commit failed: {0}")]
    Commit(String),

    /// 싱크 I/O 실패
    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
}

/// EVE 레코드 디코딩 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// JSON 문법 오류
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// 최상위 값이 객체가 아님
    #[error("top-level value is not an object")]
    NotAnObject,

    /// timestamp 필드 누락 또는 문자열 아님
    #[error("missing timestamp")]
    MissingTimestamp,

    /// timestamp 형식 오류
    #[error("invalid timestamp '{value}'")]
    InvalidTimestamp { value: String },
}
