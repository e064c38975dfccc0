//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `evetail_`
//! - 모듈명: `ingest_`, `daemon_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(evetail_core::metrics::INGEST_RECORDS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 입력 파일 경로 레이블 키
pub const LABEL_PATH: &str = "path";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// Ingest: 싱크에 제출된 레코드 수 (counter, label: path)
pub const INGEST_RECORDS_TOTAL: &str = "evetail_ingest_records_total";

/// Ingest: 디코딩 실패로 건너뛴 줄 수 (counter, label: path)
pub const INGEST_MALFORMED_TOTAL: &str = "evetail_ingest_malformed_total";

/// Ingest: 제출 실패로 드롭된 레코드 수 (counter, label: path)
pub const INGEST_SUBMIT_FAILURES_TOTAL: &str = "evetail_ingest_submit_failures_total";

/// Ingest: 성공한 커밋 수 (counter, label: path)
pub const INGEST_COMMITS_TOTAL: &str = "evetail_ingest_commits_total";

/// Ingest: 실패한 커밋 시도 수 (counter, label: path)
pub const INGEST_COMMIT_FAILURES_TOTAL: &str = "evetail_ingest_commit_failures_total";

/// Ingest: 북마크 쓰기 실패 수 (counter, label: path)
pub const INGEST_BOOKMARK_FAILURES_TOTAL: &str = "evetail_ingest_bookmark_failures_total";

/// Ingest: 감지된 로테이션/트렁케이션 수 (counter, label: path)
pub const INGEST_ROTATIONS_TOTAL: &str = "evetail_ingest_rotations_total";

/// Ingest: 마지막으로 커밋된 줄 번호 (gauge, label: path)
pub const INGEST_BOOKMARK_LINE: &str = "evetail_ingest_bookmark_line";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "evetail_daemon_uptime_seconds";

/// Daemon: 실행 중인 파일 프로세서 수 (gauge)
pub const DAEMON_PROCESSORS: &str = "evetail_daemon_processors";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "evetail_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Ingest
    describe_counter!(
        INGEST_RECORDS_TOTAL,
        "Total number of EVE records submitted to the sink"
    );
    describe_counter!(
        INGEST_MALFORMED_TOTAL,
        "Total number of lines skipped because they could not be decoded"
    );
    describe_counter!(
        INGEST_SUBMIT_FAILURES_TOTAL,
        "Total number of records dropped after a failed submit"
    );
    describe_counter!(INGEST_COMMITS_TOTAL, "Total number of successful commits");
    describe_counter!(
        INGEST_COMMIT_FAILURES_TOTAL,
        "Total number of failed commit attempts"
    );
    describe_counter!(
        INGEST_BOOKMARK_FAILURES_TOTAL,
        "Total number of failed bookmark writes"
    );
    describe_counter!(
        INGEST_ROTATIONS_TOTAL,
        "Total number of detected file rotations and truncations"
    );
    describe_gauge!(
        INGEST_BOOKMARK_LINE,
        "Line number of the last persisted bookmark"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "evetail daemon uptime in seconds");
    describe_gauge!(DAEMON_PROCESSORS, "Number of running file processors");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
