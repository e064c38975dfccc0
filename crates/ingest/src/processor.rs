//! 파일 프로세서 -- 입력 파일 하나의 읽기/보강/제출/커밋/북마크 흐름을 관리합니다.
//!
//! [`FileProcessor`]는 core의 [`Pipeline`] trait을 구현하여
//! `evetail-daemon`에서 동일한 생명주기(start/stop/health_check)로 관리됩니다.
//!
//! # 상태 전이
//! ```text
//! Opening -> Reading -> (EndOfData -> Sleeping -> Reading) -> Stopped
//!    ^                                  |
//!    +---- Sleeping <---- Error <-------+  (열기/북마크 초기화/읽기 실패)
//! ```
//!
//! # 커밋 규칙
//! - `pending >= batch_size` 또는 데이터 끝에서 `pending > 0`이면 배치 경계
//! - 커밋 직전 위치를 캡처하고, 커밋이 성공할 때까지 재시도한 뒤에만 북마크를 씁니다
//! - 재시도 중 정지 요청이 오면 북마크를 전진시키지 않고 종료합니다 (at-least-once)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use evetail_core::error::{EvetailError, PipelineError};
use evetail_core::metrics as m;
use evetail_core::pipeline::{EventSink, HealthStatus, Pipeline};
use metrics::{Counter, Gauge};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bookmark::Bookmarker;
use crate::config::ProcessorConfig;
use crate::error::IngestError;
use crate::filter::FilterChain;
use crate::identity::FileIdentity;
use crate::reader::{EveReader, Position};

/// 프로세서 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessorState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 프로세서 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    /// 싱크에 제출된 레코드 수
    pub records: u64,
    /// 성공한 커밋 수
    pub commits: u64,
    /// 데이터 끝 도달 횟수
    pub eofs: u64,
    /// 디코딩 실패로 건너뛴 줄 수
    pub malformed: u64,
    /// 제출 실패로 드롭된 레코드 수
    pub submit_failures: u64,
    /// 실패한 커밋 시도 수
    pub commit_failures: u64,
    /// 북마크 쓰기 실패 수
    pub bookmark_failures: u64,
    /// 감지된 로테이션/트렁케이션 수
    pub restarts: u64,
}

/// 태스크와 공유하는 카운터
#[derive(Debug, Default)]
struct Counters {
    records: AtomicU64,
    commits: AtomicU64,
    eofs: AtomicU64,
    malformed: AtomicU64,
    submit_failures: AtomicU64,
    commit_failures: AtomicU64,
    bookmark_failures: AtomicU64,
    restarts: AtomicU64,
    consecutive_commit_failures: AtomicU64,
    session_open: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            records: self.records.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            eofs: self.eofs.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            submit_failures: self.submit_failures.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            bookmark_failures: self.bookmark_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

/// 입력 파일 하나를 담당하는 프로세서
///
/// # 사용 예시
/// ```ignore
/// use evetail_ingest::{FileProcessor, JsonLinesSink, ProcessorConfigBuilder};
///
/// let config = ProcessorConfigBuilder::new().path("/var/log/suricata/eve.json").build()?;
/// let mut processor = FileProcessor::builder()
///     .config(config)
///     .sink(JsonLinesSink::stdout())
///     .build()?;
///
/// processor.start().await?;
/// ```
pub struct FileProcessor<S> {
    /// 프로세서 설정
    config: ProcessorConfig,
    /// 현재 상태
    state: ProcessorState,
    /// 싱크 (실행 중에는 태스크가 소유)
    sink: Option<S>,
    /// 보강 필터 체인
    filters: FilterChain,
    /// 공유 카운터
    counters: Arc<Counters>,
    /// 정지 신호
    cancel: CancellationToken,
    /// 백그라운드 태스크 핸들 (종료 시 싱크를 돌려줌)
    task: Option<JoinHandle<S>>,
}

impl<S: EventSink + 'static> FileProcessor<S> {
    /// 새 빌더를 생성합니다.
    pub fn builder() -> FileProcessorBuilder<S> {
        FileProcessorBuilder::new()
    }

    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ProcessorState::Initialized => "initialized",
            ProcessorState::Running => "running",
            ProcessorState::Stopped => "stopped",
        }
    }

    /// 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.state == ProcessorState::Running
    }

    /// 통계 스냅샷을 반환합니다.
    pub fn stats(&self) -> ProcessorStats {
        self.counters.snapshot()
    }

    /// 프로세서 설정
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// 백그라운드 태스크가 끝났는지 확인합니다 (oneshot 완료 등).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// 백그라운드 태스크가 스스로 끝날 때까지 대기합니다.
    ///
    /// oneshot 모드에서 파일 끝까지 처리하고 커밋한 뒤 반환됩니다.
    pub async fn wait(&mut self) -> Result<(), EvetailError> {
        if self.state != ProcessorState::Running {
            return Err(PipelineError::NotRunning.into());
        }
        self.join().await;
        self.state = ProcessorState::Stopped;
        Ok(())
    }

    async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(sink) => self.sink = Some(sink),
                Err(e) => error!(
                    path = %self.config.path.display(),
                    error = %e,
                    "file processor task failed"
                ),
            }
        }
    }

    fn current_health(&self) -> HealthStatus {
        match self.state {
            ProcessorState::Running => {
                if self.is_finished() {
                    return if self.config.oneshot {
                        HealthStatus::Healthy
                    } else {
                        HealthStatus::Unhealthy("processor task exited".to_owned())
                    };
                }
                let failures = self
                    .counters
                    .consecutive_commit_failures
                    .load(Ordering::Relaxed);
                if failures > 0 {
                    HealthStatus::Degraded(format!("{failures} consecutive commit failures"))
                } else if !self.counters.session_open.load(Ordering::Relaxed) {
                    HealthStatus::Degraded("input file not open".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            ProcessorState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ProcessorState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

impl<S: EventSink + 'static> Pipeline for FileProcessor<S> {
    async fn start(&mut self) -> Result<(), EvetailError> {
        if self.state == ProcessorState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }
        let sink = self.sink.take().ok_or_else(|| {
            PipelineError::InitFailed("sink was lost by a failed processor task".to_owned())
        })?;

        info!(path = %self.config.path.display(), "starting file processor");

        self.cancel = CancellationToken::new();
        let worker = Worker::new(
            self.config.clone(),
            sink,
            self.filters.clone(),
            Arc::clone(&self.counters),
            self.cancel.clone(),
        );
        self.task = Some(tokio::spawn(worker.run()));

        self.state = ProcessorState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), EvetailError> {
        if self.state != ProcessorState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!(path = %self.config.path.display(), "stopping file processor");
        self.cancel.cancel();
        self.join().await;

        self.state = ProcessorState::Stopped;
        info!(path = %self.config.path.display(), "file processor stopped");
        Ok(())
    }

    fn health_check(&self) -> impl std::future::Future<Output = HealthStatus> + Send {
        let status = self.current_health();
        async move { status }
    }
}

/// 파일 프로세서 빌더
pub struct FileProcessorBuilder<S> {
    config: ProcessorConfig,
    sink: Option<S>,
    filters: FilterChain,
}

impl<S: EventSink + 'static> FileProcessorBuilder<S> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ProcessorConfig::default(),
            sink: None,
            filters: FilterChain::new(),
        }
    }

    /// 프로세서 설정을 지정합니다.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// 싱크를 지정합니다.
    pub fn sink(mut self, sink: S) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 필터 체인을 지정합니다.
    pub fn filters(mut self, filters: FilterChain) -> Self {
        self.filters = filters;
        self
    }

    /// 프로세서를 빌드합니다.
    pub fn build(self) -> Result<FileProcessor<S>, IngestError> {
        self.config.validate()?;
        let sink = self.sink.ok_or_else(|| IngestError::Config {
            field: "sink".to_owned(),
            reason: "a sink is required".to_owned(),
        })?;

        Ok(FileProcessor {
            config: self.config,
            state: ProcessorState::Initialized,
            sink: Some(sink),
            filters: self.filters,
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            task: None,
        })
    }
}

impl<S: EventSink + 'static> Default for FileProcessorBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ─── 백그라운드 태스크 ──────────────────────────────────────────────

/// 세션 종료 사유
enum SessionEnd {
    /// 정지 요청 또는 oneshot 완료
    Finished,
    /// 세션 수준 에러, 다시 열어야 함
    Restart,
}

/// 열린 파일 하나에 대한 상태
struct Session {
    reader: EveReader,
    bookmarker: Option<Bookmarker>,
    /// 마지막으로 기록한 북마크 (줄 번호, identity)
    last_written: Option<(u64, Option<FileIdentity>)>,
    /// 리더 재시작 횟수 중 이미 집계한 값
    seen_restarts: u64,
}

/// 태스크 측 Prometheus 핸들
struct Meters {
    records: Counter,
    malformed: Counter,
    submit_failures: Counter,
    commits: Counter,
    commit_failures: Counter,
    bookmark_failures: Counter,
    restarts: Counter,
    bookmark_line: Gauge,
}

impl Meters {
    fn new(path: &str) -> Self {
        let label = path.to_owned();
        Self {
            records: metrics::counter!(m::INGEST_RECORDS_TOTAL, m::LABEL_PATH => label.clone()),
            malformed: metrics::counter!(m::INGEST_MALFORMED_TOTAL, m::LABEL_PATH => label.clone()),
            submit_failures: metrics::counter!(
                m::INGEST_SUBMIT_FAILURES_TOTAL,
                m::LABEL_PATH => label.clone()
            ),
            commits: metrics::counter!(m::INGEST_COMMITS_TOTAL, m::LABEL_PATH => label.clone()),
            commit_failures: metrics::counter!(
                m::INGEST_COMMIT_FAILURES_TOTAL,
                m::LABEL_PATH => label.clone()
            ),
            bookmark_failures: metrics::counter!(
                m::INGEST_BOOKMARK_FAILURES_TOTAL,
                m::LABEL_PATH => label.clone()
            ),
            restarts: metrics::counter!(m::INGEST_ROTATIONS_TOTAL, m::LABEL_PATH => label.clone()),
            bookmark_line: metrics::gauge!(m::INGEST_BOOKMARK_LINE, m::LABEL_PATH => label),
        }
    }
}

/// 주기 통계 (보고 후 초기화)
#[derive(Default)]
struct Interval {
    records: u64,
    eofs: u64,
    commits: u64,
}

struct Worker<S> {
    config: ProcessorConfig,
    sink: S,
    filters: FilterChain,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    meters: Meters,
    interval: Interval,
    last_report: Instant,
}

impl<S: EventSink + 'static> Worker<S> {
    fn new(
        config: ProcessorConfig,
        sink: S,
        filters: FilterChain,
        counters: Arc<Counters>,
        cancel: CancellationToken,
    ) -> Self {
        let meters = Meters::new(&config.path.display().to_string());
        Self {
            config,
            sink,
            filters,
            counters,
            cancel,
            meters,
            interval: Interval::default(),
            last_report: Instant::now(),
        }
    }

    async fn run(mut self) -> S {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let mut session = match self.open_session().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        path = %self.config.path.display(),
                        error = %e,
                        "failed to open input, will retry"
                    );
                    if sleep_or_cancel(self.config.open_retry_interval, &self.cancel).await {
                        break;
                    }
                    continue;
                }
            };

            self.counters.session_open.store(true, Ordering::Relaxed);
            let end = self.run_session(&mut session).await;
            self.counters.session_open.store(false, Ordering::Relaxed);

            match end {
                SessionEnd::Finished => break,
                SessionEnd::Restart => {
                    if sleep_or_cancel(self.config.open_retry_interval, &self.cancel).await {
                        break;
                    }
                }
            }
        }

        let stats = self.counters.snapshot();
        info!(
            path = %self.config.path.display(),
            records = stats.records,
            commits = stats.commits,
            malformed = stats.malformed,
            "file processor finished"
        );
        self.sink
    }

    async fn open_session(&mut self) -> Result<Session, IngestError> {
        let mut reader = EveReader::open(&self.config.path).await?;

        let bookmarker = if self.config.bookmarks_enabled {
            let bookmarker =
                Bookmarker::new(&self.config.path, self.config.bookmark_dir.as_deref());
            bookmarker.init(&mut reader, self.config.start_at_end).await?;
            Some(bookmarker)
        } else {
            if self.config.start_at_end {
                reader.skip_to_end().await?;
            }
            None
        };

        let last_written = bookmarker
            .as_ref()
            .map(|_| (reader.line_number(), reader.identity().copied()));
        info!(
            path = %self.config.path.display(),
            line = reader.line_number(),
            "input opened"
        );

        Ok(Session {
            seen_restarts: reader.restarts(),
            reader,
            bookmarker,
            last_written,
        })
    }

    async fn run_session(&mut self, session: &mut Session) -> SessionEnd {
        let mut pending = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                self.drain(session, pending).await;
                return SessionEnd::Finished;
            }

            let mut eof = false;
            match session.reader.next_record().await {
                Ok(Some(mut event)) => {
                    self.filters.apply(&mut event);
                    if !self.config.custom_fields.is_empty() {
                        event.merge_fields(&self.config.custom_fields);
                    }
                    match self.sink.submit(event).await {
                        Ok(()) => {
                            pending += 1;
                            self.interval.records += 1;
                            self.counters.records.fetch_add(1, Ordering::Relaxed);
                            self.meters.records.increment(1);
                        }
                        Err(e) => {
                            warn!(
                                path = %self.config.path.display(),
                                error = %e,
                                "failed to submit record, dropping"
                            );
                            self.counters.submit_failures.fetch_add(1, Ordering::Relaxed);
                            self.meters.submit_failures.increment(1);
                        }
                    }
                }
                Ok(None) => {
                    eof = true;
                    self.interval.eofs += 1;
                    self.counters.eofs.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.is_record_local() => {
                    warn!(
                        path = %self.config.path.display(),
                        error = %e,
                        "skipping malformed event"
                    );
                    self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                    self.meters.malformed.increment(1);
                }
                Err(e) => {
                    error!(
                        path = %self.config.path.display(),
                        error = %e,
                        "read failed, restarting session"
                    );
                    if pending > 0 && !self.commit(session, &mut pending).await {
                        return SessionEnd::Finished;
                    }
                    return SessionEnd::Restart;
                }
            }

            self.track_restarts(session);

            if (eof && pending > 0) || pending >= self.config.batch_size {
                if !self.commit(session, &mut pending).await {
                    return SessionEnd::Finished;
                }
            } else if eof {
                self.refresh_bookmark(session).await;
            }

            self.maybe_report();

            if eof {
                if self.config.oneshot {
                    info!(path = %self.config.path.display(), "end of file reached in oneshot mode");
                    return SessionEnd::Finished;
                }
                if sleep_or_cancel(self.config.idle_interval, &self.cancel).await {
                    return SessionEnd::Finished;
                }
            }
        }
    }

    /// 배치를 커밋하고 북마크를 씁니다.
    ///
    /// 커밋은 성공할 때까지 재시도합니다. 재시도 중 정지 요청이 오면 `false`.
    async fn commit(&mut self, session: &mut Session, pending: &mut usize) -> bool {
        let position = session.reader.position();
        let mut attempts = 0u64;

        loop {
            match self.sink.commit().await {
                Ok(status) => {
                    debug!(
                        path = %self.config.path.display(),
                        committed = status.committed,
                        line = position.line_number,
                        "batch committed"
                    );
                    self.record_commit();
                    break;
                }
                Err(e) => {
                    attempts += 1;
                    self.counters.commit_failures.fetch_add(1, Ordering::Relaxed);
                    self.counters
                        .consecutive_commit_failures
                        .fetch_add(1, Ordering::Relaxed);
                    self.meters.commit_failures.increment(1);
                    warn!(
                        path = %self.config.path.display(),
                        error = %e,
                        attempts,
                        pending = *pending,
                        "commit failed, will retry"
                    );
                    if sleep_or_cancel(self.config.commit_backoff, &self.cancel).await {
                        warn!(
                            path = %self.config.path.display(),
                            pending = *pending,
                            "stopped while commit was failing, bookmark not advanced"
                        );
                        return false;
                    }
                }
            }
        }

        *pending = 0;
        self.write_bookmark(session, &position).await;
        true
    }

    /// 정지 시 남은 배치에 대해 한 번만 커밋을 시도합니다.
    async fn drain(&mut self, session: &mut Session, pending: usize) {
        if pending == 0 {
            return;
        }
        let position = session.reader.position();
        match self.sink.commit().await {
            Ok(status) => {
                info!(
                    path = %self.config.path.display(),
                    committed = status.committed,
                    "final batch committed"
                );
                self.record_commit();
                self.write_bookmark(session, &position).await;
            }
            Err(e) => {
                self.counters.commit_failures.fetch_add(1, Ordering::Relaxed);
                self.meters.commit_failures.increment(1);
                warn!(
                    path = %self.config.path.display(),
                    error = %e,
                    pending,
                    "final commit failed, records will be re-read on restart"
                );
            }
        }
    }

    fn record_commit(&mut self) {
        self.interval.commits += 1;
        self.counters.commits.fetch_add(1, Ordering::Relaxed);
        self.counters
            .consecutive_commit_failures
            .store(0, Ordering::Relaxed);
        self.meters.commits.increment(1);
    }

    /// 데이터 끝에서 미커밋 레코드가 없을 때, 건너뛴 줄만큼 북마크를 전진시킵니다.
    async fn refresh_bookmark(&mut self, session: &mut Session) {
        if session.bookmarker.is_none() {
            return;
        }
        let position = session.reader.position();
        if session.last_written != Some((position.line_number, position.identity)) {
            self.write_bookmark(session, &position).await;
        }
    }

    async fn write_bookmark(&mut self, session: &mut Session, position: &Position) {
        let Some(bookmarker) = session.bookmarker.as_ref() else {
            return;
        };
        match bookmarker.write(position).await {
            Ok(()) => {
                session.last_written = Some((position.line_number, position.identity));
                #[allow(clippy::cast_precision_loss)]
                self.meters.bookmark_line.set(position.line_number as f64);
            }
            Err(e) => {
                warn!(
                    path = %self.config.path.display(),
                    error = %e,
                    "failed to write bookmark, will retry at next commit"
                );
                self.counters.bookmark_failures.fetch_add(1, Ordering::Relaxed);
                self.meters.bookmark_failures.increment(1);
            }
        }
    }

    fn track_restarts(&mut self, session: &mut Session) {
        let restarts = session.reader.restarts();
        if restarts > session.seen_restarts {
            let delta = restarts - session.seen_restarts;
            session.seen_restarts = restarts;
            self.counters.restarts.fetch_add(delta, Ordering::Relaxed);
            self.meters.restarts.increment(delta);
        }
    }

    fn maybe_report(&mut self) {
        if self.last_report.elapsed() < self.config.report_interval {
            return;
        }
        info!(
            path = %self.config.path.display(),
            total = self.counters.records.load(Ordering::Relaxed),
            records = self.interval.records,
            eofs = self.interval.eofs,
            commits = self.interval.commits,
            "processor statistics"
        );
        self.interval = Interval::default();
        self.last_report = Instant::now();
    }
}

/// `duration`만큼 대기합니다. 그 전에 취소되면 `true`.
async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = sleep(duration) => false,
    }
}
