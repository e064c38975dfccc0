//! Processor orchestration -- assembly, lifecycle, and shutdown.
//!
//! The [`Orchestrator`] builds one [`FileProcessor`] per configured input
//! path. All processors share a single output writer; each keeps its own
//! batch and its own bookmark.
//!
//! # Shutdown
//!
//! On `SIGTERM`/`SIGINT` (or when every input is done in oneshot mode)
//! each processor is stopped in turn. A processor makes one last commit
//! attempt for its pending batch before it exits.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::io::AsyncWrite;
use tokio::sync::broadcast;

use evetail_core::config::{EvetailConfig, OutputConfig};
use evetail_core::pipeline::Pipeline;
use evetail_ingest::{
    AddFilenameFilter, AddTagsFilter, FileProcessor, FilterChain, JsonLinesSink, ProcessorConfig,
};

use crate::health::{DaemonHealth, ProcessorHealth, aggregate_status, log_health};
use crate::metrics_server;

/// Writer behind the shared output sink (file or stdout).
pub type OutputWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Sink type used by every processor.
pub type OutputSink = JsonLinesSink<OutputWriter>;

/// Interval of the uptime gauge refresh.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: EvetailConfig,
    /// One processor per input path, in configuration order.
    processors: Vec<FileProcessor<OutputSink>>,
    /// Shutdown broadcast sender (signals background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration (file, then `EVETAIL_*` overrides) and build the orchestrator.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = EvetailConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The metrics recorder cannot be installed
    /// - The bookmark directory or the output file cannot be created
    /// - A processor rejects its configuration
    pub async fn build_from_config(config: EvetailConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Processors register their counters when they start, so the recorder goes first.
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        if !config.input.disable_bookmarks && !config.input.bookmark_dir.is_empty() {
            tokio::fs::create_dir_all(&config.input.bookmark_dir)
                .await
                .map_err(|e| {
                    anyhow::anyhow!(
                        "failed to create bookmark directory {}: {}",
                        config.input.bookmark_dir,
                        e
                    )
                })?;
        }

        let sink = open_output(&config.output).await?;
        let tags = (!config.input.tags.is_empty())
            .then(|| Arc::new(AddTagsFilter::new(config.input.tags.iter().cloned())));

        let mut processors = Vec::with_capacity(config.input.paths.len());
        for path in &config.input.paths {
            let mut filters = FilterChain::new();
            if config.input.add_filename {
                filters.add(AddFilenameFilter::new(path.clone()));
            }
            if let Some(tags) = &tags {
                filters.add_shared(tags.clone());
            }

            let processor_config = ProcessorConfig::from_core(&config.input, path);
            let processor = FileProcessor::builder()
                .config(processor_config)
                .sink(sink.clone())
                .filters(filters)
                .build()
                .map_err(|e| anyhow::anyhow!("failed to build processor for {}: {}", path, e))?;

            tracing::info!(
                path = %path,
                filters = ?processor_filters_names(config.input.add_filename, tags.is_some()),
                "file processor initialized"
            );
            processors.push(processor);
        }

        tracing::info!(
            processors = processors.len(),
            oneshot = config.input.oneshot,
            output = %config.output.kind,
            "orchestrator initialized"
        );

        if config.metrics.enabled {
            record_daemon_metrics(processors.len());
        }

        let (shutdown_tx, _) = broadcast::channel(4);
        Ok(Self {
            config,
            processors,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start every processor and block until shutdown.
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` / `SIGINT`
    /// - All inputs reached end of file (oneshot mode)
    pub async fn run(&mut self) -> Result<()> {
        let pid_file = (!self.config.general.pid_file.is_empty())
            .then(|| self.config.general.pid_file.clone());
        if let Some(path) = &pid_file {
            write_pid_file(Path::new(path))?;
        }

        if let Err(e) = self.start_all().await {
            if let Some(path) = &pid_file {
                remove_pid_file(Path::new(path));
            }
            return Err(e);
        }

        let uptime_task = self.config.metrics.enabled.then(|| {
            spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe())
        });

        let outcome = self.wait_for_exit().await;

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.shutdown().await;

        if let Some(path) = &pid_file {
            remove_pid_file(Path::new(path));
        }

        outcome.and(stopped)
    }

    async fn start_all(&mut self) -> Result<()> {
        tracing::info!("starting file processors");
        for i in 0..self.processors.len() {
            if let Err(e) = self.processors[i].start().await {
                tracing::warn!("startup failed, rolling back already-started processors");
                for started in &mut self.processors[..i] {
                    if let Err(stop_err) = started.stop().await {
                        tracing::error!(
                            startup_error = %e,
                            rollback_error = %stop_err,
                            "rollback failed during startup failure cleanup"
                        );
                    }
                }
                return Err(anyhow::anyhow!("failed to start processor: {}", e));
            }
        }
        Ok(())
    }

    /// Wait for a shutdown signal, logging health on every report interval.
    /// In oneshot mode, also return once every processor has finished.
    async fn wait_for_exit(&mut self) -> Result<()> {
        let shutdown = wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        if self.config.input.oneshot {
            tokio::select! {
                () = wait_all(&mut self.processors) => {
                    tracing::info!("all inputs processed");
                }
                signal = &mut shutdown => {
                    tracing::info!(signal = signal?, "shutdown signal received");
                }
            }
            return Ok(());
        }

        let mut health_tick =
            tokio::time::interval(Duration::from_secs(self.config.input.report_interval_secs));
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        health_tick.tick().await;

        tracing::info!("entering main loop");
        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    tracing::info!(signal = signal?, "shutdown signal received");
                    return Ok(());
                }
                _ = health_tick.tick() => {
                    log_health(&self.health().await);
                }
            }
        }
    }

    /// Stop every running processor. Each drains its pending batch.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping file processors");
        let mut failures = 0usize;
        for processor in &mut self.processors {
            if !processor.is_running() {
                continue;
            }
            if let Err(e) = processor.stop().await {
                failures += 1;
                tracing::error!(
                    path = %processor.config().path.display(),
                    error = %e,
                    "failed to stop processor"
                );
            }
        }

        if failures > 0 {
            return Err(anyhow::anyhow!("{} processor(s) failed to stop", failures));
        }
        Ok(())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let mut processors = Vec::with_capacity(self.processors.len());
        for processor in &self.processors {
            processors.push(ProcessorHealth {
                path: processor.config().path.display().to_string(),
                state: processor.state_name().to_owned(),
                status: processor.health_check().await,
                stats: processor.stats(),
            });
        }

        let uptime_secs = self.start_time.elapsed().as_secs();
        if self.config.metrics.enabled {
            use evetail_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: aggregate_status(&processors),
            uptime_secs,
            processors,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &EvetailConfig {
        &self.config
    }

    /// Number of file processors.
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }
}

fn processor_filters_names(add_filename: bool, tags: bool) -> Vec<&'static str> {
    let mut names = Vec::new();
    if add_filename {
        names.push("add-filename");
    }
    if tags {
        names.push("add-tags");
    }
    names
}

/// Open the shared output writer described by `[output]`.
async fn open_output(output: &OutputConfig) -> Result<OutputSink> {
    let writer: OutputWriter = match output.kind.as_str() {
        "stdout" => Box::new(tokio::io::stdout()),
        _ => {
            let path = Path::new(&output.path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    anyhow::anyhow!(
                        "failed to create output directory {}: {}",
                        parent.display(),
                        e
                    )
                })?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(|e| {
                    anyhow::anyhow!("failed to open output file {}: {}", path.display(), e)
                })?;
            Box::new(file)
        }
    };
    Ok(JsonLinesSink::new(writer))
}

async fn wait_all(processors: &mut [FileProcessor<OutputSink>]) {
    for processor in processors {
        if let Err(e) = processor.wait().await {
            tracing::warn!(
                path = %processor.config().path.display(),
                error = %e,
                "processor was not running"
            );
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Two daemons following the same files would overwrite each other's
/// bookmarks, so an existing PID file is an error.
///
/// # Security
///
/// - `create_new(true)` creates the file atomically
/// - The created file must be a regular file
/// - The parent directory is created with mode 0o700, the file with 0o600
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    let pid = std::process::id();
    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown. Failures are only logged.
fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        ),
    }
}

/// Record daemon-level metrics (build info, processor count).
fn record_daemon_metrics(processor_count: usize) {
    use evetail_core::metrics as m;

    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PROCESSORS).set(processor_count as f64);
}

/// Spawn a background task that periodically updates the uptime gauge.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use evetail_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
