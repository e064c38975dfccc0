//! CLI argument definitions for evetail-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.
//! Flags override the configuration file and `EVETAIL_*` environment variables.

use std::path::PathBuf;

use clap::Parser;

use evetail_core::config::EvetailConfig;

/// Output argument value that selects standard output.
pub const STDOUT_OUTPUT: &str = "-";

/// EVE log follower.
///
/// Tails one or more Suricata EVE JSON files, survives rotation and
/// truncation, and forwards records in committed batches while keeping
/// a per-file bookmark.
#[derive(Parser, Debug)]
#[command(name = "evetail-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to evetail.toml configuration file.
    ///
    /// A missing file is accepted when at least one `--input` is given.
    #[arg(short, long, default_value = "/etc/evetail/evetail.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path.
    #[arg(long)]
    pub pid_file: Option<String>,

    /// EVE file to follow. Repeat for several files; replaces `input.paths`.
    #[arg(short, long = "input", value_name = "PATH")]
    pub input: Vec<String>,

    /// Directory for bookmark files.
    #[arg(long, value_name = "DIR")]
    pub bookmark_dir: Option<String>,

    /// Start at the end of the file when there is no valid bookmark.
    #[arg(long)]
    pub end: bool,

    /// Neither read nor write bookmarks.
    #[arg(long)]
    pub no_bookmark: bool,

    /// Process to the end of each file, commit, and exit.
    #[arg(long)]
    pub oneshot: bool,

    /// Records per committed batch.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Output file for NDJSON records, or `-` for standard output.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<String>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_to(&self, config: &mut EvetailConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }

        if !self.input.is_empty() {
            config.input.paths.clone_from(&self.input);
        }
        if let Some(dir) = &self.bookmark_dir {
            config.input.bookmark_dir.clone_from(dir);
        }
        if self.end {
            config.input.end = true;
        }
        if self.no_bookmark {
            config.input.disable_bookmarks = true;
        }
        if self.oneshot {
            config.input.oneshot = true;
        }
        if let Some(size) = self.batch_size {
            config.input.batch_size = size;
        }

        match self.output.as_deref() {
            Some(STDOUT_OUTPUT) => config.output.kind = "stdout".to_owned(),
            Some(path) => {
                config.output.kind = "file".to_owned();
                config.output.path = path.to_owned();
            }
            None => {}
        }
    }
}
