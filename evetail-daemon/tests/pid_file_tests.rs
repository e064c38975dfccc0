//! PID file lifecycle tests.
//!
//! The daemon writes its PID on start, refuses to run when another
//! instance holds the file, and removes it on shutdown.

use std::io::Write;
use std::time::Duration;

use evetail_core::config::EvetailConfig;
use evetail_daemon::orchestrator::Orchestrator;
use tempfile::TempDir;

fn oneshot_config(dir: &TempDir) -> EvetailConfig {
    let input = dir.path().join("eve.json");
    let mut file = std::fs::File::create(&input).expect("should create input");
    writeln!(
        file,
        r#"{{"timestamp":"2024-01-15T12:00:00Z","event_type":"flow"}}"#
    )
    .expect("should write input");

    let mut config = EvetailConfig::default();
    config.general.pid_file = dir.path().join("run/evetail.pid").display().to_string();
    config.input.paths = vec![input.display().to_string()];
    config.input.oneshot = true;
    config.input.disable_bookmarks = true;
    config.output.path = dir.path().join("events.json").display().to_string();
    config
}

#[tokio::test]
async fn test_pid_file_removed_after_run() {
    // Given
    let dir = TempDir::new().expect("should create temp dir");
    let config = oneshot_config(&dir);
    let pid_path = dir.path().join("run/evetail.pid");
    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("should build");

    // When
    tokio::time::timeout(Duration::from_secs(10), orchestrator.run())
        .await
        .expect("run timed out")
        .expect("run should succeed");

    // Then
    assert!(!pid_path.exists(), "PID file should be removed on shutdown");
}

#[tokio::test]
async fn test_existing_pid_file_blocks_start() {
    // Given: Another instance's PID file
    let dir = TempDir::new().expect("should create temp dir");
    let config = oneshot_config(&dir);
    let pid_path = dir.path().join("run/evetail.pid");
    std::fs::create_dir_all(pid_path.parent().unwrap()).unwrap();
    std::fs::write(&pid_path, "4242\n").unwrap();
    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("should build");

    // When
    let err = orchestrator.run().await.unwrap_err().to_string();

    // Then: Existing file is left alone, nothing was processed
    assert!(err.contains("4242"), "got: {err}");
    assert_eq!(std::fs::read_to_string(&pid_path).unwrap(), "4242\n");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("events.json")).unwrap(),
        ""
    );
}
