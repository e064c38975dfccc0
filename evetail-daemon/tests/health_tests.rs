//! Health aggregation tests.

use evetail_core::pipeline::HealthStatus;
use evetail_daemon::health::{DaemonHealth, ProcessorHealth, aggregate_status};
use evetail_ingest::ProcessorStats;

fn processor(path: &str, status: HealthStatus) -> ProcessorHealth {
    ProcessorHealth {
        path: path.to_owned(),
        state: "running".to_owned(),
        status,
        stats: ProcessorStats::default(),
    }
}

#[test]
fn test_aggregate_status_all_healthy() {
    // Given
    let processors = vec![
        processor("/var/log/suricata/eve.json", HealthStatus::Healthy),
        processor("/var/log/suricata/dns.json", HealthStatus::Healthy),
    ];

    // When / Then
    assert!(aggregate_status(&processors).is_healthy());
}

#[test]
fn test_aggregate_status_empty_is_healthy() {
    assert!(aggregate_status(&[]).is_healthy());
}

#[test]
fn test_aggregate_status_degraded_names_path() {
    // Given: One processor cannot commit
    let processors = vec![
        processor("/var/log/suricata/eve.json", HealthStatus::Healthy),
        processor(
            "/var/log/suricata/dns.json",
            HealthStatus::Degraded("3 consecutive commit failures".to_owned()),
        ),
    ];

    // When
    let status = aggregate_status(&processors);

    // Then
    match status {
        HealthStatus::Degraded(reason) => {
            assert_eq!(
                reason,
                "/var/log/suricata/dns.json: 3 consecutive commit failures"
            );
        }
        other => panic!("expected degraded, got {other:?}"),
    }
}

#[test]
fn test_aggregate_status_unhealthy_wins() {
    // Given: One degraded, one unhealthy
    let processors = vec![
        processor("/a.json", HealthStatus::Degraded("input file not open".to_owned())),
        processor("/b.json", HealthStatus::Unhealthy("stopped".to_owned())),
    ];

    // When
    let status = aggregate_status(&processors);

    // Then: Only unhealthy reasons are reported
    match status {
        HealthStatus::Unhealthy(reason) => {
            assert_eq!(reason, "/b.json: stopped");
        }
        other => panic!("expected unhealthy, got {other:?}"),
    }
}

#[test]
fn test_daemon_health_serializes() {
    // Given
    let processors = vec![processor("/a.json", HealthStatus::Healthy)];
    let health = DaemonHealth {
        status: aggregate_status(&processors),
        uptime_secs: 42,
        processors,
    };

    // When
    let json = serde_json::to_value(&health).expect("should serialize");

    // Then
    assert_eq!(json["status"], "Healthy");
    assert_eq!(json["uptime_secs"], 42);
    assert_eq!(json["processors"][0]["path"], "/a.json");
    assert_eq!(json["processors"][0]["stats"]["records"], 0);
}
