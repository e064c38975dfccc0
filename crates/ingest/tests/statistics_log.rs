//! 주기 통계 로그 검증
//!
//! 스레드 로컬 subscriber가 다른 테스트의 로그와 섞이지 않도록 별도 바이너리로 둡니다.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use evetail_core::pipeline::Pipeline;
use evetail_ingest::{FileProcessor, JsonLinesSink, ProcessorConfigBuilder};

/// 테스트용 로그 수집기
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_owned)
            .collect()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// 주기 통계는 구간마다 초기화되고 누적 합계만 유지됨
#[tokio::test]
async fn test_statistics_report_resets_each_interval() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    // Given: 세 줄짜리 입력
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("eve.json");
    let mut file = std::fs::File::create(&input).unwrap();
    for seq in 0..3 {
        writeln!(
            file,
            r#"{{"timestamp":"2024-01-15T12:00:00Z","event_type":"dns","seq":{seq}}}"#
        )
        .unwrap();
    }

    let config = ProcessorConfigBuilder::new()
        .path(&input)
        .bookmark_dir(dir.path())
        .idle_interval(Duration::from_millis(10))
        .report_interval(Duration::from_millis(100))
        .build()
        .unwrap();
    let mut processor = FileProcessor::builder()
        .config(config)
        .sink(JsonLinesSink::new(Vec::<u8>::new()))
        .build()
        .unwrap();

    // When: 보고 주기가 여러 번 지나도록 실행
    processor.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        while logs.lines_containing("processor statistics").len() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("statistics not reported in time");
    processor.stop().await.unwrap();

    // Then: 첫 보고에 모든 레코드, 이후 보고는 구간 값이 0
    let reports = logs.lines_containing("processor statistics");
    assert!(reports[0].contains("total=3"), "got: {}", reports[0]);
    assert!(reports[0].contains("records=3"), "got: {}", reports[0]);
    assert!(reports[0].contains("commits=1"), "got: {}", reports[0]);
    for report in &reports[1..] {
        assert!(report.contains("total=3"), "got: {report}");
        assert!(report.contains("records=0"), "got: {report}");
        assert!(report.contains("commits=0"), "got: {report}");
    }
}
