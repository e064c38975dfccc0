//! 줄 단위 JSON(NDJSON) 싱크
//!
//! 제출된 레코드를 메모리에 직렬화해 두었다가 커밋 시 writer에 쓰고 `flush`합니다.
//!
//! 여러 파일 프로세서가 같은 출력을 공유할 수 있도록 writer는 `Arc<Mutex<_>>`로 감쌉니다.
//! `clone()`은 writer를 공유하고 빈 배치를 가진 새 싱크를 만듭니다.
//!
//! 배치는 쓰기 전에 공유 출력의 `unwritten` 버퍼로 옮겨지고, writer가 받아들인 바이트만큼
//! 앞에서부터 제거됩니다. 쓰기가 도중에 실패하면 남은 꼬리는 그대로 남아 있다가
//! (어느 clone이든) 다음 커밋이 새 레코드보다 먼저 씁니다. 따라서 재시도해도 이미 쓴
//! 바이트가 중복되거나 다른 배치와 한 줄 안에서 섞이지 않습니다.

use std::io;
use std::path::Path;
use std::sync::Arc;

use evetail_core::error::SinkError;
use evetail_core::event::EveEvent;
use evetail_core::pipeline::{CommitStatus, EventSink};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

/// NDJSON 싱크
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    output: Arc<Mutex<SharedOutput<W>>>,
    pending: Vec<u8>,
    pending_records: usize,
}

/// 싱크 clone들이 공유하는 writer와 아직 쓰이지 않은 바이트
#[derive(Debug)]
struct SharedOutput<W> {
    writer: W,
    unwritten: Vec<u8>,
}

impl JsonLinesSink<File> {
    /// 파일을 append 모드로 열어 싱크를 만듭니다. 파일이 없으면 생성합니다.
    pub async fn append_file(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self::new(file))
    }
}

impl JsonLinesSink<Stdout> {
    /// 표준 출력 싱크
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> JsonLinesSink<W> {
    /// writer를 감싸 싱크를 만듭니다.
    pub fn new(writer: W) -> Self {
        Self {
            output: Arc::new(Mutex::new(SharedOutput {
                writer,
                unwritten: Vec::new(),
            })),
            pending: Vec::new(),
            pending_records: 0,
        }
    }

    /// 아직 커밋되지 않은 레코드 수
    pub fn pending(&self) -> usize {
        self.pending_records
    }
}

impl<W> Clone for JsonLinesSink<W> {
    fn clone(&self) -> Self {
        Self {
            output: Arc::clone(&self.output),
            pending: Vec::new(),
            pending_records: 0,
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> EventSink for JsonLinesSink<W> {
    async fn submit(&mut self, event: EveEvent) -> Result<(), SinkError> {
        let line = event
            .to_json_line()
            .map_err(|e| SinkError::Submit(e.to_string()))?;
        self.pending.extend_from_slice(line.as_bytes());
        self.pending.push(b'\n');
        self.pending_records += 1;
        Ok(())
    }

    async fn commit(&mut self) -> Result<CommitStatus, SinkError> {
        if self.pending_records == 0 && self.pending.is_empty() {
            return Ok(CommitStatus::default());
        }

        {
            let mut output = self.output.lock().await;
            let SharedOutput { writer, unwritten } = &mut *output;
            // 이전 커밋이 남긴 꼬리 뒤에 이어 붙임
            unwritten.append(&mut self.pending);
            write_accepted(writer, unwritten).await?;
            writer.flush().await?;
        }

        let committed = self.pending_records;
        self.pending_records = 0;
        Ok(CommitStatus { committed })
    }
}

/// `buf`를 모두 쓰면서 writer가 받아들인 바이트를 앞에서부터 제거합니다.
///
/// 실패하면 `buf`에는 아직 쓰이지 않은 바이트만 남습니다.
async fn write_accepted<W: AsyncWrite + Unpin>(
    writer: &mut W,
    buf: &mut Vec<u8>,
) -> io::Result<()> {
    while !buf.is_empty() {
        let n = writer.write(buf.as_slice()).await?;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero));
        }
        buf.drain(..n);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;

    async fn written(sink: &JsonLinesSink<Vec<u8>>) -> String {
        String::from_utf8(sink.output.lock().await.writer.clone()).unwrap()
    }

    /// `budget` 바이트까지만 받아들이고 그 뒤로는 실패하는 writer
    #[derive(Debug, Default)]
    struct ShortWriter {
        data: Vec<u8>,
        budget: usize,
    }

    impl AsyncWrite for ShortWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.budget == 0 {
                return Poll::Ready(Err(io::Error::other("disk full")));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            self.data.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    async fn short_written(sink: &JsonLinesSink<ShortWriter>) -> String {
        String::from_utf8(sink.output.lock().await.writer.data.clone()).unwrap()
    }

    async fn set_budget(sink: &JsonLinesSink<ShortWriter>, budget: usize) {
        sink.output.lock().await.writer.budget = budget;
    }

    fn event(seq: u64) -> EveEvent {
        EveEvent::from_line(&format!(
            r#"{{"timestamp":"2024-01-15T12:00:00Z","seq":{seq}}}"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn nothing_written_before_commit() {
        let mut sink = JsonLinesSink::new(Vec::<u8>::new());
        sink.submit(event(1)).await.unwrap();
        assert_eq!(sink.pending(), 1);
        assert!(written(&sink).await.is_empty());

        let status = sink.commit().await.unwrap();
        assert_eq!(status.committed, 1);
        assert_eq!(sink.pending(), 0);
        assert_eq!(
            written(&sink).await,
            "{\"timestamp\":\"2024-01-15T12:00:00Z\",\"seq\":1,\"tags\":[]}\n"
        );
    }

    #[tokio::test]
    async fn empty_commit_is_noop() {
        let mut sink = JsonLinesSink::new(Vec::<u8>::new());
        assert_eq!(sink.commit().await.unwrap().committed, 0);
    }

    #[tokio::test]
    async fn clones_share_writer_but_not_batches() {
        let mut a = JsonLinesSink::new(Vec::<u8>::new());
        let mut b = a.clone();
        a.submit(event(1)).await.unwrap();
        b.submit(event(2)).await.unwrap();
        b.submit(event(3)).await.unwrap();

        assert_eq!(b.commit().await.unwrap().committed, 2);
        assert_eq!(a.commit().await.unwrap().committed, 1);

        assert_eq!(written(&a).await.lines().count(), 3);
    }

    #[tokio::test]
    async fn retry_after_short_write_resumes_without_duplicating() {
        // Given: writer가 첫 레코드 중간에서 멈춤
        let mut sink = JsonLinesSink::new(ShortWriter {
            budget: 30,
            ..Default::default()
        });
        sink.submit(event(0)).await.unwrap();
        sink.submit(event(1)).await.unwrap();
        assert!(sink.commit().await.is_err());
        assert_eq!(sink.pending(), 2);

        // When: 공간이 생긴 뒤 재시도
        set_budget(&sink, usize::MAX).await;
        let status = sink.commit().await.unwrap();

        // Then: 모든 줄이 온전한 JSON으로 한 번씩
        assert_eq!(status.committed, 2);
        let out = short_written(&sink).await;
        let seqs: Vec<u64> = out
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line)
                    .unwrap_or_else(|e| panic!("corrupt line {line:?}: {e}"));
                value["seq"].as_u64().unwrap()
            })
            .collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[tokio::test]
    async fn torn_batch_finished_before_other_clone_writes() {
        // Given: a의 배치가 도중에 끊김
        let mut a = JsonLinesSink::new(ShortWriter {
            budget: 10,
            ..Default::default()
        });
        let mut b = a.clone();
        a.submit(event(0)).await.unwrap();
        assert!(a.commit().await.is_err());

        // When: b가 먼저 커밋에 성공
        set_budget(&b, usize::MAX).await;
        b.submit(event(1)).await.unwrap();
        assert_eq!(b.commit().await.unwrap().committed, 1);

        // Then: a의 레코드가 b의 레코드 앞에 온전히 쓰이고, a의 재시도는 중복 없이 성공
        assert_eq!(a.commit().await.unwrap().committed, 1);
        let out = short_written(&a).await;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""seq":0"#), "got: {out}");
        assert!(lines[1].contains(r#""seq":1"#), "got: {out}");
    }

    #[tokio::test]
    async fn append_file_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, "existing\n").unwrap();

        let mut sink = JsonLinesSink::append_file(&path).await.unwrap();
        sink.submit(event(1)).await.unwrap();
        sink.commit().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("existing\n"));
        assert_eq!(content.lines().count(), 2);
    }
}
