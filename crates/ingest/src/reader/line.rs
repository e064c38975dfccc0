//! 줄 단위 리더
//!
//! 작성 중인 파일의 마지막 줄은 개행 없이 잘려 있을 수 있습니다.
//! 이 경우 읽은 바이트를 버리고 줄 시작 위치로 되감아, 다음 호출에서 완성된 줄을 다시 읽습니다.

use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::error::IngestError;

/// 읽기 버퍼 크기
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// 완전한 줄만 돌려주는 파일 리더
#[derive(Debug)]
pub struct LineReader {
    path: PathBuf,
    reader: BufReader<File>,
    /// 소비한 바이트 수 (완전한 줄의 끝)
    offset: u64,
    buf: Vec<u8>,
}

impl LineReader {
    /// 파일을 처음부터 읽도록 엽니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).await.map_err(|source| IngestError::FileOpen {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, file),
            offset: 0,
            buf: Vec::new(),
        })
    }

    /// 다음 완전한 줄을 읽습니다.
    ///
    /// 개행 문자(와 그 앞의 `\r`)는 제거됩니다. 더 읽을 완전한 줄이 없으면 `None`.
    pub async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }

        if self.buf.last() != Some(&b'\n') {
            // 작성 중인 줄: 줄 시작으로 되감기
            self.reader.seek(SeekFrom::Start(self.offset)).await?;
            return Ok(None);
        }

        self.offset += n as u64;
        self.buf.pop();
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    /// 소비한 바이트 오프셋
    pub fn current_offset(&self) -> u64 {
        self.offset
    }

    /// 읽기 위치를 옮깁니다.
    pub async fn set_offset(&mut self, offset: u64) -> Result<(), IngestError> {
        self.reader.seek(SeekFrom::Start(offset)).await?;
        self.offset = offset;
        Ok(())
    }

    /// 열린 핸들의 메타데이터 (경로 조회가 아님)
    pub async fn stat(&self) -> Result<Metadata, IngestError> {
        Ok(self.reader.get_ref().metadata().await?)
    }

    /// 열린 핸들의 현재 크기
    pub async fn file_size(&self) -> Result<u64, IngestError> {
        Ok(self.stat().await?.len())
    }

    /// 입력 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}
