//! EVE 추적 리더
//!
//! [`LineReader`] 위에서 줄 번호를 세고, 파일이 교체되거나 잘려도 이어서 읽습니다.
//!
//! # 로테이션 감지
//! - 트렁케이션: 열린 핸들의 크기가 마지막으로 본 크기보다 작거나, 읽기 위치가 크기를 넘음
//!   -> 처음으로 되감기
//! - 이름 변경 로테이션: 데이터 끝에서 경로가 다른 물리 파일을 가리킴 -> 새로 열기
//!
//! 위치(줄 번호)는 같은 identity의 파일 안에서만 의미가 있습니다.

use std::path::{Path, PathBuf};

use evetail_core::event::EveEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::line::LineReader;
use crate::error::IngestError;
use crate::identity::{FileIdentity, identity_of, same_identity};

/// 리더 위치 스냅샷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 입력 파일 경로
    pub path: PathBuf,
    /// 현재 파일 세대에서 소비한 완전한 줄 수
    pub line_number: u64,
    /// 스냅샷 시점의 파일 크기
    pub file_size: u64,
    /// 물리 파일 identity
    pub identity: Option<FileIdentity>,
}

/// 로테이션을 따라가는 EVE 리더
#[derive(Debug)]
pub struct EveReader {
    path: PathBuf,
    reader: LineReader,
    line_number: u64,
    last_known_size: u64,
    identity: Option<FileIdentity>,
    /// 재시작(트렁케이션/로테이션) 횟수
    restarts: u64,
}

impl EveReader {
    /// 파일을 처음부터 읽도록 엽니다.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        let path = path.as_ref().to_path_buf();
        let reader = LineReader::open(&path).await?;
        let identity = identity_of(&reader.stat().await?);

        Ok(Self {
            path,
            reader,
            line_number: 0,
            last_known_size: 0,
            identity,
            restarts: 0,
        })
    }

    /// 다음 레코드를 읽습니다.
    ///
    /// 공백뿐인 줄은 줄 번호만 증가시키고 건너뜁니다.
    /// 디코딩 실패는 [`IngestError::MalformedEvent`]로 반환되며, 해당 줄은 이미 소비된 상태입니다.
    pub async fn next_record(&mut self) -> Result<Option<EveEvent>, IngestError> {
        loop {
            let Some(line) = self.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            return match EveEvent::from_line(&line) {
                Ok(event) => Ok(Some(event)),
                Err(reason) => Err(IngestError::MalformedEvent {
                    line_number: self.line_number,
                    line,
                    reason,
                }),
            };
        }
    }

    /// 다음 완전한 줄을 읽습니다. 트렁케이션과 로테이션을 처리합니다.
    async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        loop {
            self.check_truncation().await?;

            if let Some(line) = self.reader.next_line().await? {
                self.line_number += 1;
                return Ok(Some(line));
            }

            if self.path_was_replaced().await {
                info!(
                    path = %self.path.display(),
                    lines = self.line_number,
                    "file rotated, reopening"
                );
                self.reopen().await?;
                continue;
            }
            return Ok(None);
        }
    }

    async fn check_truncation(&mut self) -> Result<(), IngestError> {
        let size = self.reader.file_size().await?;
        if size < self.last_known_size || self.reader.current_offset() > size {
            info!(
                path = %self.path.display(),
                size,
                last_known_size = self.last_known_size,
                "file truncated, starting over"
            );
            self.reader.set_offset(0).await?;
            self.line_number = 0;
            self.restarts += 1;
        }
        self.last_known_size = size;
        Ok(())
    }

    /// 경로가 지금 열린 핸들과 다른 물리 파일을 가리키는지 확인합니다.
    ///
    /// 경로가 잠시 없거나 identity를 알 수 없으면 교체되지 않은 것으로 봅니다.
    async fn path_was_replaced(&self) -> bool {
        let current = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => identity_of(&metadata),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "path not available");
                return false;
            }
        };
        match (self.identity.as_ref(), current.as_ref()) {
            (Some(open), Some(on_disk)) => !same_identity(Some(open), Some(on_disk)),
            _ => false,
        }
    }

    async fn reopen(&mut self) -> Result<(), IngestError> {
        let reader = LineReader::open(&self.path).await?;
        self.identity = identity_of(&reader.stat().await?);
        self.reader = reader;
        self.line_number = 0;
        self.last_known_size = 0;
        self.restarts += 1;
        Ok(())
    }

    /// 현재 위치 스냅샷. 크기는 마지막으로 확인한 `last_known_size`입니다.
    pub fn position(&self) -> Position {
        Position {
            path: self.path.clone(),
            line_number: self.line_number,
            file_size: self.last_known_size,
            identity: self.identity,
        }
    }

    /// 디코딩 없이 정확히 `lines`개의 줄을 건너뜁니다.
    ///
    /// 이미 읽기 시작한 리더에서는 아무 일도 하지 않습니다.
    /// 파일이 더 짧으면 [`IngestError::SkipShort`]를 반환하며, 리더는 파일 끝에 위치합니다.
    pub async fn skip_to(&mut self, lines: u64) -> Result<(), IngestError> {
        if self.line_number > 0 {
            return Ok(());
        }
        self.check_truncation().await?;
        while self.line_number < lines {
            match self.reader.next_line().await? {
                Some(_) => self.line_number += 1,
                None => {
                    return Err(IngestError::SkipShort {
                        wanted: lines,
                        skipped: self.line_number,
                    });
                }
            }
        }
        Ok(())
    }

    /// 현재 읽을 수 있는 완전한 줄을 모두 건너뛰고, 건너뛴 줄 수를 반환합니다.
    pub async fn skip_to_end(&mut self) -> Result<u64, IngestError> {
        self.check_truncation().await?;
        let mut skipped = 0;
        while self.reader.next_line().await?.is_some() {
            self.line_number += 1;
            skipped += 1;
        }
        Ok(skipped)
    }

    /// 현재 줄 번호
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// 열린 파일의 identity
    pub fn identity(&self) -> Option<&FileIdentity> {
        self.identity.as_ref()
    }

    /// 열린 핸들의 현재 크기
    pub async fn file_size(&self) -> Result<u64, IngestError> {
        self.reader.file_size().await
    }

    /// 트렁케이션/로테이션으로 처음부터 다시 읽은 횟수
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// 입력 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }
}
