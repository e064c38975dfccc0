//! 북마크 저장소
//!
//! 커밋이 성공한 위치를 입력 파일별 JSON 파일에 기록하고, 재시작 시 그 위치에서 이어 읽습니다.
//!
//! # 파일 형식
//! ```json
//! {"path":"/var/log/suricata/eve.json","offset":1042,"size":734003,"sys":{"inode":131,"dev":2049}}
//! ```
//! `offset`은 바이트가 아니라 줄 번호입니다.
//!
//! # 파일 위치
//! - 북마크 디렉토리 지정: `<dir>/<sha256(입력 경로)>.bookmark`
//! - 미지정: `<입력 경로>.bookmark`
//!
//! 북마크가 없거나 손상되었거나 다른 파일을 가리키면 치명적 에러가 아니라 "북마크 없음"으로 처리합니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::identity::{FileIdentity, same_identity};
use crate::reader::{EveReader, Position};

const BOOKMARK_SUFFIX: &str = ".bookmark";

/// 영속화된 위치
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// 입력 파일 경로
    pub path: PathBuf,
    /// 소비한 줄 수
    pub offset: u64,
    /// 기록 시점의 파일 크기
    pub size: i64,
    /// 물리 파일 identity (지원하지 않는 플랫폼에서는 null)
    pub sys: Option<FileIdentity>,
}

impl Bookmark {
    /// 리더 위치에서 북마크를 만듭니다.
    pub fn from_position(position: &Position) -> Self {
        Self {
            path: position.path.clone(),
            offset: position.line_number,
            size: i64::try_from(position.file_size).unwrap_or(i64::MAX),
            sys: position.identity,
        }
    }
}

/// 입력 파일에 대응하는 북마크 파일 경로를 계산합니다.
pub fn bookmark_path(input: &Path, directory: Option<&Path>) -> PathBuf {
    match directory {
        Some(dir) => {
            let mut hasher = Sha256::new();
            hasher.update(input.to_string_lossy().as_bytes());
            let digest = hasher.finalize();
            dir.join(format!("{digest:x}{BOOKMARK_SUFFIX}"))
        }
        None => {
            let mut name = input.as_os_str().to_owned();
            name.push(BOOKMARK_SUFFIX);
            PathBuf::from(name)
        }
    }
}

/// 입력 파일 하나의 북마크 저장소
#[derive(Debug, Clone)]
pub struct Bookmarker {
    input: PathBuf,
    path: PathBuf,
}

impl Bookmarker {
    /// 새 북마크 저장소를 생성합니다.
    pub fn new(input: impl AsRef<Path>, directory: Option<&Path>) -> Self {
        let input = input.as_ref().to_path_buf();
        let path = bookmark_path(&input, directory);
        Self { input, path }
    }

    /// 북마크 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 북마크를 읽습니다. 없거나 손상되었으면 [`IngestError::NoBookmark`].
    pub async fn read(&self) -> Result<Bookmark, IngestError> {
        let content = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.no_bookmark(e.to_string()))?;
        serde_json::from_slice(&content).map_err(|e| self.no_bookmark(format!("corrupt: {e}")))
    }

    /// 위치를 북마크로 기록합니다.
    ///
    /// 임시 파일에 쓰고 `sync_all` 후 rename으로 교체하므로, 중간에 중단되어도
    /// 이전 북마크나 새 북마크 중 하나만 남습니다.
    pub async fn write(&self, position: &Position) -> Result<(), IngestError> {
        let bookmark = Bookmark::from_position(position);
        let data = serde_json::to_vec(&bookmark).map_err(|e| IngestError::BookmarkIo {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })?;

        let tmp = self.temp_path();
        let result: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        result.map_err(|source| IngestError::BookmarkIo {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            bookmark = %self.path.display(),
            offset = bookmark.offset,
            "bookmark written"
        );
        Ok(())
    }

    /// 북마크가 지금 열린 파일에 적용 가능한지 확인합니다.
    ///
    /// - 경로가 다르면 무효
    /// - 파일이 기록 당시보다 작으면 무효 (트렁케이션)
    /// - identity가 다르면 무효. 한쪽만 알 수 없어도 무효이며,
    ///   양쪽 모두 알 수 없는 플랫폼에서는 크기 검사만 적용
    pub async fn is_valid(&self, bookmark: &Bookmark, reader: &EveReader) -> bool {
        if bookmark.path != reader.path() {
            debug!(bookmark_path = %bookmark.path.display(), "bookmark is for another path");
            return false;
        }

        let size = match reader.file_size().await {
            Ok(size) => size,
            Err(_) => return false,
        };
        if bookmark.size < 0 || size < bookmark.size.unsigned_abs() {
            debug!(size, bookmark_size = bookmark.size, "file smaller than bookmark");
            return false;
        }

        match (bookmark.sys.as_ref(), reader.identity()) {
            (None, None) => true,
            (a, b) => same_identity(a, b),
        }
    }

    /// 북마크로 리더의 시작 위치를 정하고, 정해진 위치를 한 번 기록합니다.
    ///
    /// - 유효한 북마크: 해당 줄까지 건너뛰기 (실패 시 파일 끝으로)
    /// - 없거나 무효: `start_at_end`이면 파일 끝, 아니면 처음부터
    ///
    /// 마지막의 시험 쓰기가 실패하면 에러를 반환합니다 (북마크 디렉토리 권한 등).
    pub async fn init(&self, reader: &mut EveReader, start_at_end: bool) -> Result<(), IngestError> {
        match self.read().await {
            Ok(bookmark) => {
                if self.is_valid(&bookmark, reader).await {
                    info!(
                        path = %self.input.display(),
                        offset = bookmark.offset,
                        "resuming from bookmark"
                    );
                    if let Err(e) = reader.skip_to(bookmark.offset).await {
                        warn!(
                            path = %self.input.display(),
                            error = %e,
                            "failed to skip to bookmark, starting at end of file"
                        );
                        reader.skip_to_end().await?;
                    }
                } else {
                    warn!(
                        path = %self.input.display(),
                        bookmark = %self.path.display(),
                        "bookmark does not match current file, ignoring"
                    );
                    self.fallback(reader, start_at_end).await?;
                }
            }
            Err(e) => {
                info!(path = %self.input.display(), reason = %e, "no bookmark");
                self.fallback(reader, start_at_end).await?;
            }
        }

        let position = reader.position();
        self.write(&position).await
    }

    async fn fallback(&self, reader: &mut EveReader, start_at_end: bool) -> Result<(), IngestError> {
        if start_at_end {
            let skipped = reader.skip_to_end().await?;
            info!(path = %self.input.display(), skipped, "starting at end of file");
        } else {
            info!(path = %self.input.display(), "starting at beginning of file");
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn no_bookmark(&self, reason: String) -> IngestError {
        IngestError::NoBookmark {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookmark_path_next_to_input() {
        let path = bookmark_path(Path::new("/var/log/suricata/eve.json"), None);
        assert_eq!(path, PathBuf::from("/var/log/suricata/eve.json.bookmark"));
    }

    #[test]
    fn bookmark_path_in_directory_is_hashed() {
        let dir = Path::new("/var/lib/evetail");
        let a = bookmark_path(Path::new("/var/log/suricata/eve.json"), Some(dir));
        let b = bookmark_path(Path::new("/var/log/suricata/eve2.json"), Some(dir));
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir));

        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(".bookmark"));
        // sha256 hex = 64자
        assert_eq!(name.len(), 64 + ".bookmark".len());
    }

    #[test]
    fn bookmark_serialization_format() {
        let bookmark = Bookmark {
            path: PathBuf::from("/data/eve.json"),
            offset: 10,
            size: 2048,
            sys: Some(FileIdentity {
                inode: 5,
                dev: Some(9),
            }),
        };
        let json = serde_json::to_string(&bookmark).unwrap();
        assert_eq!(
            json,
            r#"{"path":"/data/eve.json","offset":10,"size":2048,"sys":{"inode":5,"dev":9}}"#
        );
    }

    #[test]
    fn bookmark_without_identity_parses() {
        let bookmark: Bookmark =
            serde_json::from_str(r#"{"path":"/data/eve.json","offset":3,"size":100,"sys":null}"#)
                .unwrap();
        assert_eq!(bookmark.offset, 3);
        assert!(bookmark.sys.is_none());
    }

    #[tokio::test]
    async fn read_missing_bookmark_is_no_bookmark() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarker = Bookmarker::new(dir.path().join("eve.json"), None);
        let err = bookmarker.read().await.unwrap_err();
        assert!(matches!(err, IngestError::NoBookmark { .. }));
    }

    #[tokio::test]
    async fn read_corrupt_bookmark_is_no_bookmark() {
        let dir = tempfile::tempdir().unwrap();
        let bookmarker = Bookmarker::new(dir.path().join("eve.json"), None);
        std::fs::write(bookmarker.path(), b"{\"path\": trunc").unwrap();
        let err = bookmarker.read().await.unwrap_err();
        assert!(err.to_string().contains("corrupt"));
    }

    #[tokio::test]
    async fn write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let bookmarker = Bookmarker::new(dir.path().join("eve.json"), Some(&missing));
        let position = Position {
            path: dir.path().join("eve.json"),
            line_number: 1,
            file_size: 10,
            identity: None,
        };
        let err = bookmarker.write(&position).await.unwrap_err();
        assert!(matches!(err, IngestError::BookmarkIo { .. }));
    }

    #[tokio::test]
    async fn write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("eve.json");
        let bookmarker = Bookmarker::new(&input, Some(dir.path()));
        let position = Position {
            path: input,
            line_number: 7,
            file_size: 700,
            identity: None,
        };
        bookmarker.write(&position).await.unwrap();
        bookmarker.write(&position).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].ends_with(".bookmark"));
        assert_eq!(bookmarker.read().await.unwrap().offset, 7);
    }
}
