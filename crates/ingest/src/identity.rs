//! 플랫폼 파일 identity
//!
//! 로테이션 감지와 북마크 검증은 "같은 경로가 여전히 같은 물리 파일인가"에 달려 있습니다.
//! Unix에서는 (device, inode) 쌍으로 비교하고, 지원하지 않는 플랫폼에서는
//! identity를 알 수 없음(`None`)으로 취급합니다.

use std::fs::Metadata;

use serde::{Deserialize, Serialize};

/// 물리 파일 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// inode 번호
    pub inode: u64,
    /// 디바이스 번호 (구버전 북마크에는 없을 수 있음)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<u64>,
}

/// 메타데이터에서 identity를 추출합니다.
#[cfg(unix)]
pub fn identity_of(metadata: &Metadata) -> Option<FileIdentity> {
    use std::os::unix::fs::MetadataExt;

    Some(FileIdentity {
        inode: metadata.ino(),
        dev: Some(metadata.dev()),
    })
}

/// 메타데이터에서 identity를 추출합니다.
#[cfg(not(unix))]
pub fn identity_of(_metadata: &Metadata) -> Option<FileIdentity> {
    None
}

/// 두 identity가 같은 물리 파일을 가리키는지 확인합니다.
///
/// 어느 한쪽이라도 알 수 없으면 `false`입니다. 디바이스 번호는 양쪽 모두 있을 때만 비교합니다.
pub fn same_identity(a: Option<&FileIdentity>, b: Option<&FileIdentity>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => {
            a.inode == b.inode
                && match (a.dev, b.dev) {
                    (Some(da), Some(db)) => da == db,
                    _ => true,
                }
        }
        _ => false,
    }
}
