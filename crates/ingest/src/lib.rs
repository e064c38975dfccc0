#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`reader`]: 부분 줄을 허용하는 줄 리더와 로테이션/트렁케이션을 따라가는 EVE 리더
//! - [`bookmark`]: 파일별 재시작 위치 저장 및 검증
//! - [`processor`]: 읽기/보강/제출/커밋/북마크 루프 (Pipeline trait 구현)
//! - [`filter`]: 이벤트 보강 필터 (파일명, 태그)
//! - [`sink`]: JSON Lines 싱크 (파일, stdout)
//! - [`identity`]: 파일 identity (inode, device)
//! - [`config`]: 프로세서 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! eve.json -> LineReader -> EveReader -> FilterChain -> EventSink
//!                              |                           |
//!                          Position  <---- commit ok ------+
//!                              |
//!                          Bookmarker -> {sha256}.bookmark
//! ```

pub mod bookmark;
pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod processor;
pub mod reader;
pub mod sink;

// --- 주요 타입 re-export ---

// 프로세서
pub use processor::{FileProcessor, FileProcessorBuilder, ProcessorStats};

// 설정
pub use config::{ProcessorConfig, ProcessorConfigBuilder};

// 에러
pub use error::IngestError;

// 리더
pub use reader::{EveReader, LineReader, Position};

// 북마크
pub use bookmark::{Bookmark, Bookmarker, bookmark_path};

// 필터
pub use filter::{AddFilenameFilter, AddTagsFilter, FilterChain};

// 싱크
pub use sink::JsonLinesSink;

// identity
pub use identity::FileIdentity;
