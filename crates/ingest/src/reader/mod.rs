//! 파일 리더
//!
//! - [`LineReader`]: 바이트 오프셋을 추적하며 완전한 줄만 돌려주는 저수준 리더
//! - [`EveReader`]: 로테이션/트렁케이션을 따라가며 줄을 [`EveEvent`](evetail_core::EveEvent)로
//!   디코딩하는 추적 리더

mod eve;
mod line;

pub use eve::{EveReader, Position};
pub use line::LineReader;
