#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, DecodeError, EvetailError, PipelineError, SinkError};

// 설정
pub use config::EvetailConfig;

// 이벤트
pub use event::EveEvent;

// 파이프라인 trait
pub use pipeline::{CommitStatus, EventFilter, EventSink, HealthStatus, Pipeline};
