//! 파이프라인 trait -- 생명주기, 싱크, 필터 확장 포인트 정의
//!
//! - [`Pipeline`]: 데몬이 관리하는 모듈의 start/stop/health_check 생명주기
//! - [`EventSink`]: 레코드를 받아 배치 단위로 영속화하는 저장소 계약
//! - [`EventFilter`]: 제출 전에 레코드를 제자리에서 변경하는 보강 단계

use std::future::Future;

use serde::Serialize;

use crate::error::{EvetailError, SinkError};
use crate::event::EveEvent;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작 중이지만 성능/가용성 저하
    Degraded(String),
    /// 동작 불가
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 데몬이 관리하는 모듈의 생명주기 trait
///
/// `start()`는 백그라운드 태스크를 스폰하고 즉시 반환하며,
/// `stop()`은 태스크가 완전히 끝날 때까지 대기합니다.
pub trait Pipeline: Send {
    /// 모듈을 시작합니다. 이미 실행 중이면 `PipelineError::AlreadyRunning`.
    fn start(&mut self) -> impl Future<Output = Result<(), EvetailError>> + Send;

    /// 모듈을 정지합니다. 실행 중이 아니면 `PipelineError::NotRunning`.
    fn stop(&mut self) -> impl Future<Output = Result<(), EvetailError>> + Send;

    /// 모듈의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 커밋 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStatus {
    /// 이번 커밋으로 영속화된 레코드 수
    pub committed: usize,
}

/// 레코드 저장소 계약
///
/// `submit()`으로 쌓인 레코드는 `commit()`이 성공해야 영속화된 것으로 간주합니다.
/// `commit()`은 자신의 실패 이후 다시 호출해도 안전해야 하며,
/// 재시도 시 같은 레코드를 다시 보낼 수 있습니다 (at-least-once).
pub trait EventSink: Send {
    /// 레코드 하나를 현재 배치에 추가합니다.
    fn submit(&mut self, event: EveEvent) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// 지금까지 제출된 레코드를 영속화합니다.
    fn commit(&mut self) -> impl Future<Output = Result<CommitStatus, SinkError>> + Send;
}

/// 레코드 보강 필터
///
/// 에러 채널이 없습니다. 실패는 필터 내부에서 처리해야 합니다.
pub trait EventFilter: Send + Sync {
    /// 필터 이름
    fn name(&self) -> &str;

    /// 레코드를 제자리에서 변경합니다.
    fn apply(&self, event: &mut EveEvent);
}
