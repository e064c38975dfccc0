//! 레코드 보강 필터 체인
//!
//! [`FilterChain`]은 [`EventFilter`] 목록을 등록 순서대로 적용합니다.
//! 필터는 에러를 반환하지 않으므로, 체인 적용은 항상 성공합니다.

use std::fmt;
use std::sync::Arc;

use evetail_core::event::EveEvent;
use evetail_core::pipeline::EventFilter;
use serde_json::Value;

/// 순서가 있는 필터 목록
///
/// 파일 프로세서마다 복제해서 쓰도록 `Arc`로 필터를 공유합니다.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn EventFilter>>,
}

impl FilterChain {
    /// 빈 체인을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 체인 끝에 필터를 추가합니다.
    pub fn add(&mut self, filter: impl EventFilter + 'static) {
        self.filters.push(Arc::new(filter));
    }

    /// 이미 공유 중인 필터를 추가합니다.
    pub fn add_shared(&mut self, filter: Arc<dyn EventFilter>) {
        self.filters.push(filter);
    }

    /// 모든 필터를 순서대로 적용합니다.
    pub fn apply(&self, event: &mut EveEvent) {
        for filter in &self.filters {
            filter.apply(event);
        }
    }

    /// 등록된 필터 수
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// 필터가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// 등록 순서대로 필터 이름
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

/// 레코드에 원본 파일명을 기록하는 필터
///
/// `evetail.filename` 필드에 입력 파일 경로를 넣습니다.
#[derive(Debug, Clone)]
pub struct AddFilenameFilter {
    filename: Value,
}

impl AddFilenameFilter {
    /// 새 필터를 생성합니다.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: Value::String(filename.into()),
        }
    }
}

impl EventFilter for AddFilenameFilter {
    fn name(&self) -> &str {
        "add-filename"
    }

    fn apply(&self, event: &mut EveEvent) {
        event.insert_nested("evetail", "filename", self.filename.clone());
    }
}

/// 모든 레코드에 고정 태그를 붙이는 필터
#[derive(Debug, Clone)]
pub struct AddTagsFilter {
    tags: Vec<String>,
}

impl AddTagsFilter {
    /// 새 필터를 생성합니다.
    pub fn new(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

impl EventFilter for AddTagsFilter {
    fn name(&self) -> &str {
        "add-tags"
    }

    fn apply(&self, event: &mut EveEvent) {
        for tag in &self.tags {
            event.add_tag(tag);
        }
    }
}
