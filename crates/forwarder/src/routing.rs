//! 이벤트 라우터 -- 선택, 보강, 테넌트 필터링, 카운팅
//!
//! [`EventRouter::route_event`]는 엔벨로프 하나를 선택, 이벤트 생성, 보강,
//! 테넌트 필터링, 전송 단계로 처리하고 전송한 이벤트를 카운트합니다.
//! 라우터는 모든 입력 스트림이 `Arc<EventRouter>`로 공유합니다. 선택 집합과
//! 필터 규칙은 [`EventRouter::setup_event_routing`] 이후 고정되고,
//! 카운터는 하나의 mutex 뒤에 있습니다.
//!
//! # 처리 단계
//! 1. 선택: 선택 집합에 없는 타입은 [`RouteOutcome::Unselected`]
//! 2. 생성 및 보강: 엔벨로프 데이터, 정적 필드, 앱 메타데이터
//! 3. 필터: `org/space/app` 경로에 첫 번째로 일치하는 규칙의 제어 키 복사
//! 4. 전송: 카운터 락 안에서 shipper 호출과 카운터 증가
//!
//! # 사용 예시
//! ```ignore
//! let mut router = EventRouter::new(shipper, cache, extra_fields);
//! router.setup_event_routing("LogMessage,Error", Some(Path::new("rules.tsv"))).await?;
//!
//! let router = Arc::new(router);
//! assert_eq!(router.route_event(&envelope), RouteOutcome::Shipped);
//! println!("shipped: {}", router.total_count());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use firehose_core::event::{Envelope, Event, EventType, keys};
use firehose_core::metrics as m;
use firehose_core::pipeline::{AppMetadataCache, EventShipper};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::ForwarderError;
use crate::filter::{FilterEngine, tenant_path};

/// 엔벨로프 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// 선택 집합에 없는 타입
    Unselected,
    /// 테넌트 필터 규칙에 의해 거부됨
    Filtered,
    /// shipper에 전달되고 카운트됨
    Shipped,
}

/// 한 번의 락 획득으로 얻은 카운터 값
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
}

pub struct EventRouter {
    shipper: Arc<dyn EventShipper>,
    cache: Arc<dyn AppMetadataCache>,
    extra_fields: BTreeMap<String, String>,
    selected: HashSet<EventType>,
    filter: Option<FilterEngine>,
    counters: Mutex<BTreeMap<String, u64>>,
}

impl EventRouter {
    /// 빈 선택 집합으로 라우터를 생성합니다.
    /// [`setup_event_routing`](Self::setup_event_routing)이 성공하기 전까지 아무것도 라우팅하지 않습니다.
    pub fn new(
        shipper: Arc<dyn EventShipper>,
        cache: Arc<dyn AppMetadataCache>,
        extra_fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            shipper,
            cache,
            extra_fields,
            selected: HashSet::new(),
            filter: None,
            counters: Mutex::new(BTreeMap::new()),
        }
    }

    /// 선택 집합과 (선택적으로) 테넌트 필터 규칙을 설치합니다.
    ///
    /// `wanted`는 쉼표로 구분된 이벤트 타입 이름 목록이며, 비어 있으면
    /// `LogMessage`를 선택합니다. 선택 집합과 필터를 모두 만든 뒤에 설치하므로
    /// 실패하면 라우터는 그대로 남습니다.
    /// 이전 선택에서 빠진 타입의 카운터는 유지됩니다.
    pub async fn setup_event_routing(
        &mut self,
        wanted: &str,
        filter_path: Option<&Path>,
    ) -> Result<(), ForwarderError> {
        let selected = parse_selection(wanted)?;
        let filter = match filter_path {
            Some(path) => Some(FilterEngine::load(path).await?),
            None => None,
        };

        let counters = self.counters.get_mut();
        for event_type in &selected {
            counters.entry(event_type.name().to_owned()).or_insert(0);
        }

        let mut names: Vec<&str> = selected.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        info!(
            selected = %names.join(","),
            filter_rules = filter.as_ref().map_or(0, FilterEngine::len),
            default_sd = filter
                .as_ref()
                .and_then(FilterEngine::default_structured_data)
                .unwrap_or("-"),
            "event routing configured"
        );

        self.selected = selected;
        self.filter = filter;
        Ok(())
    }

    /// 엔벨로프 하나를 라우팅합니다.
    pub fn route_event(&self, envelope: &Envelope) -> RouteOutcome {
        metrics::counter!(m::ENVELOPES_RECEIVED_TOTAL).increment(1);

        let event_type = envelope.event_type();
        if !self.selected.contains(&event_type) {
            metrics::counter!(m::ENVELOPES_UNSELECTED_TOTAL).increment(1);
            return RouteOutcome::Unselected;
        }

        let mut event = Event::from_envelope(envelope);
        event.annotate_with_envelope_data(envelope);
        event.annotate_with_metadata(&self.extra_fields);
        event.annotate_with_app_data(self.cache.as_ref());

        if !self.accept(&mut event) {
            metrics::counter!(m::EVENTS_FILTERED_TOTAL).increment(1);
            debug!(event_type = %event_type, "event rejected by filter");
            return RouteOutcome::Filtered;
        }

        let Event {
            event_type,
            msg,
            fields,
        } = event;

        {
            let mut counters = self.counters.lock();
            self.shipper.ship_events(fields, &msg);
            *counters.entry(event_type.clone()).or_insert(0) += 1;
        }

        metrics::counter!(m::EVENTS_SHIPPED_TOTAL, m::LABEL_EVENT_TYPE => event_type)
            .increment(1);
        RouteOutcome::Shipped
    }

    /// 테넌트 규칙 적용. 앱 이름이 확인되지 않은 이벤트는 항상 통과합니다.
    fn accept(&self, event: &mut Event) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };

        let path = {
            let fields = &event.fields;
            let app = match fields.get_non_empty_str(keys::CF_APP_NAME) {
                Ok(Some(app)) => app,
                Ok(None) => return true,
                Err(e) => {
                    warn!(error = %e, "app name has unexpected type, treating as infra event");
                    return true;
                }
            };
            let org = fields
                .get_non_empty_str(keys::CF_ORG_NAME)
                .ok()
                .flatten()
                .unwrap_or_default();
            let space = fields
                .get_non_empty_str(keys::CF_SPACE_NAME)
                .ok()
                .flatten()
                .unwrap_or_default();
            tenant_path(org, space, app)
        };

        match filter.match_path(&path) {
            Some(rule) => {
                rule.apply_to(&mut event.fields);
                true
            }
            None => false,
        }
    }

    /// 모든 카운터의 합
    pub fn total_count(&self) -> u64 {
        self.counters.lock().values().sum()
    }

    /// 한 번의 락 획득으로 얻은 전체 및 타입별 카운트
    pub fn counters_snapshot(&self) -> CounterSnapshot {
        let counters = self.counters.lock();
        CounterSnapshot {
            total: counters.values().sum(),
            by_type: counters.clone(),
        }
    }

    pub fn is_selected(&self, event_type: EventType) -> bool {
        self.selected.contains(&event_type)
    }

    /// 이름순으로 정렬된 선택 타입
    pub fn selected_events(&self) -> Vec<EventType> {
        let mut selected: Vec<EventType> = self.selected.iter().copied().collect();
        selected.sort_unstable_by_key(|t| t.name());
        selected
    }

    pub fn filter(&self) -> Option<&FilterEngine> {
        self.filter.as_ref()
    }

    pub fn shipper(&self) -> &Arc<dyn EventShipper> {
        &self.shipper
    }
}

/// 쉼표로 구분된 이벤트 타입 이름 목록을 파싱합니다.
pub fn parse_selection(wanted: &str) -> Result<HashSet<EventType>, ForwarderError> {
    let mut selected = HashSet::new();
    for name in wanted.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let event_type =
            EventType::from_name(name).ok_or_else(|| ForwarderError::UnknownEventType {
                name: name.to_owned(),
                valid: EventType::valid_names(),
            })?;
        selected.insert(event_type);
    }
    if selected.is_empty() {
        selected.insert(EventType::LogMessage);
    }
    Ok(selected)
}
