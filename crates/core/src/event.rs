//! 엔벨로프와 이벤트
//!
//! [`Envelope`]는 플랫폼 이벤트 버스에서 온 원시 텔레메트리 메시지 하나입니다.
//! 라우터는 선택된 엔벨로프를 [`Event`]로 변환합니다. 이벤트는 타입 이름,
//! 메시지, 보강 단계를 거치며 채워지는 [`Fields`] 맵으로 구성됩니다.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fields::Fields;
use crate::pipeline::AppMetadataCache;

/// 잘 알려진 필드 이름
pub mod keys {
    pub const ORIGIN: &str = "origin";
    pub const DEPLOYMENT: &str = "deployment";
    pub const JOB: &str = "job";
    pub const INDEX: &str = "index";
    pub const IP: &str = "ip";
    pub const ENVELOPE_TIMESTAMP: &str = "envelope_timestamp";

    pub const CF_ORIGIN: &str = "cf_origin";
    pub const EVENT_TYPE: &str = "event_type";

    pub const CF_APP_ID: &str = "cf_app_id";
    pub const CF_APP_NAME: &str = "cf_app_name";
    pub const CF_SPACE_ID: &str = "cf_space_id";
    pub const CF_SPACE_NAME: &str = "cf_space_name";
    pub const CF_ORG_ID: &str = "cf_org_id";
    pub const CF_ORG_NAME: &str = "cf_org_name";

    /// 필터 규칙이 설정하고 shipper가 소비하는 제어 키
    pub const STRUCTURED_DATA: &str = "rfc5424_structureddata";
    pub const SKIP_SYSLOG: &str = "rfc5424_skip_syslog";
    pub const INTERCEPT_PREFIX: &str = "rfc5424_intercept_prefix";
}

/// 모든 이벤트의 `cf_origin` 값
pub const CF_ORIGIN_VALUE: &str = "firehose";

/// 엔벨로프 구분자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    HttpStart,
    HttpStop,
    HttpStartStop,
    LogMessage,
    ValueMetric,
    CounterEvent,
    Error,
    ContainerMetric,
}

impl EventType {
    /// 지원하는 모든 타입
    pub const ALL: [EventType; 8] = [
        Self::HttpStart,
        Self::HttpStop,
        Self::HttpStartStop,
        Self::LogMessage,
        Self::ValueMetric,
        Self::CounterEvent,
        Self::Error,
        Self::ContainerMetric,
    ];

    /// 대소문자를 구분하는 정식 이름
    pub fn name(self) -> &'static str {
        match self {
            Self::HttpStart => "HttpStart",
            Self::HttpStop => "HttpStop",
            Self::HttpStartStop => "HttpStartStop",
            Self::LogMessage => "LogMessage",
            Self::ValueMetric => "ValueMetric",
            Self::CounterEvent => "CounterEvent",
            Self::Error => "Error",
            Self::ContainerMetric => "ContainerMetric",
        }
    }

    /// 정식 이름으로 정확히 일치하는 타입 조회
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// 정렬 후 쉼표로 이은 유효 이름 목록
    pub fn valid_names() -> String {
        let mut names: Vec<&str> = Self::ALL.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 원시 텔레메트리 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub deployment: String,
    #[serde(default)]
    pub job: String,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub ip: String,
    /// Unix epoch 기준 나노초
    #[serde(default)]
    pub timestamp: i64,
    pub payload: Payload,
}

impl Envelope {
    pub fn new(origin: impl Into<String>, payload: Payload) -> Self {
        Self {
            origin: origin.into(),
            deployment: String::new(),
            job: String::new(),
            index: String::new(),
            ip: String::new(),
            timestamp: 0,
            payload,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }
}

/// 타입별 엔벨로프 본문
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Payload {
    HttpStart(HttpStart),
    HttpStop(HttpStop),
    HttpStartStop(HttpStartStop),
    LogMessage(LogMessage),
    ValueMetric(ValueMetric),
    CounterEvent(CounterEvent),
    Error(ErrorEvent),
    ContainerMetric(ContainerMetric),
}

impl Payload {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::HttpStart(_) => EventType::HttpStart,
            Self::HttpStop(_) => EventType::HttpStop,
            Self::HttpStartStop(_) => EventType::HttpStartStop,
            Self::LogMessage(_) => EventType::LogMessage,
            Self::ValueMetric(_) => EventType::ValueMetric,
            Self::CounterEvent(_) => EventType::CounterEvent,
            Self::Error(_) => EventType::Error,
            Self::ContainerMetric(_) => EventType::ContainerMetric,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStart {
    pub timestamp: i64,
    pub request_id: String,
    pub peer_type: String,
    pub method: String,
    pub uri: String,
    pub remote_address: String,
    pub user_agent: String,
    pub application_id: String,
    pub instance_index: i32,
    pub instance_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStop {
    pub timestamp: i64,
    pub uri: String,
    pub request_id: String,
    pub peer_type: String,
    pub status_code: i32,
    pub content_length: i64,
    pub application_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStartStop {
    pub start_timestamp: i64,
    pub stop_timestamp: i64,
    pub request_id: String,
    pub peer_type: String,
    pub method: String,
    pub uri: String,
    pub remote_address: String,
    pub user_agent: String,
    pub status_code: i32,
    pub content_length: i64,
    pub application_id: String,
    pub instance_index: i32,
    pub instance_id: String,
}

/// 로그 라인의 출처 스트림
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Out,
    Err,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Out => "OUT",
            Self::Err => "ERR",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogMessage {
    pub message: String,
    pub message_type: MessageType,
    pub timestamp: i64,
    pub app_id: String,
    pub source_type: String,
    pub source_instance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterEvent {
    pub name: String,
    pub delta: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorEvent {
    pub source: String,
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMetric {
    pub application_id: String,
    pub instance_index: i32,
    pub cpu_percentage: f64,
    pub memory_bytes: u64,
    pub disk_bytes: u64,
}

/// 전송 준비 중인 이벤트
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub msg: String,
    pub fields: Fields,
}

impl Event {
    pub fn new(event_type: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            msg: msg.into(),
            fields: Fields::new(),
        }
    }

    /// 엔벨로프에 맞는 타입별 이벤트를 생성합니다.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let event_type = envelope.event_type().name();
        match &envelope.payload {
            Payload::HttpStart(p) => Self::with_fields(event_type, "", http_start_fields(p)),
            Payload::HttpStop(p) => Self::with_fields(event_type, "", http_stop_fields(p)),
            Payload::HttpStartStop(p) => {
                Self::with_fields(event_type, "", http_start_stop_fields(p))
            }
            Payload::LogMessage(p) => {
                let mut fields = Fields::new();
                fields.insert(keys::CF_APP_ID, p.app_id.as_str());
                fields.insert("timestamp", p.timestamp);
                fields.insert("source_type", p.source_type.as_str());
                fields.insert("message_type", p.message_type.as_str());
                fields.insert("source_instance", p.source_instance.as_str());
                Self::with_fields(event_type, p.message.as_str(), fields)
            }
            Payload::ValueMetric(p) => {
                let mut fields = Fields::new();
                fields.insert("name", p.name.as_str());
                fields.insert("value", p.value);
                fields.insert("unit", p.unit.as_str());
                Self::with_fields(event_type, "", fields)
            }
            Payload::CounterEvent(p) => {
                let mut fields = Fields::new();
                fields.insert("name", p.name.as_str());
                fields.insert("delta", p.delta);
                fields.insert("total", p.total);
                Self::with_fields(event_type, "", fields)
            }
            Payload::Error(p) => {
                let mut fields = Fields::new();
                fields.insert("source", p.source.as_str());
                fields.insert("code", p.code);
                Self::with_fields(event_type, p.message.as_str(), fields)
            }
            Payload::ContainerMetric(p) => {
                let mut fields = Fields::new();
                fields.insert(keys::CF_APP_ID, p.application_id.as_str());
                fields.insert("instance_index", p.instance_index);
                fields.insert("cpu_percentage", p.cpu_percentage);
                fields.insert("memory_bytes", p.memory_bytes);
                fields.insert("disk_bytes", p.disk_bytes);
                Self::with_fields(event_type, "", fields)
            }
        }
    }

    fn with_fields(event_type: &str, msg: &str, fields: Fields) -> Self {
        Self {
            event_type: event_type.to_owned(),
            msg: msg.to_owned(),
            fields,
        }
    }

    /// 엔벨로프 수준 식별 정보를 필드에 복사합니다.
    pub fn annotate_with_envelope_data(&mut self, envelope: &Envelope) {
        self.fields.insert(keys::ORIGIN, envelope.origin.as_str());
        self.fields.insert(keys::DEPLOYMENT, envelope.deployment.as_str());
        self.fields.insert(keys::JOB, envelope.job.as_str());
        self.fields.insert(keys::INDEX, envelope.index.as_str());
        self.fields.insert(keys::IP, envelope.ip.as_str());
        self.fields
            .insert(keys::ENVELOPE_TIMESTAMP, envelope.timestamp);
    }

    /// origin 표식과 타입 이름을 추가한 뒤 정적 필드를 병합합니다.
    ///
    /// 정적 필드는 마지막에 적용되어 기존 키를 덮어씁니다.
    pub fn annotate_with_metadata(&mut self, extra_fields: &BTreeMap<String, String>) {
        self.fields.insert(keys::CF_ORIGIN, CF_ORIGIN_VALUE);
        self.fields.insert(keys::EVENT_TYPE, self.event_type.as_str());
        for (key, value) in extra_fields {
            self.fields.insert(key.as_str(), value.as_str());
        }
    }

    /// 앱 ID가 있으면 캐시로 app/space/org 이름을 조회합니다.
    ///
    /// 캐시에서 앱을 찾았으면 true를 반환합니다.
    pub fn annotate_with_app_data(&mut self, cache: &dyn AppMetadataCache) -> bool {
        let app_id = match self.fields.get_non_empty_str(keys::CF_APP_ID) {
            Ok(Some(id)) => id.to_owned(),
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "ignoring malformed app id");
                return false;
            }
        };

        let Some(info) = cache.lookup(&app_id) else {
            return false;
        };
        self.fields.insert_non_empty(keys::CF_APP_NAME, &info.name);
        self.fields.insert_non_empty(keys::CF_SPACE_ID, &info.space_id);
        self.fields.insert_non_empty(keys::CF_SPACE_NAME, &info.space_name);
        self.fields.insert_non_empty(keys::CF_ORG_ID, &info.org_id);
        self.fields.insert_non_empty(keys::CF_ORG_NAME, &info.org_name);
        true
    }
}

fn http_start_fields(p: &HttpStart) -> Fields {
    let mut fields = Fields::new();
    fields.insert(keys::CF_APP_ID, p.application_id.as_str());
    fields.insert("timestamp", p.timestamp);
    fields.insert("request_id", p.request_id.as_str());
    fields.insert("peer_type", p.peer_type.as_str());
    fields.insert("method", p.method.as_str());
    fields.insert("uri", p.uri.as_str());
    fields.insert("remote_addr", p.remote_address.as_str());
    fields.insert("user_agent", p.user_agent.as_str());
    fields.insert("instance_index", p.instance_index);
    fields.insert("instance_id", p.instance_id.as_str());
    fields
}

fn http_stop_fields(p: &HttpStop) -> Fields {
    let mut fields = Fields::new();
    fields.insert(keys::CF_APP_ID, p.application_id.as_str());
    fields.insert("timestamp", p.timestamp);
    fields.insert("uri", p.uri.as_str());
    fields.insert("request_id", p.request_id.as_str());
    fields.insert("peer_type", p.peer_type.as_str());
    fields.insert("status_code", p.status_code);
    fields.insert("content_length", p.content_length);
    fields
}

fn http_start_stop_fields(p: &HttpStartStop) -> Fields {
    let mut fields = Fields::new();
    fields.insert(keys::CF_APP_ID, p.application_id.as_str());
    fields.insert("start_timestamp", p.start_timestamp);
    fields.insert("stop_timestamp", p.stop_timestamp);
    fields.insert(
        "duration_ms",
        p.stop_timestamp.saturating_sub(p.start_timestamp) / 1_000_000,
    );
    fields.insert("request_id", p.request_id.as_str());
    fields.insert("peer_type", p.peer_type.as_str());
    fields.insert("method", p.method.as_str());
    fields.insert("uri", p.uri.as_str());
    fields.insert("remote_addr", p.remote_address.as_str());
    fields.insert("user_agent", p.user_agent.as_str());
    fields.insert("status_code", p.status_code);
    fields.insert("content_length", p.content_length);
    fields.insert("instance_index", p.instance_index);
    fields.insert("instance_id", p.instance_id.as_str());
    fields
}
