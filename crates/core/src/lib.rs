#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod event;
pub mod fields;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---
// 크레이트 루트에서 핵심 타입을 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{ConfigError, FieldError, FirehoseError, PipelineError, TransportError};

// 설정
pub use config::FirehoseConfig;

// 이벤트
pub use event::{Envelope, Event, EventType, Payload};

// 필드
pub use fields::{FieldValue, Fields};

// 파이프라인 trait
pub use pipeline::{AppInfo, AppMetadataCache, EventShipper, HealthStatus, Pipeline};
