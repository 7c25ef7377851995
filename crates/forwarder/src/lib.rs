#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`routing`]: 이벤트 선택, 보강, 테넌트 필터링, 타입별 카운터
//! - [`filter`]: 테넌트 규칙 파일 (탭 구분 / YAML) 로딩 및 first-match 조회
//! - [`shipper`]: RFC 5424 패킷, text/JSON 포매터, TCP/UDP 전송, 조직별 캡처 파일
//! - [`stats`]: 주기적 `firehose_to_syslog_stats` 이벤트
//! - [`cache`]: 인메모리 앱 메타데이터
//! - [`extra_fields`]: `key:value,...` 정적 필드 파싱
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 포워더 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Envelope -> EventRouter -> SyslogShipper -> packet queue -> TransportWorker -> collector
//!                 |               |
//!           FilterEngine    CaptureRegistry -> RotatingFileWriter
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod extra_fields;
pub mod filter;
pub mod pipeline;
pub mod routing;
pub mod shipper;
pub mod stats;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{ForwarderPipeline, ForwarderPipelineBuilder};

// 설정
pub use config::{ForwarderConfig, ForwarderConfigBuilder};

// 에러
pub use error::ForwarderError;

// 라우터
pub use routing::{CounterSnapshot, EventRouter, RouteOutcome};

// 필터
pub use filter::{FilterEngine, FilterLoader, FilterRule, FilterSet};

// shipper
pub use shipper::{CaptureRegistry, CaptureSettings, SyslogSettings, SyslogShipper, TransportWorker};

pub use cache::InMemoryAppCache;
pub use stats::StatsReporter;
