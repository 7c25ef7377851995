//! Syslog shipper
//!
//! [`SyslogShipper`]는 [`EventShipper`]를 구현합니다. 이벤트 필드에서 라우팅
//! 제어 키를 제거하고, 인터셉트 대상 메시지를 org별 캡처 파일에 미러링한 뒤,
//! 나머지를 RFC 5424 패킷으로 포매팅하여 [`TransportWorker`] 큐에 넣습니다.
//! 큐 삽입은 블로킹하지 않으며, 큐가 가득 차면 패킷을 버립니다.
//!
//! # 모듈 구성
//!
//! - [`formatter`]: 이벤트 필드와 메시지를 MSG 본문으로 변환 (`text`, `json`)
//! - [`packet`]: RFC 5424 패킷 렌더링
//! - [`transport`]: TCP/UDP 연결, 프레이밍, 전송 워커
//! - [`capture`]: org별 캡처 파일 레지스트리
//! - [`rotating`]: 크기 기반 로테이션 파일 writer

pub mod capture;
pub mod formatter;
pub mod packet;
pub mod rotating;
pub mod transport;

use bytes::Bytes;
use firehose_core::config::SyslogConfig;
use firehose_core::event::keys;
use firehose_core::fields::{FieldValue, Fields};
use firehose_core::metrics as m;
use firehose_core::pipeline::EventShipper;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::ForwarderError;

pub use capture::{CaptureRegistry, CaptureSettings};
pub use formatter::{FieldFormatter, JsonFormatter, TextFormatter, formatter_for};
pub use packet::SyslogPacket;
pub use rotating::{RotatingFileWriter, RotationPolicy};
pub use transport::{Protocol, TcpFraming, TransportSettings, TransportWorker};

const FALLBACK_HOSTNAME: &str = "localhost";

/// 설정에서 확정한 shipper 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogSettings {
    pub transport: TransportSettings,
    /// 패킷 HOSTNAME
    pub hostname: String,
    /// 패킷 APP-NAME
    pub tag: String,
    pub formatter: String,
    pub queue_capacity: usize,
}

impl SyslogSettings {
    /// 설정을 확정합니다. 호스트명이 비어 있으면 시스템 호스트명을 사용합니다.
    pub fn from_config(config: &SyslogConfig) -> Result<Self, ForwarderError> {
        let hostname = if config.hostname.is_empty() {
            system_hostname()
        } else {
            config.hostname.clone()
        };
        // 알 수 없는 포매터 이름은 미리 거부
        formatter_for(&config.formatter)?;

        Ok(Self {
            transport: TransportSettings::from_config(config)?,
            hostname,
            tag: config.tag.clone(),
            formatter: config.formatter.clone(),
            queue_capacity: config.queue_capacity.max(1),
        })
    }
}

fn system_hostname() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!(error = %e, fallback = FALLBACK_HOSTNAME, "failed to read system hostname");
            FALLBACK_HOSTNAME.to_owned()
        }
    }
}

/// 헬스 보고용 큐 사용량
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub capacity: usize,
}

impl QueueStats {
    /// 사용 중인 큐 비율 (0.0 ~ 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.queued as f64 / self.capacity as f64
    }
}

pub struct SyslogShipper {
    hostname: String,
    tag: String,
    protocol: Protocol,
    formatter: Box<dyn FieldFormatter>,
    queue: mpsc::Sender<Bytes>,
    capture: Option<CaptureRegistry>,
}

impl SyslogShipper {
    /// 기존 패킷 큐 위에 shipper를 만듭니다. 전송 연결과 큐 수신단을
    /// [`TransportWorker`]에 연결하는 일은 파이프라인이 start 시점에
    /// 수행합니다.
    pub fn new(
        settings: SyslogSettings,
        capture: Option<CaptureRegistry>,
        queue: mpsc::Sender<Bytes>,
    ) -> Result<Self, ForwarderError> {
        Ok(Self {
            formatter: formatter_for(&settings.formatter)?,
            hostname: settings.hostname,
            tag: settings.tag,
            protocol: settings.transport.protocol,
            queue,
            capture,
        })
    }

    pub fn queue_stats(&self) -> QueueStats {
        let capacity = self.queue.max_capacity();
        QueueStats {
            queued: capacity - self.queue.capacity(),
            capacity,
        }
    }

    pub fn capture(&self) -> Option<&CaptureRegistry> {
        self.capture.as_ref()
    }

    /// 접두사가 일치하면 `message`를 org 캡처 파일에 미러링합니다.
    ///
    /// 쓰기는 동기적으로 라우터의 카운터 락 안에서 수행됩니다. 비용은
    /// 인터셉트된 메시지에만 발생합니다: 버퍼 쓰기와 flush 한 번,
    /// 로테이션 시 rename과 백업 스캔.
    fn intercept(&self, fields: &Fields, prefix: &str, message: &str) {
        let Some(registry) = &self.capture else {
            return;
        };
        if prefix.is_empty() {
            return;
        }
        let Some(rest) = message.strip_prefix(prefix) else {
            return;
        };
        let org_id = fields.get_non_empty_str(keys::CF_ORG_ID).ok().flatten();
        let app_id = fields.get_non_empty_str(keys::CF_APP_ID).ok().flatten();
        let (Some(org_id), Some(_)) = (org_id, app_id) else {
            return;
        };

        if let Err(e) = registry.capture(org_id, rest) {
            metrics::counter!(m::CAPTURE_ERRORS_TOTAL).increment(1);
            warn!(org_id, error = %e, "failed to write captured message");
        }
    }

    fn enqueue(&self, packet: Bytes) {
        match self.queue.try_send(packet) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                metrics::counter!(m::PACKETS_DROPPED_TOTAL, m::LABEL_PROTOCOL => self.protocol.as_str())
                    .increment(1);
                warn!("syslog queue full, dropping packet");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::counter!(m::PACKETS_DROPPED_TOTAL, m::LABEL_PROTOCOL => self.protocol.as_str())
                    .increment(1);
                debug!("syslog queue closed, dropping packet");
            }
        }
    }
}

/// 포매팅 전에 필드에서 제거하는 제어 키
struct Controls {
    structured_data: String,
    skip_syslog: bool,
    intercept_prefix: String,
}

fn take_controls(fields: &mut Fields) -> Controls {
    let structured_data = match fields.remove(keys::STRUCTURED_DATA) {
        Some(FieldValue::Str(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let skip_syslog = matches!(fields.remove(keys::SKIP_SYSLOG), Some(FieldValue::Bool(true)));
    let intercept_prefix = match fields.remove(keys::INTERCEPT_PREFIX) {
        Some(FieldValue::Str(s)) => s,
        _ => String::new(),
    };
    Controls {
        structured_data,
        skip_syslog,
        intercept_prefix,
    }
}

impl EventShipper for SyslogShipper {
    fn ship_events(&self, mut fields: Fields, message: &str) {
        let controls = take_controls(&mut fields);

        self.intercept(&fields, &controls.intercept_prefix, message);

        if controls.skip_syslog {
            return;
        }

        let body = self.formatter.format(&fields, message);
        let packet = SyslogPacket::user_info(
            self.hostname.as_str(),
            self.tag.as_str(),
            controls.structured_data,
            body,
        );
        self.enqueue(Bytes::from(packet.to_string()));
    }
}
