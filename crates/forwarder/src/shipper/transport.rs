//! Syslog 전송: 수집 서버와의 TCP 또는 UDP 연결
//!
//! [`connect`]는 시작 시 한 번 연결을 엽니다. 이후 [`TransportWorker`]가
//! 연결을 소유하고 shipper 큐에서 꺼낸 모든 패킷을 씁니다.
//! 쓰기 에러는 로그와 카운터에만 남기며, 재연결이나 재시도는 하지 않습니다.

use std::str::FromStr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use firehose_core::config::SyslogConfig;
use firehose_core::metrics as m;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ForwarderError;

/// IPv4 UDP 최대 페이로드
pub const MAX_UDP_PAYLOAD: usize = 65_507;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = ForwarderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            other => Err(ForwarderError::Config {
                field: "syslog.protocol".to_owned(),
                reason: format!("unknown protocol '{other}', expected tcp or udp"),
            }),
        }
    }
}

/// TCP 메시지 프레이밍
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TcpFraming {
    /// 패킷 뒤에 `\n`
    #[default]
    NewlineDelimited,
    /// `<length> <packet>` (RFC 6587)
    OctetCounting,
}

impl FromStr for TcpFraming {
    type Err = ForwarderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newline" => Ok(Self::NewlineDelimited),
            "octet-counting" => Ok(Self::OctetCounting),
            other => Err(ForwarderError::Config {
                field: "syslog.tcp_framing".to_owned(),
                reason: format!("unknown framing '{other}', expected newline or octet-counting"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    /// `host:port`
    pub server: String,
    pub protocol: Protocol,
    pub framing: TcpFraming,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl TransportSettings {
    pub fn from_config(config: &SyslogConfig) -> Result<Self, ForwarderError> {
        Ok(Self {
            server: config.server.clone(),
            protocol: config.protocol.parse()?,
            framing: config.tcp_framing.parse()?,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
        })
    }

    /// `protocol://server` (로그와 에러 메시지용)
    pub fn target(&self) -> String {
        format!("{}://{}", self.protocol.as_str(), self.server)
    }
}

/// 수집 서버와 열린 연결
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// 연결 타임아웃 안에 수집 서버에 연결합니다.
pub async fn connect(settings: &TransportSettings) -> Result<Connection, ForwarderError> {
    let target = settings.target();
    let to_err = |reason: String| ForwarderError::Transport {
        target: target.clone(),
        reason,
    };

    let connection = match settings.protocol {
        Protocol::Tcp => {
            let stream = timeout(settings.connect_timeout, TcpStream::connect(&settings.server))
                .await
                .map_err(|_| {
                    to_err(format!(
                        "connect timed out after {:?}",
                        settings.connect_timeout
                    ))
                })?
                .map_err(|e| to_err(e.to_string()))?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "failed to set TCP_NODELAY");
            }
            Connection::Tcp(stream)
        }
        Protocol::Udp => {
            let socket = UdpSocket::bind(("0.0.0.0", 0))
                .await
                .map_err(|e| to_err(format!("bind failed: {e}")))?;
            timeout(settings.connect_timeout, socket.connect(&settings.server))
                .await
                .map_err(|_| to_err("address resolution timed out".to_owned()))?
                .map_err(|e| to_err(e.to_string()))?;
            Connection::Udp(socket)
        }
    };

    info!(collector = %target, "connected to syslog collector");
    Ok(connection)
}

/// 패킷 하나를 전송용으로 프레이밍합니다.
pub fn frame(packet: &[u8], protocol: Protocol, framing: TcpFraming) -> Bytes {
    match (protocol, framing) {
        (Protocol::Udp, _) => Bytes::copy_from_slice(&packet[..packet.len().min(MAX_UDP_PAYLOAD)]),
        (Protocol::Tcp, TcpFraming::NewlineDelimited) => {
            let mut buf = BytesMut::with_capacity(packet.len() + 1);
            buf.put_slice(packet);
            buf.put_u8(b'\n');
            buf.freeze()
        }
        (Protocol::Tcp, TcpFraming::OctetCounting) => {
            let header = format!("{} ", packet.len());
            let mut buf = BytesMut::with_capacity(header.len() + packet.len());
            buf.put_slice(header.as_bytes());
            buf.put_slice(packet);
            buf.freeze()
        }
    }
}

/// 패킷 큐를 연결로 비우는 워커
pub struct TransportWorker {
    connection: Connection,
    rx: mpsc::Receiver<Bytes>,
    settings: TransportSettings,
}

impl TransportWorker {
    pub fn new(connection: Connection, rx: mpsc::Receiver<Bytes>, settings: TransportSettings) -> Self {
        Self {
            connection,
            rx,
            settings,
        }
    }

    /// 큐가 닫히거나 `cancel`이 발생할 때까지 실행합니다. `cancel` 시점에
    /// 이미 큐에 있던 패킷은 씁니다.
    pub async fn run(mut self, cancel: CancellationToken) {
        let target = self.settings.target();
        let mut sent: u64 = 0;

        loop {
            tokio::select! {
                packet = self.rx.recv() => {
                    match packet {
                        Some(packet) => {
                            if self.send(&packet, &target).await {
                                sent += 1;
                            }
                        }
                        None => {
                            debug!(collector = %target, "packet queue closed");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    self.rx.close();
                    while let Some(packet) = self.rx.recv().await {
                        if self.send(&packet, &target).await {
                            sent += 1;
                        }
                    }
                    break;
                }
            }
        }

        if let Connection::Tcp(stream) = &mut self.connection {
            if let Err(e) = stream.shutdown().await {
                debug!(collector = %target, error = %e, "tcp shutdown failed");
            }
        }
        info!(collector = %target, sent, "syslog transport stopped");
    }

    async fn send(&mut self, packet: &[u8], target: &str) -> bool {
        let protocol = self.settings.protocol;
        if protocol == Protocol::Udp && packet.len() > MAX_UDP_PAYLOAD {
            warn!(
                collector = %target,
                size = packet.len(),
                max = MAX_UDP_PAYLOAD,
                "syslog packet truncated to fit a UDP datagram"
            );
        }
        let framed = frame(packet, protocol, self.settings.framing);

        let result = match &mut self.connection {
            Connection::Tcp(stream) => timeout(self.settings.write_timeout, stream.write_all(&framed))
                .await
                .map_err(|_| "write timed out".to_owned())
                .and_then(|r| r.map_err(|e| e.to_string())),
            Connection::Udp(socket) => timeout(self.settings.write_timeout, socket.send(&framed))
                .await
                .map_err(|_| "write timed out".to_owned())
                .and_then(|r| r.map(|_| ()).map_err(|e| e.to_string())),
        };

        match result {
            Ok(()) => {
                metrics::counter!(m::PACKETS_SENT_TOTAL, m::LABEL_PROTOCOL => protocol.as_str())
                    .increment(1);
                true
            }
            Err(reason) => {
                metrics::counter!(m::TRANSPORT_ERRORS_TOTAL, m::LABEL_PROTOCOL => protocol.as_str())
                    .increment(1);
                warn!(collector = %target, error = %reason, "failed to write syslog packet");
                false
            }
        }
    }
}
