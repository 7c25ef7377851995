//! 파이프라인 오케스트레이션: 엔벨로프 수신, 라우팅, 통계, 전송
//!
//! [`ForwarderPipeline`]은 코어 [`Pipeline`] trait을 구현하므로
//! 데몬이 start/stop/health 생명주기로 구동합니다.
//!
//! # 내부 구조
//! ```text
//! source -> mpsc<Envelope> -> ingest task -> EventRouter -> SyslogShipper -> mpsc<Bytes> -> TransportWorker
//!                                               ^
//!                                          StatsReporter
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use firehose_core::error::{FirehoseError, PipelineError};
use firehose_core::event::Envelope;
use firehose_core::pipeline::{AppMetadataCache, HealthStatus, Pipeline};

use crate::cache::InMemoryAppCache;
use crate::config::ForwarderConfig;
use crate::error::ForwarderError;
use crate::extra_fields::parse_extra_fields;
use crate::routing::EventRouter;
use crate::shipper::transport::{self, TransportSettings, TransportWorker};
use crate::shipper::{CaptureRegistry, CaptureSettings, SyslogSettings, SyslogShipper};
use crate::stats::StatsReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Initialized,
    Running,
    Stopped,
}

/// 포워딩 파이프라인
///
/// ```ignore
/// use firehose_forwarder::{ForwarderPipeline, ForwarderPipelineBuilder};
///
/// let (mut pipeline, envelope_tx) = ForwarderPipelineBuilder::new()
///     .config(config)
///     .app_cache(cache)
///     .build()
///     .await?;
///
/// pipeline.start().await?;
/// envelope_tx.send(envelope).await?;
/// ```
pub struct ForwarderPipeline {
    config: ForwarderConfig,
    state: PipelineState,
    router: Arc<EventRouter>,
    shipper: Arc<SyslogShipper>,
    transport: TransportSettings,
    /// `start`에서 가져감
    packet_rx: Option<mpsc::Receiver<Bytes>>,
    /// `start`에서 가져감
    envelope_rx: Option<mpsc::Receiver<Envelope>>,
    /// 수신 태스크와 통계 태스크 정지용
    cancel: CancellationToken,
    /// 생산자가 모두 끝난 뒤 전송 태스크 정지용
    transport_cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    transport_task: Option<JoinHandle<()>>,
}

impl ForwarderPipeline {
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 엔벨로프를 직접 라우팅하는 호출자를 위한 공유 라우터
    pub fn router(&self) -> Arc<EventRouter> {
        Arc::clone(&self.router)
    }

    pub fn shipper(&self) -> &SyslogShipper {
        &self.shipper
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// 패킷 큐 사용률
    pub fn queue_utilization(&self) -> f64 {
        self.shipper.queue_stats().utilization()
    }
}

impl Pipeline for ForwarderPipeline {
    async fn start(&mut self) -> Result<(), FirehoseError> {
        if self.state != PipelineState::Initialized {
            return Err(PipelineError::InvalidState(format!(
                "cannot start a {} pipeline",
                self.state_name()
            ))
            .into());
        }

        tracing::info!(collector = %self.transport.target(), "starting forwarder pipeline");

        // 1. 먼저 연결하여 잘못된 수집 서버 주소가 spawn 이전에 실패하도록 함
        let connection = transport::connect(&self.transport)
            .await
            .map_err(FirehoseError::from)?;

        let (Some(packet_rx), Some(envelope_rx)) = (self.packet_rx.take(), self.envelope_rx.take())
        else {
            return Err(PipelineError::InvalidState("channels already taken".to_owned()).into());
        };

        // 2. 전송 워커
        let worker = TransportWorker::new(connection, packet_rx, self.transport.clone());
        self.transport_task = Some(tokio::spawn(worker.run(self.transport_cancel.clone())));

        // 3. 엔벨로프 수신
        self.tasks.push(tokio::spawn(ingest(
            Arc::clone(&self.router),
            envelope_rx,
            self.cancel.clone(),
        )));

        // 4. 통계
        if let Some(period) = self.config.stats_interval() {
            self.tasks.push(StatsReporter::spawn(
                Arc::clone(&self.router),
                period,
                self.cancel.clone(),
            ));
        }

        self.state = PipelineState::Running;
        tracing::info!(tasks = self.tasks.len() + 1, "forwarder pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), FirehoseError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::InvalidState(format!(
                "cannot stop a {} pipeline",
                self.state_name()
            ))
            .into());
        }

        tracing::info!("stopping forwarder pipeline");
        let timeout = self.config.shutdown_timeout();

        // 생산자 먼저 정지하여 큐에 넣은 패킷이 모두 전송 워커에 도달하도록 함
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            join_with_timeout(task, timeout).await;
        }

        self.transport_cancel.cancel();
        if let Some(task) = self.transport_task.take() {
            join_with_timeout(task, timeout).await;
        }

        self.state = PipelineState::Stopped;
        tracing::info!(total_shipped = self.router.total_count(), "forwarder pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => {
                let utilization = self.queue_utilization();
                if utilization > self.config.degraded_queue_ratio {
                    HealthStatus::Degraded(format!(
                        "syslog queue utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

async fn join_with_timeout(mut task: JoinHandle<()>, timeout: std::time::Duration) {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "pipeline task failed"),
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "pipeline task overran shutdown, aborting"
            );
            task.abort();
        }
    }
}

/// 채널이 닫히거나 `cancel`이 발생할 때까지 엔벨로프를 라우팅합니다.
/// `cancel` 시점에 이미 큐에 있던 엔벨로프는 라우팅합니다.
async fn ingest(
    router: Arc<EventRouter>,
    mut rx: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
) {
    let mut received: u64 = 0;
    loop {
        tokio::select! {
            envelope = rx.recv() => {
                let Some(envelope) = envelope else {
                    tracing::debug!("envelope channel closed");
                    break;
                };
                router.route_event(&envelope);
                received += 1;
            }
            _ = cancel.cancelled() => {
                rx.close();
                while let Some(envelope) = rx.recv().await {
                    router.route_event(&envelope);
                    received += 1;
                }
                break;
            }
        }
    }
    tracing::info!(received, "envelope ingest stopped");
}

/// [`ForwarderPipeline`]과 엔벨로프 채널을 생성합니다.
pub struct ForwarderPipelineBuilder {
    config: ForwarderConfig,
    app_cache: Option<Arc<dyn AppMetadataCache>>,
}

impl ForwarderPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: ForwarderConfig::default(),
            app_cache: None,
        }
    }

    pub fn config(mut self, config: ForwarderConfig) -> Self {
        self.config = config;
        self
    }

    /// 앱 메타데이터 소스. 기본값은 빈 [`InMemoryAppCache`]
    pub fn app_cache(mut self, cache: Arc<dyn AppMetadataCache>) -> Self {
        self.app_cache = Some(cache);
        self
    }

    /// 설정 검증, 정적 필드 파싱, 라우팅 설정을 수행합니다.
    ///
    /// 설정 문제는 `start`가 아니라 여기서 드러납니다.
    pub async fn build(
        self,
    ) -> Result<(ForwarderPipeline, mpsc::Sender<Envelope>), ForwarderError> {
        self.config.validate()?;

        let extra_fields = parse_extra_fields(&self.config.extra_fields)?;
        let settings = SyslogSettings::from_config(&self.config.syslog)?;
        let transport = settings.transport.clone();
        let capture = CaptureSettings::from_config(&self.config.intercept).map(CaptureRegistry::new);

        let (packet_tx, packet_rx) = mpsc::channel(settings.queue_capacity);
        let shipper = Arc::new(SyslogShipper::new(settings, capture, packet_tx)?);

        let cache = self
            .app_cache
            .unwrap_or_else(|| Arc::new(InMemoryAppCache::new()));

        let mut router = EventRouter::new(shipper.clone(), cache, extra_fields);
        router
            .setup_event_routing(&self.config.selected_events, self.config.filter_path())
            .await?;

        let (envelope_tx, envelope_rx) = mpsc::channel(self.config.envelope_queue_capacity);

        let pipeline = ForwarderPipeline {
            config: self.config,
            state: PipelineState::Initialized,
            router: Arc::new(router),
            shipper,
            transport,
            packet_rx: Some(packet_rx),
            envelope_rx: Some(envelope_rx),
            cancel: CancellationToken::new(),
            transport_cancel: CancellationToken::new(),
            tasks: Vec::new(),
            transport_task: None,
        };

        Ok((pipeline, envelope_tx))
    }
}

impl Default for ForwarderPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use firehose_core::event::{EventType, LogMessage, Payload};
    use tokio::net::UdpSocket;

    use crate::config::ForwarderConfigBuilder;

    async fn udp_receiver() -> (UdpSocket, String) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        (socket, addr)
    }

    fn log_envelope(text: &str) -> Envelope {
        Envelope::new(
            "rep",
            Payload::LogMessage(LogMessage {
                message: text.to_owned(),
                app_id: "app-1".to_owned(),
                ..Default::default()
            }),
        )
    }

    #[tokio::test]
    async fn builder_creates_pipeline() {
        let (pipeline, _tx) = ForwarderPipelineBuilder::new().build().await.unwrap();
        assert_eq!(pipeline.state_name(), "initialized");
        assert_eq!(pipeline.router().selected_events(), vec![EventType::LogMessage]);
    }

    #[tokio::test]
    async fn builder_rejects_unknown_event_type() {
        let config = ForwarderConfig {
            selected_events: "LogMessage,Bogus".to_owned(),
            ..Default::default()
        };
        let result = ForwarderPipelineBuilder::new().config(config).build().await;
        assert!(matches!(result, Err(ForwarderError::UnknownEventType { .. })));
    }

    #[tokio::test]
    async fn builder_rejects_bad_extra_fields() {
        let config = ForwarderConfig {
            extra_fields: "novalue".to_owned(),
            ..Default::default()
        };
        let result = ForwarderPipelineBuilder::new().config(config).build().await;
        assert!(matches!(result, Err(ForwarderError::ExtraFields { .. })));
    }

    #[tokio::test]
    async fn builder_rejects_missing_filter_file() {
        let config = ForwarderConfig {
            filter_path: "/nonexistent/firehose/rules.tsv".to_owned(),
            ..Default::default()
        };
        let result = ForwarderPipelineBuilder::new().config(config).build().await;
        assert!(matches!(result, Err(ForwarderError::FilterLoad { .. })));
    }

    #[tokio::test]
    async fn lifecycle_ships_over_udp() {
        let (receiver, addr) = udp_receiver().await;
        let config = ForwarderConfigBuilder::new()
            .server(addr, "udp")
            .stats_interval_secs(0)
            .build()
            .unwrap();
        let (mut pipeline, tx) = ForwarderPipelineBuilder::new()
            .config(config)
            .build()
            .await
            .unwrap();

        assert!(pipeline.health_check().await.is_unhealthy());
        pipeline.start().await.unwrap();
        assert!(pipeline.health_check().await.is_healthy());

        tx.send(log_envelope("hello over udp")).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(5), receiver.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let packet = String::from_utf8_lossy(&buf[..n]).into_owned();
        assert!(packet.starts_with("<14>1 "));
        assert!(packet.contains("msg=\"hello over udp\""));

        pipeline.stop().await.unwrap();
        assert_eq!(pipeline.state_name(), "stopped");
        assert!(pipeline.health_check().await.is_unhealthy());
        assert_eq!(pipeline.router().total_count(), 1);
    }

    #[tokio::test]
    async fn start_fails_when_collector_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = ForwarderConfigBuilder::new().server(addr, "tcp").build().unwrap();
        let (mut pipeline, _tx) = ForwarderPipelineBuilder::new()
            .config(config)
            .build()
            .await
            .unwrap();

        let err = pipeline.start().await.unwrap_err();
        assert!(matches!(err, FirehoseError::Transport(_)));
        assert_eq!(pipeline.state_name(), "initialized");
    }

    #[tokio::test]
    async fn stop_before_start_fails() {
        let (mut pipeline, _tx) = ForwarderPipelineBuilder::new().build().await.unwrap();
        assert!(pipeline.stop().await.is_err());
    }

    #[tokio::test]
    async fn double_start_fails() {
        let (_receiver, addr) = udp_receiver().await;
        let config = ForwarderConfigBuilder::new().server(addr, "udp").build().unwrap();
        let (mut pipeline, _tx) = ForwarderPipelineBuilder::new()
            .config(config)
            .build()
            .await
            .unwrap();

        pipeline.start().await.unwrap();
        assert!(pipeline.start().await.is_err());
        pipeline.stop().await.unwrap();
        assert!(pipeline.start().await.is_err());
    }
}
