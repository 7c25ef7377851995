//! Orchestrator assembly and lifecycle tests.

use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use firehose_core::config::FirehoseConfig;
use firehose_core::pipeline::HealthStatus;
use firehose_daemon::orchestrator::Orchestrator;
use firehose_daemon::source::SourceInput;

const ENVELOPES: &str = r#"{"origin":"rep","payload":{"event_type":"LogMessage","message":"hello from file","app_id":"app-1"}}
{"origin":"rep","payload":{"event_type":"ValueMetric","name":"cpu","value":1.5,"unit":"percent"}}
garbage
"#;

fn udp_config(server: String) -> FirehoseConfig {
    let mut config = FirehoseConfig::default();
    config.syslog.server = server;
    config.syslog.protocol = "udp".to_owned();
    config.syslog.hostname = "test-host".to_owned();
    config.routing.stats_interval_secs = 0;
    config
}

#[tokio::test]
async fn test_build_from_default_config() {
    // Given: Default configuration (nothing connects during build)
    let config = FirehoseConfig::default();

    // When: Building the orchestrator
    let orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("default config should build");

    // Then: The pipeline exists but has not started
    let health = orchestrator.health().await;
    assert_eq!(
        health.status,
        HealthStatus::Unhealthy("not started".to_owned())
    );
    assert_eq!(health.total_shipped, 0);
    assert_eq!(orchestrator.pipeline().state_name(), "initialized");
}

#[tokio::test]
async fn test_build_rejects_unknown_event_type() {
    // Given: A selection naming a type that does not exist
    let mut config = FirehoseConfig::default();
    config.routing.selected_events = "LogMessage,Bogus".to_owned();

    // When: Building
    let result = Orchestrator::build_from_config(config).await;

    // Then: Build fails and the message lists valid types
    let err = result.err().expect("unknown event type should fail");
    let message = format!("{err:#}");
    assert!(message.contains("Bogus"), "got: {message}");
    assert!(message.contains("LogMessage"), "got: {message}");
}

#[tokio::test]
async fn test_build_rejects_bad_extra_fields() {
    let mut config = FirehoseConfig::default();
    config.routing.extra_fields = "env:prod,broken".to_owned();

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err(), "malformed extra fields should fail the build");
}

#[tokio::test]
async fn test_build_rejects_missing_app_cache_file() {
    let mut config = FirehoseConfig::default();
    config.routing.app_cache_path = "/nonexistent/apps.json".to_owned();

    let result = Orchestrator::build_from_config(config).await;
    assert!(result.is_err(), "missing app cache should fail the build");
}

#[tokio::test]
async fn test_build_from_missing_config_file_fails() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = Orchestrator::build(&dir.path().join("firehose.toml")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_take_envelope_sender_only_once() {
    let mut orchestrator = Orchestrator::build_from_config(FirehoseConfig::default())
        .await
        .expect("should build");

    assert!(orchestrator.take_envelope_sender().is_some());
    assert!(orchestrator.take_envelope_sender().is_none());
}

#[tokio::test]
async fn test_run_forwards_file_until_eof() {
    // Given: A UDP collector, an app cache and an envelope file
    let receiver = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
    let dir = tempfile::tempdir().expect("temp dir");

    let apps = dir.path().join("apps.json");
    std::fs::write(
        &apps,
        r#"{"app-1":{"name":"web","space_id":"s-1","space_name":"prod","org_id":"o-1","org_name":"acme"}}"#,
    )
    .expect("write app cache");
    let envelopes = dir.path().join("envelopes.jsonl");
    std::fs::write(&envelopes, ENVELOPES).expect("write envelopes");

    let mut config = udp_config(receiver.local_addr().expect("addr").to_string());
    config.routing.app_cache_path = apps.display().to_string();

    let mut orchestrator = Orchestrator::build_from_config(config)
        .await
        .expect("should build");

    // When: Running with exit-on-eof
    timeout(
        Duration::from_secs(10),
        orchestrator.run(Some(SourceInput::File(envelopes)), true),
    )
    .await
    .expect("run should finish at end of input")
    .expect("run should succeed");

    // Then: Only the selected LogMessage reached the collector
    let mut buf = vec![0u8; 65_536];
    let n = timeout(Duration::from_secs(5), receiver.recv(&mut buf))
        .await
        .expect("packet should arrive")
        .expect("recv");
    let packet = String::from_utf8_lossy(&buf[..n]);
    assert!(packet.starts_with("<14>1 "), "got: {packet}");
    assert!(packet.contains(" test-host doppler "), "got: {packet}");
    assert!(packet.contains("cf_app_name=web"), "got: {packet}");
    assert!(packet.contains("hello from file"), "got: {packet}");

    assert_eq!(orchestrator.pipeline().state_name(), "stopped");
    let health = orchestrator.health().await;
    assert_eq!(health.total_shipped, 1);
    assert_eq!(health.status, HealthStatus::Unhealthy("stopped".to_owned()));
}
