use anyhow::Result;
use clap::Parser;

use firehose_core::config::FirehoseConfig;
use firehose_daemon::cli::DaemonCli;
use firehose_daemon::logging::init_tracing;
use firehose_daemon::orchestrator::Orchestrator;
use firehose_daemon::source::SourceInput;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드 (우선순위: 파일 < 환경 변수 < 플래그)
    let mut config = FirehoseConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {e}"))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    // 로깅 초기화
    init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "firehose-daemon starting");

    // 오케스트레이터 빌드 및 실행
    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    let input = cli.envelopes.as_deref().map(SourceInput::from_arg);
    orchestrator.run(input, cli.exit_on_eof).await?;

    tracing::info!("firehose-daemon shut down");
    Ok(())
}
