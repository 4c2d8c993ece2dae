use anyhow::Result;
use clap::Parser;

use auditpost_core::config::AuditpostConfig;
use auditpost_daemon::cli::DaemonCli;
use auditpost_daemon::orchestrator::Orchestrator;
use auditpost_daemon::{logging, metrics_server};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = AuditpostConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "auditpost-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let outcome = Orchestrator::build(config)?.run().await?;
    let code = outcome.exit_code();
    tracing::info!(?outcome, code, "auditpost-daemon shut down");

    // stdin 읽기 스레드가 런타임 종료를 막지 않도록 바로 종료
    std::process::exit(code);
}
