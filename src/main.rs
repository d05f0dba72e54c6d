mod autobid;
mod batch_log;
mod deal_config;
mod deal_sender;
mod piece_math;
mod poll_loop;
mod settings;
mod talk_to_lotus;
mod talk_to_swan;
mod types;

#[cfg(test)]
mod test_fakes;

use crate::autobid::BatchReport;
use crate::deal_sender::DealSender;
use crate::poll_loop::POLL_INTERVAL;
use crate::settings::Settings;
use crate::talk_to_lotus::LotusConnector;
use crate::talk_to_swan::SwanClient;
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use tokio::sync::broadcast;
use tokio::time::Duration;

#[derive(Parser)]
#[command(name = "autobid_buddy")]
#[command(about = "sends the offline deals swan assigns to our miner out to lotus")]
struct Cli {
    /// toml config, AUTOBID_* env vars override it
    #[arg(long, default_value = "config/autobid.toml")]
    config: PathBuf,

    /// where per-cycle deal records go, overrides sender.output_dir
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// run a single cycle and exit
    #[arg(long)]
    once: bool,
}

/// log in to swan, send whatever it has assigned, and note what went on chain
async fn run_cycle(settings: &Settings, sender: &DealSender<'_>) -> Result<BatchReport> {
    let swan = SwanClient::login(&settings.swan)
        .await
        .context("swan is unavailable")?;
    let report = autobid::process_batch(&swan, sender).await?;
    if let Err(e) = batch_log::record(&settings.sender.output_dir, &report).await {
        warn!("{:#}", e);
    }
    Ok(report)
}

/// ctrl-c or sigterm both mean stop after the current cycle
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term_signal.recv() => {}
                }
            }
            Err(e) => {
                warn!("can't listen for sigterm: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested, finishing the current cycle");
    let _ = shutdown_tx.send(());
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("autobid_buddy=info"),
    )
    .init();

    let cli = Cli::parse();
    let mut settings = Settings::load(&cli.config)?;
    if let Some(output_dir) = cli.output_dir {
        settings.sender.output_dir = output_dir;
    }

    tokio::fs::create_dir_all(&settings.sender.output_dir)
        .await
        .with_context(|| {
            format!(
                "couldn't create output dir {}",
                settings.sender.output_dir.display()
            )
        })?;
    info!("output dir is: {}", settings.sender.output_dir.display());

    let timeout = Duration::from_secs(settings.lotus.request_timeout_secs);
    let connector = LotusConnector::new(timeout);
    let sender = DealSender::new(&settings.lotus, &settings.sender, &connector);

    if cli.once {
        let report = run_cycle(&settings, &sender).await?;
        info!("{}", report.summary());
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(wait_for_shutdown(shutdown_tx));

    let settings = &settings;
    let sender = &sender;
    poll_loop::run(POLL_INTERVAL, shutdown_rx, move || {
        run_cycle(settings, sender)
    })
    .await;
    Ok(())
}
