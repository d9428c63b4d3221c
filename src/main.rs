use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tcp_churn::{Config, Counters, Orchestrator, Reporter, SessionStats};

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    // Print banner
    info!("════════════════════════════════════════════════════════════");
    info!("                 TCP CONNECTION CHURN");
    info!("════════════════════════════════════════════════════════════");
    info!("Target: {}", config.target());
    info!("Workers: {}", config.workers);
    info!("Sessions per worker: {}", config.iterations);
    info!(
        "Burst: p={} sends={} payload={:?}x{}",
        config.burst_probability,
        config.burst_sends,
        config.payload_token,
        config.payload_repeats
    );
    info!(
        "Drain: chunk={}B idle={}ms early-exit p={}",
        config.read_chunk, config.read_idle_ms, config.early_exit_probability
    );
    info!("Close: p={}", config.close_probability);
    info!("Pacing: {:?}", config.pacing);
    info!("Cooldown: {}ms", config.cooldown_ms);
    if let Some(seed) = config.seed {
        info!("Seed: {}", seed);
    }
    info!("════════════════════════════════════════════════════════════");

    let counters = Counters::new();
    let stats = SessionStats::new().context("Failed to create latency histogram")?;

    // Never joined; the runtime drops it on exit.
    Reporter::new(
        Arc::clone(&counters),
        config.report_interval(),
        config.report_format,
    )?
    .spawn();

    let orchestrator = Orchestrator::spawn(
        Arc::clone(&config),
        Arc::clone(&counters),
        Arc::clone(&stats),
    )?;
    let reports = orchestrator
        .await_all()
        .await
        .context("Worker task failed")?;

    let failed: u32 = reports.iter().map(|r| r.failed).sum();
    let abandoned: usize = reports.iter().map(|r| r.abandoned).sum();

    info!("");
    info!("Totals: {}", counters.snapshot());
    info!("Failed sessions: {}", failed);
    info!("Abandoned connections: {}", abandoned);
    stats.print_summary().await;

    info!("════════════════════════════════════════════════════════════");
    info!("                   ALL WORKERS DONE");
    info!("════════════════════════════════════════════════════════════");

    Ok(())
}
