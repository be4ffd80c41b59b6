//! Manual verification tick runner.
//!
//! Operational tool: runs the story verification worker for a fixed
//! number of ticks outside the server process, for backfills and
//! debugging stuck records.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use storyproof::{
    config::ConfigLoader, crypto::CryptoKey, db, instagram::InstagramClient, telemetry,
    verification::VerificationService,
};

#[derive(Debug, Parser)]
#[command(name = "verification_tick", about = "Run verification worker ticks manually")]
struct Args {
    /// Number of ticks to execute
    #[arg(long, default_value_t = 1)]
    ticks: u32,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new();
    let mut config = loader.load().context("loading configuration")?;
    telemetry::init_tracing(&config)?;

    if let Some(batch_size) = args.batch_size {
        config.verification.batch_size = batch_size;
    }

    let crypto_key = CryptoKey::new(
        config
            .crypto_key
            .clone()
            .context("crypto key not present in configuration")?,
    )?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;

    let instagram = Arc::new(InstagramClient::from_config(&config));
    let service = VerificationService::new(
        Arc::new(config),
        Arc::new(db),
        instagram,
        crypto_key,
    );

    for tick in 1..=args.ticks {
        let stats = service
            .tick()
            .await
            .map_err(|e| anyhow::anyhow!("tick {} failed: {:?}", tick, e))?;
        println!(
            "tick {}: polled={} verified={} retries={} failed={} errors={}",
            tick,
            stats.records_polled,
            stats.verified,
            stats.retries_scheduled,
            stats.failed,
            stats.errors
        );
    }

    Ok(())
}
