//! Ledger server binary
//!
//! Owns the process lifecycle around a [`LedgerManager`]: configuration,
//! logging, periodic compaction and shutdown on ctrl-c. Request handling is
//! left to the transport layer embedding the manager.

use std::sync::Arc;
use std::time::Duration;
use wallet_ledger::{Config, LedgerManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting wallet ledger server");

    // Load configuration: optional file, then LEDGER_* overrides
    let config = match std::env::var("LEDGER_CONFIG") {
        Ok(path) => Config::from_file(&path)?.with_env_overrides()?,
        Err(_) => Config::from_env()?,
    };
    tracing::info!(
        data_dir = %config.data_dir.display(),
        default_environment = %config.default_environment,
        "Configuration loaded"
    );

    let manager = Arc::new(LedgerManager::from_config(&config)?);

    // Fail fast if the default environment cannot be opened
    manager.resolve(None)?;

    if let Some(secs) = config.gc_interval_secs {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let manager = Arc::clone(&manager);
                match tokio::task::spawn_blocking(move || manager.collect_garbage_all()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::warn!(error = %err, "Periodic compaction failed"),
                    Err(err) => tracing::warn!(error = %err, "Periodic compaction task panicked"),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down wallet ledger server");
    manager.close_all()?;
    Ok(())
}
