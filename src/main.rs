//! MoneyFlow Ledger Service
//!
//! Boots the ledger core: configuration, logging, the ledger store, the
//! payment gateway adapter and the background reconciliation worker.

use anyhow::Context;
use moneyflow_ledger::config::{GatewayMode, StoreMode};
use moneyflow_ledger::{AppConfig, AppState};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("moneyflow_ledger={},sqlx=warn", config.log_level).into()
    });

    if config.json_logs() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("Configuration error")?;

    init_tracing(&config);

    info!("MoneyFlow ledger starting");
    info!("Environment: {}", config.environment);
    info!(
        "Store: {}",
        match config.store_mode {
            StoreMode::Postgres => "postgres",
            StoreMode::Memory => "memory",
        }
    );
    match config.gateway.mode {
        GatewayMode::Live => info!("Payment gateway: live ({})", config.gateway.base_url),
        GatewayMode::Simulated => warn!("Payment gateway: simulated - no real money moves"),
    }

    let state = AppState::from_config(&config)
        .await
        .context("Failed to initialize ledger")?;
    info!("✓ Ledger services initialized");

    let reconciliation_handle = if config.reconciliation.enabled {
        let worker = state.reconciliation_worker(&config);
        let handle = tokio::spawn(async move {
            worker.start().await;
        });
        info!(
            "✓ Reconciliation worker started ({}s interval)",
            config.reconciliation.interval_secs
        );
        Some(handle)
    } else {
        warn!("Reconciliation worker disabled");
        None
    };

    info!("Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = async {
            if let Some(handle) = reconciliation_handle {
                handle.await.ok();
            } else {
                // Never completes if the worker is not running
                futures::future::pending::<()>().await;
            }
        } => {
            error!("Reconciliation worker exited unexpectedly");
        }
    }

    info!("MoneyFlow ledger shutdown complete");
    Ok(())
}
