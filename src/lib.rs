//! MoneyFlow Ledger Library
//!
//! Wallet ledger and money-movement engine: deposits and withdrawals through
//! a payment gateway, wallet-to-wallet transfers, business investment and
//! repayment, and savings-group contributions.

pub mod config;
pub mod database;
pub mod distribution;
pub mod error;
pub mod gateway;
pub mod models;
pub mod notify;
pub mod reference;
pub mod repositories;
pub mod services;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult};

use config::StoreMode;
use database::{create_pool, run_migrations};
use gateway::PaymentGateway;
use notify::{AuditTrailNotifier, FanoutNotifier, LedgerNotifier, TracingNotifier};
use repositories::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
use services::{InvestmentService, ReconciliationWorker, SavingsService, WalletService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Application state containing the store, the gateway and all services
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn LedgerNotifier>,
    pub wallet_service: Arc<WalletService>,
    pub investment_service: Arc<InvestmentService>,
    pub savings_service: Arc<SavingsService>,
}

impl AppState {
    /// Wire the services around explicitly constructed collaborators
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn LedgerNotifier>,
    ) -> Self {
        let wallet_service = Arc::new(WalletService::new(
            store.clone(),
            gateway.clone(),
            notifier.clone(),
            config.limits.clone(),
            &config.gateway,
        ));

        Self {
            investment_service: Arc::new(InvestmentService::new(store.clone(), notifier.clone())),
            savings_service: Arc::new(SavingsService::new(store.clone(), notifier.clone())),
            wallet_service,
            store,
            gateway,
            notifier,
        }
    }

    /// Build everything the configuration asks for
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let store = open_store(config).await?;
        let gateway = gateway::from_config(&config.gateway)?;
        let notifier = build_notifier(config)?;
        Ok(Self::new(config, store, gateway, notifier))
    }

    pub fn reconciliation_worker(&self, config: &AppConfig) -> ReconciliationWorker {
        ReconciliationWorker::new(
            self.store.clone(),
            self.wallet_service.clone(),
            &config.reconciliation,
        )
    }
}

/// Open the configured ledger store, running migrations for Postgres
pub async fn open_store(config: &AppConfig) -> AppResult<Arc<dyn LedgerStore>> {
    match config.store_mode {
        StoreMode::Memory => {
            info!("Using in-memory ledger store");
            Ok(Arc::new(InMemoryLedgerStore::new()))
        }
        StoreMode::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .ok_or_else(|| AppError::Config("DATABASE_URL is required for the postgres store".to_string()))?;

            let pool = create_pool(db_config).await?;
            info!("Database connection pool created (max {} connections)", db_config.max_connections);

            run_migrations(&pool).await?;
            info!("Database migrations completed successfully");

            Ok(Arc::new(PgLedgerStore::new(pool)))
        }
    }
}

/// Tracing notifier, plus the audit trail when a directory is configured
pub fn build_notifier(config: &AppConfig) -> AppResult<Arc<dyn LedgerNotifier>> {
    let mut notifiers: Vec<Arc<dyn LedgerNotifier>> = vec![Arc::new(TracingNotifier)];
    if let Some(dir) = &config.audit_log_dir {
        notifiers.push(Arc::new(AuditTrailNotifier::new(PathBuf::from(dir))?));
    }
    Ok(Arc::new(FanoutNotifier::new(notifiers)))
}
