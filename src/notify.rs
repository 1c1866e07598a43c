//! Post-commit notifications.
//!
//! Services emit a [`LedgerEvent`] after a money movement has committed.
//! Delivery is fire-and-forget: a failing notifier is logged and never
//! affects the ledger.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// A committed money movement worth telling someone about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    DepositCompleted {
        user_id: Uuid,
        reference: String,
        amount: Decimal,
    },
    WithdrawalCompleted {
        user_id: Uuid,
        reference: String,
        amount: Decimal,
    },
    WithdrawalReversed {
        user_id: Uuid,
        reference: String,
        amount: Decimal,
    },
    TransferCompleted {
        from_user_id: Uuid,
        to_user_id: Uuid,
        reference: String,
        amount: Decimal,
    },
    InvestmentMade {
        investor_id: Uuid,
        business_id: Uuid,
        reference: String,
        amount: Decimal,
    },
    RepaymentDistributed {
        owner_id: Uuid,
        business_id: Uuid,
        reference: String,
        amount: Decimal,
        investor_count: usize,
    },
    ContributionMade {
        user_id: Uuid,
        group_id: Uuid,
        reference: String,
        amount: Decimal,
    },
    VirtualAccountCredited {
        user_id: Uuid,
        reference: String,
        amount: Decimal,
    },
}

impl LedgerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::DepositCompleted { .. } => "deposit_completed",
            LedgerEvent::WithdrawalCompleted { .. } => "withdrawal_completed",
            LedgerEvent::WithdrawalReversed { .. } => "withdrawal_reversed",
            LedgerEvent::TransferCompleted { .. } => "transfer_completed",
            LedgerEvent::InvestmentMade { .. } => "investment_made",
            LedgerEvent::RepaymentDistributed { .. } => "repayment_distributed",
            LedgerEvent::ContributionMade { .. } => "contribution_made",
            LedgerEvent::VirtualAccountCredited { .. } => "virtual_account_credited",
        }
    }

    pub fn reference(&self) -> &str {
        match self {
            LedgerEvent::DepositCompleted { reference, .. }
            | LedgerEvent::WithdrawalCompleted { reference, .. }
            | LedgerEvent::WithdrawalReversed { reference, .. }
            | LedgerEvent::TransferCompleted { reference, .. }
            | LedgerEvent::InvestmentMade { reference, .. }
            | LedgerEvent::RepaymentDistributed { reference, .. }
            | LedgerEvent::ContributionMade { reference, .. }
            | LedgerEvent::VirtualAccountCredited { reference, .. } => reference,
        }
    }
}

/// Receiver of post-commit ledger events (email, push, audit trail...)
#[async_trait]
pub trait LedgerNotifier: Send + Sync {
    async fn notify(&self, event: &LedgerEvent) -> AppResult<()>;
}

/// Deliver `event`, logging instead of propagating failures
pub async fn dispatch(notifier: &dyn LedgerNotifier, event: LedgerEvent) {
    if let Err(e) = notifier.notify(&event).await {
        warn!(
            "Notification {} for {} failed: {}",
            event.name(),
            event.reference(),
            e
        );
    }
}

/// Writes events to the tracing log
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl LedgerNotifier for TracingNotifier {
    async fn notify(&self, event: &LedgerEvent) -> AppResult<()> {
        info!(event = event.name(), reference = event.reference(), "ledger event");
        Ok(())
    }
}

/// Audit log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Appends every event as a JSON line to a dated audit file
pub struct AuditTrailNotifier {
    log_file: PathBuf,
    file_handle: Arc<Mutex<std::fs::File>>,
}

impl AuditTrailNotifier {
    /// Create a new audit trail under `log_directory`
    pub fn new(log_directory: PathBuf) -> AppResult<Self> {
        // Ensure directory exists
        std::fs::create_dir_all(&log_directory)
            .map_err(|e| AppError::Config(format!("Failed to create audit log directory: {}", e)))?;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let log_file = log_directory.join(format!("ledger_audit_{}.log", date));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .map_err(|e| AppError::Config(format!("Failed to open audit log file: {}", e)))?;

        info!("Audit trail initialized: {:?}", log_file);

        Ok(Self {
            log_file,
            file_handle: Arc::new(Mutex::new(file)),
        })
    }

    pub fn log_file(&self) -> &PathBuf {
        &self.log_file
    }
}

#[async_trait]
impl LedgerNotifier for AuditTrailNotifier {
    async fn notify(&self, event: &LedgerEvent) -> AppResult<()> {
        let entry = AuditLogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            event: event.clone(),
        };
        let json = serde_json::to_string(&entry)?;

        let mut file = self.file_handle.lock().await;
        writeln!(file, "{}", json)
            .and_then(|_| file.flush())
            .map_err(|e| AppError::Config(format!("Failed to write audit log: {}", e)))?;

        Ok(())
    }
}

/// Fans an event out to several notifiers; each failure is logged separately
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn LedgerNotifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn LedgerNotifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl LedgerNotifier for FanoutNotifier {
    async fn notify(&self, event: &LedgerEvent) -> AppResult<()> {
        for notifier in &self.notifiers {
            dispatch(notifier.as_ref(), event.clone()).await;
        }
        Ok(())
    }
}
