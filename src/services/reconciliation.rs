//! Periodic reconciliation of money movements left pending.
//!
//! Stale deposits are re-driven through the idempotent verification path.
//! Stale withdrawals are only reported: the payout may have gone through, so
//! reversing them automatically could pay the user twice.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ReconciliationConfig;
use crate::error::{AppError, AppResult};
use crate::models::TransactionType;
use crate::repositories::LedgerStore;
use crate::services::wallet_service::{DepositOutcome, WalletService};

/// What one reconciliation pass did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub deposits_checked: usize,
    pub deposits_completed: usize,
    pub deposits_failed: usize,
    pub deposits_still_pending: usize,
    pub verify_errors: usize,
    /// References of withdrawals that need a human
    pub stale_withdrawals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletAudit {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub ledger_sum: Decimal,
    pub drift: Decimal,
}

impl WalletAudit {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAudit {
    pub group_id: Uuid,
    pub current_total: Decimal,
    pub contribution_total: Decimal,
    pub drift: Decimal,
}

impl GroupAudit {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

pub struct ReconciliationWorker {
    store: Arc<dyn LedgerStore>,
    wallet_service: Arc<WalletService>,
    interval: Duration,
    stale_after: Duration,
}

impl ReconciliationWorker {
    pub fn new(store: Arc<dyn LedgerStore>, wallet_service: Arc<WalletService>, config: &ReconciliationConfig) -> Self {
        Self {
            store,
            wallet_service,
            interval: config.interval(),
            stale_after: config.stale_after(),
        }
    }

    /// Set the age after which a pending record counts as stale
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Run passes forever
    pub async fn start(self) {
        let mut interval = time::interval(self.interval);
        info!("Reconciliation worker started, running every {:?}", self.interval);

        loop {
            interval.tick().await;

            match self.run_once().await {
                Ok(report) if report.deposits_checked > 0 || !report.stale_withdrawals.is_empty() => {
                    info!(
                        "Reconciliation pass: {} deposits checked ({} completed, {} failed, {} pending, {} errors), {} stale withdrawals",
                        report.deposits_checked,
                        report.deposits_completed,
                        report.deposits_failed,
                        report.deposits_still_pending,
                        report.verify_errors,
                        report.stale_withdrawals.len()
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Error in reconciliation pass: {}", e),
            }
        }
    }

    /// One pass over everything pending longer than the stale threshold
    pub async fn run_once(&self) -> AppResult<ReconciliationReport> {
        let stale_secs = i64::try_from(self.stale_after.as_secs())
            .map_err(|_| AppError::Config("Stale threshold too large".to_string()))?;
        let cutoff = chrono::Utc::now().naive_utc() - chrono::Duration::seconds(stale_secs);
        let mut report = ReconciliationReport::default();

        let mut deposits = self
            .store
            .list_pending_transactions(TransactionType::Deposit, cutoff)
            .await?;
        deposits.extend(
            self.store
                .list_pending_transactions(TransactionType::PaymentLink, cutoff)
                .await?,
        );

        for deposit in deposits {
            report.deposits_checked += 1;
            match self.wallet_service.verify_deposit(&deposit.reference).await {
                Ok(DepositOutcome::Completed { .. }) => report.deposits_completed += 1,
                Ok(DepositOutcome::Failed { .. }) => report.deposits_failed += 1,
                Ok(DepositOutcome::Pending { .. }) => report.deposits_still_pending += 1,
                Err(e) => {
                    warn!("Reconciliation could not verify deposit {}: {}", deposit.reference, e);
                    report.verify_errors += 1;
                }
            }
        }

        let withdrawals = self
            .store
            .list_pending_transactions(TransactionType::Withdrawal, cutoff)
            .await?;
        for withdrawal in withdrawals {
            error!(
                "Withdrawal {} for user {} ({}) has been pending since {}. Manual reconciliation required",
                withdrawal.reference, withdrawal.user_id, -withdrawal.amount, withdrawal.created_at
            );
            report.stale_withdrawals.push(withdrawal.reference);
        }

        Ok(report)
    }

    /// Compare a wallet's balance with the sum of its legs
    pub async fn audit_wallet(&self, user_id: Uuid) -> AppResult<WalletAudit> {
        let wallet = self
            .store
            .find_wallet(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet {} not found", user_id)))?;
        let ledger_sum: Decimal = self
            .store
            .list_transactions(user_id, None)
            .await?
            .iter()
            .map(|tx| tx.ledger_effect())
            .sum();

        let audit = WalletAudit {
            user_id,
            balance: wallet.balance,
            ledger_sum,
            drift: wallet.balance - ledger_sum,
        };
        if !audit.is_consistent() {
            error!(
                "Wallet {} drift: balance {} vs ledger {}",
                user_id, audit.balance, audit.ledger_sum
            );
        }
        Ok(audit)
    }

    /// Compare a group's pool with the sum of its completed contributions
    pub async fn audit_group(&self, group_id: Uuid) -> AppResult<GroupAudit> {
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Savings group {} not found", group_id)))?;
        let contribution_total = self.store.group_contribution_total(group_id).await?;

        let audit = GroupAudit {
            group_id,
            current_total: group.current_total,
            contribution_total,
            drift: group.current_total - contribution_total,
        };
        if !audit.is_consistent() {
            error!(
                "Savings group {} drift: pool {} vs contributions {}",
                group_id, audit.current_total, audit.contribution_total
            );
        }
        Ok(audit)
    }
}
