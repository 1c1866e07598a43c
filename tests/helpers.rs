#![allow(dead_code)]

use async_trait::async_trait;
use moneyflow_ledger::config::{AppConfig, ReconciliationConfig};
use moneyflow_ledger::gateway::SimulatedGateway;
use moneyflow_ledger::models::*;
use moneyflow_ledger::notify::{LedgerEvent, LedgerNotifier};
use moneyflow_ledger::repositories::*;
use moneyflow_ledger::services::*;
use moneyflow_ledger::AppResult;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const BANK_CODE: &str = "058";
pub const ACCOUNT_NUMBER: &str = "0123456789";
pub const ACCOUNT_NAME: &str = "ADA OBI";

/// Parse a decimal literal
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("valid decimal literal")
}

/// Notifier that remembers every event it was given
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LedgerEvent>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.name()).collect()
    }

    /// Record events but report every delivery as failed
    pub fn fail_deliveries(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl LedgerNotifier for RecordingNotifier {
    async fn notify(&self, event: &LedgerEvent) -> AppResult<()> {
        self.events.lock().unwrap().push(event.clone());
        if *self.fail.lock().unwrap() {
            return Err(moneyflow_ledger::AppError::Config("mail server down".to_string()));
        }
        Ok(())
    }
}

/// Services wired around the in-memory store and the simulated gateway
pub struct TestLedger {
    pub store: Arc<InMemoryLedgerStore>,
    pub gateway: Arc<SimulatedGateway>,
    pub notifier: Arc<RecordingNotifier>,
    pub wallets: Arc<WalletService>,
    pub investments: InvestmentService,
    pub savings: SavingsService,
    pub config: AppConfig,
}

impl TestLedger {
    pub fn new() -> Self {
        Self::with_gateway_timeout(Duration::from_secs(5))
    }

    pub fn with_gateway_timeout(timeout: Duration) -> Self {
        let config = AppConfig::default();
        let store = Arc::new(InMemoryLedgerStore::new());
        let gateway = Arc::new(SimulatedGateway::new(config.gateway.merchant_id.clone()));
        let notifier = Arc::new(RecordingNotifier::default());

        let wallets = Arc::new(
            WalletService::new(
                store.clone(),
                gateway.clone(),
                notifier.clone(),
                config.limits.clone(),
                &config.gateway,
            )
            .with_gateway_timeout(timeout),
        );

        Self {
            investments: InvestmentService::new(store.clone(), notifier.clone()),
            savings: SavingsService::new(store.clone(), notifier.clone()),
            wallets,
            store,
            gateway,
            notifier,
            config,
        }
    }

    pub fn payer() -> Payer {
        Payer {
            email: "ada@campus.edu".to_string(),
            name: "Ada Obi".to_string(),
        }
    }

    /// Deposit through the gateway and verify, leaving `amount` credited
    pub async fn fund(&self, user_id: Uuid, amount: Decimal) -> Transaction {
        let initiation = self
            .wallets
            .initiate_deposit(user_id, amount, &Self::payer())
            .await
            .expect("deposit initiation");
        let outcome = self
            .wallets
            .verify_deposit(&initiation.reference)
            .await
            .expect("deposit verification");
        assert!(outcome.is_completed());
        outcome.transaction().clone()
    }

    pub async fn balance(&self, user_id: Uuid) -> Decimal {
        self.wallets.wallet_balance(user_id).await.expect("balance")
    }

    pub async fn history(&self, user_id: Uuid) -> Vec<Transaction> {
        self.wallets
            .transaction_history(user_id, None)
            .await
            .expect("history")
    }

    /// Reconciliation worker that treats everything as stale
    pub fn worker(&self) -> ReconciliationWorker {
        ReconciliationWorker::new(self.store.clone(), self.wallets.clone(), &ReconciliationConfig::default())
            .with_stale_after(Duration::ZERO)
    }

    /// Active business owned by `owner_id`
    pub async fn open_business(&self, owner_id: Uuid, goal: &str, rate: &str) -> Business {
        let business = self
            .investments
            .create_business(owner_id, "Campus Print Shop".to_string(), dec(goal), dec(rate), 6)
            .await
            .expect("create business");
        self.investments
            .activate_business(business.id, owner_id)
            .await
            .expect("activate business")
    }
}
