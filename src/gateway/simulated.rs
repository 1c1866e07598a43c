use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

use super::{
    BankAccount, GatewayError, GatewayResult, GatewayTransactionStatus, InitializeRequest,
    InitializeResponse, PaymentGateway, PaymentLinkRequest, PaymentLinkResponse, TransferRequest,
    TransferResponse, VerifyResponse,
};
use crate::reference;

const CHECKOUT_BASE: &str = "https://sandbox-checkout.moneyflow.test";
const PAYMENT_LINK_BASE: &str = "https://sandbox-pay.moneyflow.test";

/// How the next payouts should behave
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeed,
    /// Gateway answers with a rejection
    Reject(String),
    /// Gateway cannot be reached
    Unavailable,
    /// Answer successfully after sleeping
    Delay(Duration),
}

/// Scripted answer for `verify_transaction`
#[derive(Debug, Clone)]
enum VerifyScript {
    Status(GatewayTransactionStatus),
    Amount(Decimal),
    Unavailable,
}

/// Record of a call made against the simulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Initialize(String),
    Verify(String),
    Transfer(String),
    Lookup(String),
    PaymentLink(String),
}

#[derive(Debug, Default)]
struct SimState {
    collections: HashMap<String, Decimal>,
    verify_scripts: HashMap<String, VerifyScript>,
    accounts: HashMap<(String, String), String>,
    reject_unknown_accounts: bool,
    transfer_outcome: Option<TransferOutcome>,
    calls: Vec<GatewayCall>,
}

/// Deterministic in-process gateway.
///
/// Collections verify as successful for the amount they were initialized
/// with unless scripted otherwise; payouts follow the configured
/// [`TransferOutcome`]; unknown bank accounts resolve to a fixed name.
#[derive(Debug)]
pub struct SimulatedGateway {
    merchant_id: String,
    state: Mutex<SimState>,
}

impl SimulatedGateway {
    pub fn new(merchant_id: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn set_transfer_outcome(&self, outcome: TransferOutcome) {
        self.state().transfer_outcome = Some(outcome);
    }

    /// Report `status` for `reference` on verification
    pub fn set_verify_status(&self, reference: &str, status: GatewayTransactionStatus) {
        self.state()
            .verify_scripts
            .insert(reference.to_string(), VerifyScript::Status(status));
    }

    /// Report a successful collection of `amount` for `reference`
    pub fn set_verify_amount(&self, reference: &str, amount: Decimal) {
        self.state()
            .verify_scripts
            .insert(reference.to_string(), VerifyScript::Amount(amount));
    }

    /// Make verification of `reference` fail at the transport level
    pub fn set_verify_unavailable(&self, reference: &str) {
        self.state()
            .verify_scripts
            .insert(reference.to_string(), VerifyScript::Unavailable);
    }

    pub fn register_account(&self, bank_code: &str, account_number: &str, account_name: &str) {
        self.state().accounts.insert(
            (bank_code.to_string(), account_number.to_string()),
            account_name.to_string(),
        );
    }

    /// Only registered accounts resolve once enabled
    pub fn reject_unknown_accounts(&self, reject: bool) {
        self.state().reject_unknown_accounts = reject;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.state().calls.clone()
    }

    pub fn transfer_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, GatewayCall::Transfer(_)))
            .count()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn initialize_transaction(&self, request: InitializeRequest) -> GatewayResult<InitializeResponse> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Initialize(request.reference.clone()));
        state
            .collections
            .insert(request.reference.clone(), request.amount);

        Ok(InitializeResponse {
            checkout_url: format!("{}/{}", CHECKOUT_BASE, request.reference),
            reference: request.reference,
        })
    }

    async fn verify_transaction(&self, reference: &str) -> GatewayResult<VerifyResponse> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Verify(reference.to_string()));
        let initialized = state.collections.get(reference).copied();

        let (status, amount) = match state.verify_scripts.get(reference).cloned() {
            Some(VerifyScript::Unavailable) => {
                return Err(GatewayError::Unavailable("simulated outage".to_string()))
            }
            Some(VerifyScript::Status(status)) => (status, initialized.unwrap_or(Decimal::ZERO)),
            Some(VerifyScript::Amount(amount)) => (GatewayTransactionStatus::Success, amount),
            None => match initialized {
                Some(amount) => (GatewayTransactionStatus::Success, amount),
                None => return Err(GatewayError::Rejected("Transaction not found".to_string())),
            },
        };

        Ok(VerifyResponse {
            reference: reference.to_string(),
            status,
            amount,
            gateway_reference: Some(format!("SIM-{}", reference)),
        })
    }

    async fn transfer_funds(&self, request: TransferRequest) -> GatewayResult<TransferResponse> {
        let outcome = {
            let mut state = self.state();
            state.calls.push(GatewayCall::Transfer(request.reference.clone()));
            state.transfer_outcome.clone().unwrap_or(TransferOutcome::Succeed)
        };

        match outcome {
            TransferOutcome::Succeed => {}
            TransferOutcome::Reject(message) => return Err(GatewayError::Rejected(message)),
            TransferOutcome::Unavailable => {
                return Err(GatewayError::Unavailable("simulated outage".to_string()))
            }
            TransferOutcome::Delay(delay) => tokio::time::sleep(delay).await,
        }

        let internal = reference::strip_merchant_prefix(&self.merchant_id, &request.reference);
        info!("Simulated payout of {} for {}", request.amount, internal);

        Ok(TransferResponse {
            gateway_reference: Some(format!("SIM-NIP-{}", internal)),
            reference: request.reference,
        })
    }

    async fn lookup_bank_account(&self, bank_code: &str, account_number: &str) -> GatewayResult<BankAccount> {
        let mut state = self.state();
        state.calls.push(GatewayCall::Lookup(account_number.to_string()));

        let key = (bank_code.to_string(), account_number.to_string());
        let account_name = match state.accounts.get(&key) {
            Some(name) => name.clone(),
            None if state.reject_unknown_accounts => {
                return Err(GatewayError::Rejected("Account not found".to_string()))
            }
            None => "MONEYFLOW TEST ACCOUNT".to_string(),
        };

        Ok(BankAccount {
            bank_code: bank_code.to_string(),
            account_number: account_number.to_string(),
            account_name,
        })
    }

    async fn create_payment_link(&self, request: PaymentLinkRequest) -> GatewayResult<PaymentLinkResponse> {
        let mut state = self.state();
        state.calls.push(GatewayCall::PaymentLink(request.hash.clone()));
        state.collections.insert(request.hash.clone(), request.amount);

        Ok(PaymentLinkResponse {
            payment_url: format!("{}/{}", PAYMENT_LINK_BASE, request.hash),
            hash: request.hash,
        })
    }
}
