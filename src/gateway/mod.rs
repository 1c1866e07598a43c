//! Payment gateway port.
//!
//! The ledger talks to the payment processor only through [`PaymentGateway`].
//! Two adapters exist: [`HttpPaymentGateway`] for the live API and
//! [`SimulatedGateway`] for development and tests. Which one runs is decided
//! once at startup from [`crate::config::GatewayConfig`].

pub mod http;
pub mod simulated;
pub mod webhook;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{GatewayConfig, GatewayMode};

pub use http::HttpPaymentGateway;
pub use simulated::{GatewayCall, SimulatedGateway, TransferOutcome};

/// Errors returned by a gateway adapter
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Gateway request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway answered and said no
    #[error("Gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Invalid response from gateway: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// True when the gateway never gave a definitive answer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout | GatewayError::Http(_) | GatewayError::Unavailable(_)
        )
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Checkout request for a card/bank deposit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub amount: Decimal,
    pub email: String,
    pub reference: String,
    pub customer_name: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub checkout_url: String,
    pub reference: String,
}

/// Authoritative status reported by the gateway for a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayTransactionStatus {
    Success,
    Pending,
    Failed,
    Abandoned,
    Other(String),
}

impl GatewayTransactionStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "success" | "successful" | "completed" => GatewayTransactionStatus::Success,
            "pending" | "processing" => GatewayTransactionStatus::Pending,
            "failed" | "failure" => GatewayTransactionStatus::Failed,
            "abandoned" => GatewayTransactionStatus::Abandoned,
            other => GatewayTransactionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GatewayTransactionStatus::Success => "success",
            GatewayTransactionStatus::Pending => "pending",
            GatewayTransactionStatus::Failed => "failed",
            GatewayTransactionStatus::Abandoned => "abandoned",
            GatewayTransactionStatus::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub reference: String,
    pub status: GatewayTransactionStatus,
    /// Amount in major units
    pub amount: Decimal,
    pub gateway_reference: Option<String>,
}

/// Payout to a bank account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Wire reference, `<merchantId>_<reference>`
    pub reference: String,
    pub amount: Decimal,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub remark: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResponse {
    pub reference: String,
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    pub name: String,
    pub hash: String,
    pub amount: Decimal,
    pub description: String,
    pub redirect_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLinkResponse {
    pub hash: String,
    pub payment_url: String,
}

/// Capability interface over the payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a checkout; no money moves until verified
    async fn initialize_transaction(&self, request: InitializeRequest) -> GatewayResult<InitializeResponse>;

    /// Ask for the authoritative status of a collection
    async fn verify_transaction(&self, reference: &str) -> GatewayResult<VerifyResponse>;

    /// Pay out to a bank account
    async fn transfer_funds(&self, request: TransferRequest) -> GatewayResult<TransferResponse>;

    /// Resolve the holder name of a bank account
    async fn lookup_bank_account(&self, bank_code: &str, account_number: &str) -> GatewayResult<BankAccount>;

    /// Mint a shareable payment link
    async fn create_payment_link(&self, request: PaymentLinkRequest) -> GatewayResult<PaymentLinkResponse>;
}

/// Build the adapter selected by `config.mode`
pub fn from_config(config: &GatewayConfig) -> GatewayResult<Arc<dyn PaymentGateway>> {
    match config.mode {
        GatewayMode::Live => Ok(Arc::new(HttpPaymentGateway::new(config)?)),
        GatewayMode::Simulated => Ok(Arc::new(SimulatedGateway::new(config.merchant_id.clone()))),
    }
}
