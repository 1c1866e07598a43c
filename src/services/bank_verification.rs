//! Bank account shape checks and name lookup

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::gateway::{BankAccount, GatewayError, PaymentGateway};

/// Bank codes are 3 digits (CBN) or 6 digits (NIP institution codes)
pub fn validate_bank_code(bank_code: &str) -> AppResult<()> {
    let len = bank_code.len();
    if (len == 3 || len == 6) && bank_code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Bank code must be 3 or 6 digits".to_string(),
        ))
    }
}

/// NUBAN account numbers are exactly 10 digits
pub fn validate_account_number(account_number: &str) -> AppResult<()> {
    if account_number.len() == 10 && account_number.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Account number must be exactly 10 digits".to_string(),
        ))
    }
}

/// Validates account details locally, then resolves the holder name through the gateway
pub struct BankVerifier {
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl BankVerifier {
    pub fn new(gateway: Arc<dyn PaymentGateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    /// Verify an account and return it with the name the bank holds for it
    pub async fn verify(&self, bank_code: &str, account_number: &str) -> AppResult<BankAccount> {
        validate_bank_code(bank_code)?;
        validate_account_number(account_number)?;

        let lookup = tokio::time::timeout(
            self.timeout,
            self.gateway.lookup_bank_account(bank_code, account_number),
        )
        .await
        .unwrap_or(Err(GatewayError::Timeout));

        match lookup {
            Ok(account) => Ok(account),
            Err(GatewayError::Rejected(reason)) => {
                warn!("Bank lookup rejected for {}/{}: {}", bank_code, account_number, reason);
                Err(AppError::Validation("Could not verify bank account".to_string()))
            }
            Err(e) => {
                warn!("Bank lookup failed for {}/{}: {}", bank_code, account_number, e);
                Err(AppError::from(e))
            }
        }
    }
}
