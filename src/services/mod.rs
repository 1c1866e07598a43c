pub mod bank_verification;
pub mod investment_service;
pub mod reconciliation;
pub mod savings_service;
pub mod wallet_service;

use rust_decimal::Decimal;

use crate::distribution::is_whole_cents;
use crate::error::{AppError, AppResult};

pub use bank_verification::BankVerifier;
pub use investment_service::{InvestmentService, Portfolio};
pub use reconciliation::{GroupAudit, ReconciliationReport, ReconciliationWorker, WalletAudit};
pub use savings_service::SavingsService;
pub use wallet_service::{
    DepositInitiation, DepositOutcome, Payer, PaymentLink, WalletService, WithdrawalReceipt,
};

/// Reject non-positive amounts and amounts finer than a cent
pub(crate) fn check_amount(amount: Decimal, what: &str) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::Validation(format!(
            "Invalid {} amount: must be greater than zero",
            what
        )));
    }
    if !is_whole_cents(amount) {
        return Err(AppError::Validation(format!(
            "Invalid {} amount: at most two decimal places allowed",
            what
        )));
    }
    Ok(())
}
