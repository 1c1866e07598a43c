use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-user ledger balance record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Wallet {
    pub user_id: Uuid,
    pub balance: Decimal, // NUMERIC(20, 2) in database
    pub virtual_account_number: Option<String>,
    pub virtual_account_name: Option<String>,
    pub virtual_bank_name: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Gateway-issued account that pays straight into a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
}

impl Wallet {
    /// Create an empty wallet
    pub fn new(user_id: Uuid) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            user_id,
            balance: Decimal::ZERO,
            virtual_account_number: None,
            virtual_account_name: None,
            virtual_bank_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the wallet can cover a debit of `amount`
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Virtual account binding, if one has been issued
    pub fn virtual_account(&self) -> Option<VirtualAccount> {
        match (
            &self.virtual_account_number,
            &self.virtual_account_name,
            &self.virtual_bank_name,
        ) {
            (Some(number), Some(name), Some(bank)) => Some(VirtualAccount {
                account_number: number.clone(),
                account_name: name.clone(),
                bank_name: bank.clone(),
            }),
            _ => None,
        }
    }

    pub fn has_virtual_account(&self) -> bool {
        self.virtual_account_number.is_some()
    }
}
