use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::distribution::is_whole_cents;

/// Rotating savings group pooling member contributions
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SavingsGroup {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub contribution_amount: Decimal, // default per-contribution amount
    pub current_total: Decimal,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl SavingsGroup {
    /// Create a new SavingsGroup
    pub fn new(creator_id: Uuid, name: String, contribution_amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            creator_id,
            contribution_amount,
            current_total: Decimal::ZERO,
            is_active: true,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Group name is required".to_string());
        }
        if self.contribution_amount <= Decimal::ZERO {
            return Err("Contribution amount must be greater than zero".to_string());
        }
        if !is_whole_cents(self.contribution_amount) {
            return Err("Contribution amount cannot have more than two decimal places".to_string());
        }
        Ok(())
    }

    pub fn is_creator(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id
    }
}
