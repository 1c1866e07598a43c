use chrono::{Months, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Business;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentStatus {
    Active,
    Completed,
}

impl InvestmentStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "active" => Ok(InvestmentStatus::Active),
            "completed" => Ok(InvestmentStatus::Completed),
            _ => Err(format!("Invalid investment status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestmentStatus::Active => "active",
            InvestmentStatus::Completed => "completed",
        }
    }
}

/// An investor's stake in a business
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Investment {
    pub id: Uuid,
    pub investor_id: Uuid,
    pub business_id: Uuid,
    pub amount: Decimal,
    pub expected_return: Decimal,
    pub returns_received: Decimal, // only ever grows
    pub status: String,            // Stored as TEXT, use InvestmentStatus enum for type safety
    pub investment_date: NaiveDateTime,
    pub maturity_date: NaiveDateTime,
}

/// `amount + amount * rate / 100`, rounded to cents
pub fn expected_return(amount: Decimal, return_rate: Decimal) -> Decimal {
    (amount + amount * return_rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

impl Investment {
    /// Create an active investment against `business`, dated now
    pub fn new(investor_id: Uuid, business: &Business, amount: Decimal) -> Result<Self, String> {
        let investment_date = chrono::Utc::now().naive_utc();
        let months = u32::try_from(business.duration_months)
            .map_err(|_| format!("Invalid duration: {}", business.duration_months))?;
        let maturity_date = investment_date
            .checked_add_months(Months::new(months))
            .ok_or_else(|| "Maturity date out of range".to_string())?;

        Ok(Self {
            id: Uuid::new_v4(),
            investor_id,
            business_id: business.id,
            amount,
            expected_return: expected_return(amount, business.return_rate),
            returns_received: Decimal::ZERO,
            status: InvestmentStatus::Active.as_str().to_string(),
            investment_date,
            maturity_date,
        })
    }

    /// Get status as an enum
    pub fn status_enum(&self) -> InvestmentStatus {
        InvestmentStatus::from_str(&self.status).unwrap_or(InvestmentStatus::Active)
    }

    pub fn is_active(&self) -> bool {
        self.status_enum() == InvestmentStatus::Active
    }

    /// Return still owed to the investor
    pub fn outstanding(&self) -> Decimal {
        (self.expected_return - self.returns_received).max(Decimal::ZERO)
    }

    /// Credit a repayment share; completes the investment once fully repaid
    pub fn apply_return(&mut self, share: Decimal) {
        self.returns_received += share;
        if self.returns_received >= self.expected_return {
            self.status = InvestmentStatus::Completed.as_str().to_string();
        }
    }
}
