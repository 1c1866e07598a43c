use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::distribution::is_whole_cents;

/// Business funding status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusinessStatus {
    Draft,
    Active,
    Funded,
    Completed,
}

impl BusinessStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(BusinessStatus::Draft),
            "active" => Ok(BusinessStatus::Active),
            "funded" => Ok(BusinessStatus::Funded),
            "completed" => Ok(BusinessStatus::Completed),
            _ => Err(format!("Invalid business status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessStatus::Draft => "draft",
            BusinessStatus::Active => "active",
            BusinessStatus::Funded => "funded",
            BusinessStatus::Completed => "completed",
        }
    }
}

impl From<String> for BusinessStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(BusinessStatus::Draft)
    }
}

impl From<BusinessStatus> for String {
    fn from(status: BusinessStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Business raising money from investors (ledger-relevant subset)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Business {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub funding_goal: Decimal,
    pub raised_amount: Decimal,
    pub return_rate: Decimal, // percent, e.g. 12.5
    pub duration_months: i32,
    pub status: String, // Stored as TEXT, use BusinessStatus enum for type safety
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Business {
    /// Create a new Business in draft
    pub fn new(
        owner_id: Uuid,
        name: String,
        funding_goal: Decimal,
        return_rate: Decimal,
        duration_months: i32,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            funding_goal,
            raised_amount: Decimal::ZERO,
            return_rate,
            duration_months,
            status: BusinessStatus::Draft.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate the funding terms
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Business name is required".to_string());
        }
        if self.funding_goal <= Decimal::ZERO {
            return Err("Funding goal must be greater than zero".to_string());
        }
        if !is_whole_cents(self.funding_goal) {
            return Err("Funding goal cannot have more than two decimal places".to_string());
        }
        if self.return_rate < Decimal::ZERO {
            return Err("Return rate cannot be negative".to_string());
        }
        if self.duration_months <= 0 {
            return Err("Duration must be at least one month".to_string());
        }
        Ok(())
    }

    /// Get status as an enum
    pub fn status_enum(&self) -> BusinessStatus {
        BusinessStatus::from_str(&self.status).unwrap_or(BusinessStatus::Draft)
    }

    /// Only active businesses accept new investments
    pub fn is_open_for_investment(&self) -> bool {
        self.status_enum() == BusinessStatus::Active
    }

    /// Record an investment; crossing the goal flips the business to funded
    pub fn record_investment(&mut self, amount: Decimal) {
        self.raised_amount += amount;
        if self.raised_amount >= self.funding_goal
            && self.status_enum() == BusinessStatus::Active
        {
            self.status = BusinessStatus::Funded.as_str().to_string();
        }
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}
