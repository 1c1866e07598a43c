use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Group Member model representing a user's membership in a savings group.
///
/// Leaving flips `is_active` off; re-joining flips it back on and keeps the
/// contribution history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub contributions_made: i32,
    pub total_contributed: Decimal,
    pub last_contribution_date: Option<NaiveDateTime>,
    pub is_active: bool,
    pub joined_at: NaiveDateTime,
}

impl GroupMember {
    /// Create a new active GroupMember
    pub fn new(group_id: Uuid, user_id: Uuid) -> Self {
        Self {
            group_id,
            user_id,
            contributions_made: 0,
            total_contributed: Decimal::ZERO,
            last_contribution_date: None,
            is_active: true,
            joined_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Bump the contribution counters
    pub fn record_contribution(&mut self, amount: Decimal, at: NaiveDateTime) {
        self.contributions_made += 1;
        self.total_contributed += amount;
        self.last_contribution_date = Some(at);
    }
}
