use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of money movement a transaction leg belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Investment,
    Return,
    GroupContribution,
    GroupDistribution,
    Transfer,
    Refund,
    VirtualAccountDeposit,
    Airtime,
    Data,
    UssdDeposit,
    PaymentLink,
}

impl TransactionType {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "deposit" => Ok(TransactionType::Deposit),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "investment" => Ok(TransactionType::Investment),
            "return" => Ok(TransactionType::Return),
            "group_contribution" => Ok(TransactionType::GroupContribution),
            "group_distribution" => Ok(TransactionType::GroupDistribution),
            "transfer" => Ok(TransactionType::Transfer),
            "refund" => Ok(TransactionType::Refund),
            "virtual_account_deposit" => Ok(TransactionType::VirtualAccountDeposit),
            "airtime" => Ok(TransactionType::Airtime),
            "data" => Ok(TransactionType::Data),
            "ussd_deposit" => Ok(TransactionType::UssdDeposit),
            "payment_link" => Ok(TransactionType::PaymentLink),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Investment => "investment",
            TransactionType::Return => "return",
            TransactionType::GroupContribution => "group_contribution",
            TransactionType::GroupDistribution => "group_distribution",
            TransactionType::Transfer => "transfer",
            TransactionType::Refund => "refund",
            TransactionType::VirtualAccountDeposit => "virtual_account_deposit",
            TransactionType::Airtime => "airtime",
            TransactionType::Data => "data",
            TransactionType::UssdDeposit => "ussd_deposit",
            TransactionType::PaymentLink => "payment_link",
        }
    }
}

/// Transaction lifecycle: pending -> completed | failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    /// Convert from database string
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            _ => Err(format!("Invalid status: {}", s)),
        }
    }

    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Completed and failed records are frozen
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Completed)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

impl From<String> for TransactionStatus {
    fn from(s: String) -> Self {
        Self::from_str(&s).unwrap_or(TransactionStatus::Pending)
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        status.as_str().to_string()
    }
}

/// One leg of a money movement, keyed by its unique reference
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub transaction_type: String, // Stored as TEXT, use TransactionType enum for type safety
    pub amount: Decimal,           // signed; outgoing legs are negative
    pub status: String,            // Stored as TEXT, use TransactionStatus enum for type safety
    pub description: Option<String>,
    pub metadata: Value, // JSONB
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Transaction {
    /// Materialize a new leg from its insert description
    pub fn from_new(new: NewTransaction) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            reference: new.reference,
            user_id: new.user_id,
            transaction_type: new.transaction_type.as_str().to_string(),
            amount: new.amount,
            status: new.status.as_str().to_string(),
            description: new.description,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get status as an enum
    pub fn status_enum(&self) -> TransactionStatus {
        TransactionStatus::from_str(&self.status).unwrap_or(TransactionStatus::Pending)
    }

    /// Get type as an enum, `None` when the stored value is unknown
    pub fn type_enum(&self) -> Option<TransactionType> {
        TransactionType::from_str(&self.transaction_type).ok()
    }

    pub fn is_pending(&self) -> bool {
        self.status_enum() == TransactionStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status_enum() == TransactionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status_enum() == TransactionStatus::Failed
    }

    /// Read a string field out of the metadata object
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Shallow-merge `patch` into the metadata object
    pub fn merge_metadata(&mut self, patch: &Value) {
        merge_json(&mut self.metadata, patch);
    }

    /// Amount this leg contributes to the derivable wallet balance.
    ///
    /// Completed legs count. Withdrawals count from the moment they are
    /// reserved, so a pending or failed withdrawal is still reflected (a
    /// failed one is offset by its refund leg).
    pub fn ledger_effect(&self) -> Decimal {
        match (self.type_enum(), self.status_enum()) {
            (Some(TransactionType::Withdrawal), _) => self.amount,
            (_, TransactionStatus::Completed) => self.amount,
            _ => Decimal::ZERO,
        }
    }
}

/// Shallow-merge a JSON object patch into a target value
pub fn merge_json(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = target {
        for (k, v) in patch {
            map.insert(k.clone(), v.clone());
        }
    }
}

/// Insert description for a transaction leg
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub reference: String,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub metadata: Value,
}

impl NewTransaction {
    /// A pending leg with empty metadata
    pub fn pending(
        reference: impl Into<String>,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Self {
        Self {
            reference: reference.into(),
            user_id,
            transaction_type,
            amount,
            status: TransactionStatus::Pending,
            description: None,
            metadata: Value::Object(serde_json::Map::new()),
        }
    }

    /// A completed leg with empty metadata
    pub fn completed(
        reference: impl Into<String>,
        user_id: Uuid,
        transaction_type: TransactionType,
        amount: Decimal,
    ) -> Self {
        Self {
            status: TransactionStatus::Completed,
            ..Self::pending(reference, user_id, transaction_type, amount)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_type_string_mapping() {
        for t in [
            TransactionType::Deposit,
            TransactionType::GroupContribution,
            TransactionType::VirtualAccountDeposit,
            TransactionType::UssdDeposit,
        ] {
            assert_eq!(TransactionType::from_str(t.as_str()), Ok(t));
        }
        assert!(TransactionType::from_str("loan").is_err());
    }

    #[test]
    fn test_ledger_effect() {
        let user = Uuid::new_v4();
        let deposit = Transaction::from_new(NewTransaction::pending(
            "MF-DEP-1",
            user,
            TransactionType::Deposit,
            Decimal::new(1000, 0),
        ));
        assert_eq!(deposit.ledger_effect(), Decimal::ZERO);

        let withdrawal = Transaction::from_new(NewTransaction::pending(
            "MF-WDR-1",
            user,
            TransactionType::Withdrawal,
            Decimal::new(-500, 0),
        ));
        assert_eq!(withdrawal.ledger_effect(), Decimal::new(-500, 0));

        let refund = Transaction::from_new(NewTransaction::completed(
            "MF-WDR-1-REFUND",
            user,
            TransactionType::Refund,
            Decimal::new(500, 0),
        ));
        assert_eq!(refund.ledger_effect(), Decimal::new(500, 0));
    }

    #[test]
    fn test_merge_metadata() {
        let mut tx = Transaction::from_new(
            NewTransaction::pending("MF-DEP-2", Uuid::new_v4(), TransactionType::Deposit, Decimal::ONE)
                .with_metadata(json!({"checkout_url": "https://pay", "channel": "card"})),
        );
        tx.merge_metadata(&json!({"channel": "transfer", "gateway_reference": "G1"}));
        assert_eq!(tx.metadata_str("checkout_url"), Some("https://pay"));
        assert_eq!(tx.metadata_str("channel"), Some("transfer"));
        assert_eq!(tx.metadata_str("gateway_reference"), Some("G1"));
    }
}
