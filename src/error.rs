use crate::database::DatabaseError;
use crate::gateway::GatewayError;
use rust_decimal::Decimal;
use sqlx::Error as SqlxError;
use thiserror::Error;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Bad amount, missing field, malformed account number
    #[error("Validation error: {0}")]
    Validation(String),

    /// Always raised before any debit is applied
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    /// Missing wallet/transaction/business/group/investment
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Gateway timeout or non-success response
    #[error("Payment gateway error: {0}")]
    ExternalGateway(String),

    /// Withdrawal could not be paid out; `reversed` tells whether the funds were returned
    #[error("Withdrawal {reference} failed (reversed: {reversed})")]
    WithdrawalFailed { reference: String, reversed: bool },

    /// The atomic unit could not commit; the caller may retry
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a database connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            AppError::Database(DatabaseError::PoolCreation(_))
                | AppError::Database(DatabaseError::ConnectionTimeout)
        )
    }

    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Validation failures, insufficient funds included
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::InsufficientFunds { .. })
    }

    /// Whether repeating the same call may succeed without changing its input
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Consistency(_) | AppError::ExternalGateway(_))
            || self.is_connection_error()
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::InsufficientFunds { .. } => 422,
            AppError::NotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::ExternalGateway(_) | AppError::WithdrawalFailed { .. } => 502,
            AppError::Consistency(_) => 409,
            AppError::Database(_) | AppError::Config(_) | AppError::Serialization(_) => 500,
        }
    }

    /// Message safe to show an end user. Gateway and storage internals stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Forbidden(msg) => {
                msg.clone()
            }
            AppError::InsufficientFunds { available, required } => format!(
                "Insufficient wallet balance: you have {} but this requires {}",
                available, required
            ),
            AppError::ExternalGateway(_) => {
                "The payment provider is unavailable right now. Please try again.".to_string()
            }
            AppError::WithdrawalFailed { reference, reversed: true } => format!(
                "Your withdrawal could not be completed and the funds were returned to your wallet. \
                 Check transaction {} for details.",
                reference
            ),
            AppError::WithdrawalFailed { reference, reversed: false } => format!(
                "Your withdrawal could not be completed. Check transaction {} for its status.",
                reference
            ),
            AppError::Consistency(_) => {
                "The request conflicted with another update. Please try again.".to_string()
            }
            _ => "An internal error occurred".to_string(),
        }
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record (unique key collision)
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Lock conflict or serialization failure
    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    /// Only pending -> completed and pending -> failed are legal
    #[error("Transaction {reference} cannot move from {from} to {to}")]
    InvalidTransition {
        reference: String,
        from: String,
        to: String,
    },

    #[error("Not permitted: {0}")]
    Forbidden(String),

    /// Business rule violation (e.g., business not open for investment)
    #[error("Business rule violation: {0}")]
    BusinessRule(String),

    #[error("Store unavailable")]
    Unavailable,
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Query(e) => AppError::Database(DatabaseError::QueryError(e)),
            RepositoryError::Duplicate(msg) => AppError::Consistency(format!("Duplicate: {}", msg)),
            RepositoryError::Conflict(msg) => AppError::Consistency(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            RepositoryError::InvalidInput(msg) => AppError::Validation(msg),
            RepositoryError::InsufficientFunds { available, required } => {
                AppError::InsufficientFunds { available, required }
            }
            e @ RepositoryError::InvalidTransition { .. } => AppError::Validation(e.to_string()),
            RepositoryError::Forbidden(msg) => AppError::Forbidden(msg),
            RepositoryError::BusinessRule(msg) => AppError::Validation(msg),
            RepositoryError::Unavailable => AppError::Database(DatabaseError::ConnectionTimeout),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::PoolTimedOut | SqlxError::PoolClosed => RepositoryError::Unavailable,
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // Unique violation
                    Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                    // Foreign key / check constraint violation
                    Some("23503") | Some("23514") => {
                        RepositoryError::ConstraintViolation(db_err.message().to_string())
                    }
                    // Serialization failure / deadlock detected
                    Some("40001") | Some("40P01") => {
                        RepositoryError::Conflict(db_err.message().to_string())
                    }
                    _ => RepositoryError::Query(err),
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::ExternalGateway(err.to_string())
    }
}
