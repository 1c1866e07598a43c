//! Transaction leg queries

use crate::error::RepositoryError;
use crate::models::{NewTransaction, Transaction, TransactionStatus, TransactionType};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

pub struct TransactionRepository;

impl TransactionRepository {
    /// Append a leg. A reused reference fails with a unique violation.
    pub async fn insert(conn: &mut PgConnection, new: &NewTransaction) -> Result<Transaction, RepositoryError> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions
            (id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, timezone('utc', now()), timezone('utc', now()))
            RETURNING id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.reference)
        .bind(new.user_id)
        .bind(new.transaction_type.as_str())
        .bind(new.amount)
        .bind(new.status.as_str())
        .bind(&new.description)
        .bind(&new.metadata)
        .fetch_one(&mut *conn)
        .await?;

        Ok(tx)
    }

    pub async fn find_by_reference(
        conn: &mut PgConnection,
        reference: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at
            FROM transactions
            WHERE reference = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(tx)
    }

    /// Same as the plain lookup, holding the row lock until commit
    pub async fn lock_by_reference(
        conn: &mut PgConnection,
        reference: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at
            FROM transactions
            WHERE reference = $1
            FOR UPDATE
            "#,
        )
        .bind(reference)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(tx)
    }

    /// Move a leg to `status`, merging `metadata_patch` into its metadata.
    ///
    /// Guarded on the row still being pending.
    pub async fn update_status(
        conn: &mut PgConnection,
        reference: &str,
        status: TransactionStatus,
        metadata_patch: &Value,
    ) -> Result<Transaction, RepositoryError> {
        let tx = sqlx::query_as::<_, Transaction>(
            r#"
            UPDATE transactions
            SET status = $2,
            metadata = metadata || $3::jsonb,
            updated_at = timezone('utc', now())
            WHERE reference = $1 AND status = 'pending'
            RETURNING id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at
            "#,
        )
        .bind(reference)
        .bind(status.as_str())
        .bind(metadata_patch)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            RepositoryError::Conflict(format!("Transaction {} is no longer pending", reference))
        })?;

        Ok(tx)
    }

    /// Newest first
    pub async fn list_by_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let txs = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at
            FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, reference DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        Ok(txs)
    }

    /// Oldest first
    pub async fn list_pending(
        conn: &mut PgConnection,
        transaction_type: TransactionType,
        older_than: NaiveDateTime,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let txs = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT id, reference, user_id, transaction_type, amount, status, description, metadata, created_at, updated_at
            FROM transactions
            WHERE transaction_type = $1 AND status = 'pending' AND created_at < $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(transaction_type.as_str())
        .bind(older_than)
        .fetch_all(&mut *conn)
        .await?;

        Ok(txs)
    }

    /// Completed contributions recorded against a group, as a positive sum
    pub async fn sum_group_contributions(conn: &mut PgConnection, group_id: Uuid) -> Result<Decimal, RepositoryError> {
        let total: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT SUM(-amount)
            FROM transactions
            WHERE transaction_type = 'group_contribution'
              AND status = 'completed'
              AND metadata ->> 'group_id' = $1
            "#,
        )
        .bind(group_id.to_string())
        .fetch_one(&mut *conn)
        .await?;

        Ok(total.unwrap_or(Decimal::ZERO))
    }
}
