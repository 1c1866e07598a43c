//! Wallet queries. Every function runs on the caller's connection so several
//! of them can share one database transaction.

use crate::error::RepositoryError;
use crate::models::{VirtualAccount, Wallet};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

pub struct WalletRepository;

impl WalletRepository {
    /// Get or create a wallet.
    ///
    /// Concurrent first access is settled by the primary key: the loser of
    /// the insert race does nothing and re-reads the winner's row.
    pub async fn get_or_create(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet, RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, balance, created_at, updated_at)
            VALUES ($1, 0, timezone('utc', now()), timezone('utc', now()))
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

        Self::find(conn, user_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("Wallet {} not found", user_id)))
    }

    pub async fn find(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, balance, virtual_account_number, virtual_account_name, virtual_bank_name, created_at, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(wallet)
    }

    /// Lock a wallet row for the rest of the transaction, creating it if needed
    pub async fn lock(conn: &mut PgConnection, user_id: Uuid) -> Result<Wallet, RepositoryError> {
        Self::get_or_create(conn, user_id).await?;

        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, balance, virtual_account_number, virtual_account_name, virtual_bank_name, created_at, updated_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(wallet)
    }

    /// Lock several wallets in ascending user-id order.
    ///
    /// A fixed order keeps two units that touch the same pair of wallets
    /// from deadlocking each other.
    pub async fn lock_many(conn: &mut PgConnection, user_ids: &[Uuid]) -> Result<Vec<Wallet>, RepositoryError> {
        let mut ids = user_ids.to_vec();
        ids.sort();
        ids.dedup();

        let mut wallets = Vec::with_capacity(ids.len());
        for id in ids {
            wallets.push(Self::lock(conn, id).await?);
        }
        Ok(wallets)
    }

    /// Add `delta` (negative for debits) to a locked wallet
    pub async fn adjust_balance(
        conn: &mut PgConnection,
        user_id: Uuid,
        delta: Decimal,
    ) -> Result<Wallet, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET balance = balance + $2, updated_at = timezone('utc', now())
            WHERE user_id = $1
            RETURNING user_id, balance, virtual_account_number, virtual_account_name, virtual_bank_name, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Wallet {} not found", user_id)))?;

        Ok(wallet)
    }

    pub async fn find_by_virtual_account(
        conn: &mut PgConnection,
        account_number: &str,
    ) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, balance, virtual_account_number, virtual_account_name, virtual_bank_name, created_at, updated_at
            FROM wallets
            WHERE virtual_account_number = $1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(wallet)
    }

    /// Same as the plain lookup, holding the row lock until commit
    pub async fn lock_by_virtual_account(
        conn: &mut PgConnection,
        account_number: &str,
    ) -> Result<Option<Wallet>, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, balance, virtual_account_number, virtual_account_name, virtual_bank_name, created_at, updated_at
            FROM wallets
            WHERE virtual_account_number = $1
            FOR UPDATE
            "#,
        )
        .bind(account_number)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(wallet)
    }

    pub async fn set_virtual_account(
        conn: &mut PgConnection,
        user_id: Uuid,
        account: &VirtualAccount,
    ) -> Result<Wallet, RepositoryError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            UPDATE wallets
            SET virtual_account_number = $2,
            virtual_account_name = $3,
            virtual_bank_name = $4,
            updated_at = timezone('utc', now())
            WHERE user_id = $1 AND virtual_account_number IS NULL
            RETURNING user_id, balance, virtual_account_number, virtual_account_name, virtual_bank_name, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&account.account_number)
        .bind(&account.account_name)
        .bind(&account.bank_name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            RepositoryError::InvalidInput("Wallet already has a virtual account".to_string())
        })?;

        Ok(wallet)
    }
}
