//! Savings group and membership queries

use crate::error::RepositoryError;
use crate::models::{GroupMember, SavingsGroup};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

pub struct SavingsRepository;

impl SavingsRepository {
    pub async fn insert_group(conn: &mut PgConnection, group: &SavingsGroup) -> Result<SavingsGroup, RepositoryError> {
        let created = sqlx::query_as::<_, SavingsGroup>(
            r#"
            INSERT INTO savings_groups (id, name, creator_id, contribution_amount, current_total, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, name, creator_id, contribution_amount, current_total, is_active, created_at
            "#,
        )
        .bind(group.id)
        .bind(&group.name)
        .bind(group.creator_id)
        .bind(group.contribution_amount)
        .bind(group.current_total)
        .bind(group.is_active)
        .bind(group.created_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(created)
    }

    pub async fn find_group(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Option<SavingsGroup>, RepositoryError> {
        let group = sqlx::query_as::<_, SavingsGroup>(
            r#"
            SELECT id, name, creator_id, contribution_amount, current_total, is_active, created_at
            FROM savings_groups
            WHERE id = $1
            "#,
        )
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(group)
    }

    /// Same as the plain lookup, holding the row lock until commit
    pub async fn lock_group(
        conn: &mut PgConnection,
        group_id: Uuid,
    ) -> Result<Option<SavingsGroup>, RepositoryError> {
        let group = sqlx::query_as::<_, SavingsGroup>(
            r#"
            SELECT id, name, creator_id, contribution_amount, current_total, is_active, created_at
            FROM savings_groups
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(group_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(group)
    }

    pub async fn add_to_total(
        conn: &mut PgConnection,
        group_id: Uuid,
        amount: Decimal,
    ) -> Result<SavingsGroup, RepositoryError> {
        let group = sqlx::query_as::<_, SavingsGroup>(
            r#"
            UPDATE savings_groups
            SET current_total = current_total + $2
            WHERE id = $1
            RETURNING id, name, creator_id, contribution_amount, current_total, is_active, created_at
            "#,
        )
        .bind(group_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(group)
    }

    /// Add a member, or re-activate one who left earlier (history is kept)
    pub async fn upsert_active_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupMember, RepositoryError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            INSERT INTO group_members (group_id, user_id, contributions_made, total_contributed, is_active, joined_at)
            VALUES ($1, $2, 0, 0, TRUE, timezone('utc', now()))
            ON CONFLICT (group_id, user_id) DO UPDATE
            SET is_active = TRUE
            RETURNING group_id, user_id, contributions_made, total_contributed, last_contribution_date, is_active, joined_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(member)
    }

    pub async fn find_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, RepositoryError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT group_id, user_id, contributions_made, total_contributed, last_contribution_date, is_active, joined_at
            FROM group_members
            WHERE group_id = $1 AND user_id = $2
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(member)
    }

    /// Same as the plain lookup, holding the row lock until commit
    pub async fn lock_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<GroupMember>, RepositoryError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT group_id, user_id, contributions_made, total_contributed, last_contribution_date, is_active, joined_at
            FROM group_members
            WHERE group_id = $1 AND user_id = $2
            FOR UPDATE
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(member)
    }

    pub async fn deactivate_member(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
    ) -> Result<GroupMember, RepositoryError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            UPDATE group_members
            SET is_active = FALSE
            WHERE group_id = $1 AND user_id = $2
            RETURNING group_id, user_id, contributions_made, total_contributed, last_contribution_date, is_active, joined_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(member)
    }

    pub async fn record_contribution(
        conn: &mut PgConnection,
        group_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<GroupMember, RepositoryError> {
        let member = sqlx::query_as::<_, GroupMember>(
            r#"
            UPDATE group_members
            SET contributions_made = contributions_made + 1,
            total_contributed = total_contributed + $3,
            last_contribution_date = timezone('utc', now())
            WHERE group_id = $1 AND user_id = $2
            RETURNING group_id, user_id, contributions_made, total_contributed, last_contribution_date, is_active, joined_at
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .bind(amount)
        .fetch_one(&mut *conn)
        .await?;

        Ok(member)
    }

    pub async fn list_members(conn: &mut PgConnection, group_id: Uuid) -> Result<Vec<GroupMember>, RepositoryError> {
        let members = sqlx::query_as::<_, GroupMember>(
            r#"
            SELECT group_id, user_id, contributions_made, total_contributed, last_contribution_date, is_active, joined_at
            FROM group_members
            WHERE group_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(members)
    }
}
