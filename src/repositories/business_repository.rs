//! Business and investment queries

use crate::error::RepositoryError;
use crate::models::{Business, Investment};
use sqlx::PgConnection;
use uuid::Uuid;

pub struct BusinessRepository;

impl BusinessRepository {
    pub async fn insert(conn: &mut PgConnection, business: &Business) -> Result<Business, RepositoryError> {
        let created = sqlx::query_as::<_, Business>(
            r#"
            INSERT INTO businesses
            (id, owner_id, name, funding_goal, raised_amount, return_rate, duration_months, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, owner_id, name, funding_goal, raised_amount, return_rate, duration_months, status, created_at, updated_at
            "#,
        )
        .bind(business.id)
        .bind(business.owner_id)
        .bind(&business.name)
        .bind(business.funding_goal)
        .bind(business.raised_amount)
        .bind(business.return_rate)
        .bind(business.duration_months)
        .bind(&business.status)
        .bind(business.created_at)
        .bind(business.updated_at)
        .fetch_one(&mut *conn)
        .await?;

        Ok(created)
    }

    pub async fn find(
        conn: &mut PgConnection,
        business_id: Uuid,
    ) -> Result<Option<Business>, RepositoryError> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, owner_id, name, funding_goal, raised_amount, return_rate, duration_months, status, created_at, updated_at
            FROM businesses
            WHERE id = $1
            "#,
        )
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(business)
    }

    /// Same as the plain lookup, holding the row lock until commit
    pub async fn lock(
        conn: &mut PgConnection,
        business_id: Uuid,
    ) -> Result<Option<Business>, RepositoryError> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            SELECT id, owner_id, name, funding_goal, raised_amount, return_rate, duration_months, status, created_at, updated_at
            FROM businesses
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(business)
    }

    /// Persist raised amount and status
    pub async fn update_funding(conn: &mut PgConnection, business: &Business) -> Result<Business, RepositoryError> {
        let updated = sqlx::query_as::<_, Business>(
            r#"
            UPDATE businesses
            SET raised_amount = $2, status = $3, updated_at = timezone('utc', now())
            WHERE id = $1
            RETURNING id, owner_id, name, funding_goal, raised_amount, return_rate, duration_months, status, created_at, updated_at
            "#,
        )
        .bind(business.id)
        .bind(business.raised_amount)
        .bind(&business.status)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    pub async fn insert_investment(
        conn: &mut PgConnection,
        investment: &Investment,
    ) -> Result<Investment, RepositoryError> {
        let created = sqlx::query_as::<_, Investment>(
            r#"
            INSERT INTO investments
            (id, investor_id, business_id, amount, expected_return, returns_received, status, investment_date, maturity_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, investor_id, business_id, amount, expected_return, returns_received, status, investment_date, maturity_date
            "#,
        )
        .bind(investment.id)
        .bind(investment.investor_id)
        .bind(investment.business_id)
        .bind(investment.amount)
        .bind(investment.expected_return)
        .bind(investment.returns_received)
        .bind(&investment.status)
        .bind(investment.investment_date)
        .bind(investment.maturity_date)
        .fetch_one(&mut *conn)
        .await?;

        Ok(created)
    }

    /// Active investments of a business, locked, oldest first
    pub async fn lock_active_investments(
        conn: &mut PgConnection,
        business_id: Uuid,
    ) -> Result<Vec<Investment>, RepositoryError> {
        let investments = sqlx::query_as::<_, Investment>(
            r#"
            SELECT id, investor_id, business_id, amount, expected_return, returns_received, status, investment_date, maturity_date
            FROM investments
            WHERE business_id = $1 AND status = 'active'
            ORDER BY investment_date ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(business_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(investments)
    }

    pub async fn update_investment_returns(
        conn: &mut PgConnection,
        investment: &Investment,
    ) -> Result<Investment, RepositoryError> {
        let updated = sqlx::query_as::<_, Investment>(
            r#"
            UPDATE investments
            SET returns_received = $2, status = $3
            WHERE id = $1
            RETURNING id, investor_id, business_id, amount, expected_return, returns_received, status, investment_date, maturity_date
            "#,
        )
        .bind(investment.id)
        .bind(investment.returns_received)
        .bind(&investment.status)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    pub async fn count_active_investments(conn: &mut PgConnection, business_id: Uuid) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM investments WHERE business_id = $1 AND status = 'active'",
        )
        .bind(business_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(count)
    }

    pub async fn list_by_business(conn: &mut PgConnection, business_id: Uuid) -> Result<Vec<Investment>, RepositoryError> {
        let investments = sqlx::query_as::<_, Investment>(
            r#"
            SELECT id, investor_id, business_id, amount, expected_return, returns_received, status, investment_date, maturity_date
            FROM investments
            WHERE business_id = $1
            ORDER BY investment_date ASC, id ASC
            "#,
        )
        .bind(business_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(investments)
    }

    pub async fn list_by_investor(conn: &mut PgConnection, investor_id: Uuid) -> Result<Vec<Investment>, RepositoryError> {
        let investments = sqlx::query_as::<_, Investment>(
            r#"
            SELECT id, investor_id, business_id, amount, expected_return, returns_received, status, investment_date, maturity_date
            FROM investments
            WHERE investor_id = $1
            ORDER BY investment_date ASC, id ASC
            "#,
        )
        .bind(investor_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(investments)
    }
}
