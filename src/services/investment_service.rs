//! Business funding and repayment distribution

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Business, Investment};
use crate::notify::{dispatch, LedgerEvent, LedgerNotifier};
use crate::reference::{self, OpCode};
use crate::repositories::{
    InvestmentOrder, InvestmentReceipt, LedgerStore, RepaymentOrder, RepaymentReceipt,
};
use crate::services::check_amount;

/// Summary of an investor's positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub investor_id: Uuid,
    pub investments: Vec<Investment>,
    pub total_invested: Decimal,
    pub total_expected: Decimal,
    pub total_received: Decimal,
    pub active_count: usize,
}

pub struct InvestmentService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn LedgerNotifier>,
}

impl InvestmentService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn LedgerNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Register a business in draft
    pub async fn create_business(
        &self,
        owner_id: Uuid,
        name: String,
        funding_goal: Decimal,
        return_rate: Decimal,
        duration_months: i32,
    ) -> AppResult<Business> {
        let business = Business::new(owner_id, name, funding_goal, return_rate, duration_months);
        business.validate().map_err(AppError::Validation)?;

        let business = self.store.create_business(business).await?;
        info!("Business {} created by {}", business.id, owner_id);
        Ok(business)
    }

    /// Open a draft business for investment
    pub async fn activate_business(&self, business_id: Uuid, owner_id: Uuid) -> AppResult<Business> {
        let business = self.store.activate_business(business_id, owner_id).await?;
        info!("Business {} is now open for investment", business_id);
        Ok(business)
    }

    pub async fn invest_in_business(
        &self,
        investor_id: Uuid,
        business_id: Uuid,
        amount: Decimal,
    ) -> AppResult<InvestmentReceipt> {
        check_amount(amount, "investment")?;

        let reference = reference::generate(OpCode::Investment);
        let receipt = self
            .store
            .invest(InvestmentOrder {
                reference: reference.clone(),
                investor_id,
                business_id,
                amount,
            })
            .await?;

        info!(
            "Investment {} of {} in business {} by {} (raised {} of {}, status {})",
            reference,
            amount,
            business_id,
            investor_id,
            receipt.business.raised_amount,
            receipt.business.funding_goal,
            receipt.business.status
        );
        dispatch(
            self.notifier.as_ref(),
            LedgerEvent::InvestmentMade {
                investor_id,
                business_id,
                reference,
                amount,
            },
        )
        .await;

        Ok(receipt)
    }

    /// Spread a repayment from the owner across the active investors
    pub async fn make_repayment(
        &self,
        owner_id: Uuid,
        business_id: Uuid,
        amount: Decimal,
    ) -> AppResult<RepaymentReceipt> {
        check_amount(amount, "repayment")?;

        let reference = reference::generate(OpCode::Repayment);
        let receipt = self
            .store
            .distribute_repayment(RepaymentOrder {
                reference: reference.clone(),
                owner_id,
                business_id,
                amount,
            })
            .await?;

        info!(
            "Repayment {} of {} for business {} distributed to {} investors",
            reference,
            amount,
            business_id,
            receipt.returns.len()
        );
        dispatch(
            self.notifier.as_ref(),
            LedgerEvent::RepaymentDistributed {
                owner_id,
                business_id,
                reference,
                amount,
                investor_count: receipt.returns.len(),
            },
        )
        .await;

        Ok(receipt)
    }

    pub async fn investor_portfolio(&self, investor_id: Uuid) -> AppResult<Portfolio> {
        let investments = self.store.list_investor_investments(investor_id).await?;

        let total_invested = investments.iter().map(|i| i.amount).sum();
        let total_expected = investments.iter().map(|i| i.expected_return).sum();
        let total_received = investments.iter().map(|i| i.returns_received).sum();
        let active_count = investments.iter().filter(|i| i.is_active()).count();

        Ok(Portfolio {
            investor_id,
            investments,
            total_invested,
            total_expected,
            total_received,
            active_count,
        })
    }

    pub async fn business_investments(&self, business_id: Uuid) -> AppResult<Vec<Investment>> {
        if self.store.find_business(business_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Business {} not found", business_id)));
        }
        Ok(self.store.list_business_investments(business_id).await?)
    }
}
