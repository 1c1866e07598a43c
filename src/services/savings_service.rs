//! Savings groups: membership and contributions

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{GroupMember, SavingsGroup};
use crate::notify::{dispatch, LedgerEvent, LedgerNotifier};
use crate::reference::{self, OpCode};
use crate::repositories::{ContributionOrder, ContributionReceipt, LedgerStore};
use crate::services::check_amount;

pub struct SavingsService {
    store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn LedgerNotifier>,
}

impl SavingsService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn LedgerNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Create a group; the creator is its first member and can never leave
    pub async fn create_group(
        &self,
        creator_id: Uuid,
        name: String,
        contribution_amount: Decimal,
    ) -> AppResult<(SavingsGroup, GroupMember)> {
        let group = SavingsGroup::new(creator_id, name, contribution_amount);
        group.validate().map_err(AppError::Validation)?;

        let created = self.store.create_group(group).await?;
        info!("Savings group {} created by {}", created.0.id, creator_id);
        Ok(created)
    }

    pub async fn join_group(&self, group_id: Uuid, user_id: Uuid) -> AppResult<GroupMember> {
        let member = self.store.join_group(group_id, user_id).await?;
        info!("User {} joined savings group {}", user_id, group_id);
        Ok(member)
    }

    pub async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> AppResult<GroupMember> {
        let member = self.store.leave_group(group_id, user_id).await?;
        info!("User {} left savings group {}", user_id, group_id);
        Ok(member)
    }

    pub async fn group_members(&self, group_id: Uuid) -> AppResult<Vec<GroupMember>> {
        if self.store.find_group(group_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Savings group {} not found", group_id)));
        }
        Ok(self.store.list_group_members(group_id).await?)
    }

    /// Move funds from a member's wallet into the group pool.
    /// `amount` falls back to the group's default contribution.
    pub async fn make_contribution(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        amount: Option<Decimal>,
    ) -> AppResult<ContributionReceipt> {
        if let Some(amount) = amount {
            check_amount(amount, "contribution")?;
        }

        let reference = reference::generate(OpCode::GroupContribution);
        let receipt = self
            .store
            .contribute(ContributionOrder {
                reference: reference.clone(),
                user_id,
                group_id,
                amount,
            })
            .await?;

        let contributed = -receipt.transaction.amount;
        info!(
            "Contribution {} of {} to group {} by {} (pool now {})",
            reference, contributed, group_id, user_id, receipt.group.current_total
        );
        dispatch(
            self.notifier.as_ref(),
            LedgerEvent::ContributionMade {
                user_id,
                group_id,
                reference,
                amount: contributed,
            },
        )
        .await;

        Ok(receipt)
    }
}
