//! Postgres-backed ledger store.
//!
//! Every write opens one database transaction and commits it at the end; any
//! early return drops the transaction and rolls it back. Rows are locked in a
//! fixed order: the business or group row first, then wallets by ascending
//! user id.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use super::business_repository::BusinessRepository;
use super::ledger_store::*;
use super::savings_repository::SavingsRepository;
use super::transaction_repository::TransactionRepository;
use super::wallet_repository::WalletRepository;
use crate::error::RepositoryError;
use crate::models::{
    Business, BusinessStatus, GroupMember, Investment, NewTransaction, SavingsGroup, Transaction,
    TransactionStatus, TransactionType, VirtualAccount, Wallet,
};

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        WalletRepository::get_or_create(&mut conn, user_id).await
    }

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        WalletRepository::find(&mut conn, user_id).await
    }

    async fn bind_virtual_account(
        &self,
        user_id: Uuid,
        account: VirtualAccount,
    ) -> Result<Wallet, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let wallet = WalletRepository::lock(&mut tx, user_id).await?;
        match wallet.virtual_account() {
            Some(existing) if existing == account => return Ok(wallet),
            Some(_) => {
                return Err(RepositoryError::InvalidInput(
                    "Wallet already has a virtual account".to_string(),
                ))
            }
            None => {}
        }

        if let Some(other) = WalletRepository::find_by_virtual_account(&mut tx, &account.account_number).await? {
            if other.user_id != user_id {
                return Err(RepositoryError::InvalidInput(format!(
                    "Virtual account {} is bound to another wallet",
                    account.account_number
                )));
            }
        }

        let wallet = WalletRepository::set_virtual_account(&mut tx, user_id, &account).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn credit_virtual_account(
        &self,
        account_number: &str,
        amount: Decimal,
        reference: &str,
        metadata: Value,
    ) -> Result<DepositSettlement, RepositoryError> {
        check_positive(amount)?;
        let mut tx = self.pool.begin().await?;

        let wallet = WalletRepository::lock_by_virtual_account(&mut tx, account_number)
            .await?
            .ok_or_else(|| not_found("Virtual account", account_number))?;

        if let Some(existing) = TransactionRepository::find_by_reference(&mut tx, reference).await? {
            return Ok(DepositSettlement {
                transaction: existing,
                wallet,
                newly_completed: false,
            });
        }

        let leg = virtual_account_leg(&wallet, amount, reference, metadata);
        let transaction = TransactionRepository::insert(&mut tx, &leg).await?;
        let wallet = WalletRepository::adjust_balance(&mut tx, wallet.user_id, amount).await?;

        tx.commit().await?;
        Ok(DepositSettlement {
            transaction,
            wallet,
            newly_completed: true,
        })
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        TransactionRepository::find_by_reference(&mut conn, reference).await
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        TransactionRepository::list_by_user(&mut conn, user_id, limit).await
    }

    async fn list_pending_transactions(
        &self,
        transaction_type: TransactionType,
        older_than: NaiveDateTime,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        TransactionRepository::list_pending(&mut conn, transaction_type, older_than).await
    }

    async fn insert_transaction(&self, new: NewTransaction) -> Result<Transaction, RepositoryError> {
        check_standalone_insert(&new)?;
        let mut conn = self.pool.acquire().await?;
        TransactionRepository::insert(&mut conn, &new).await
    }

    async fn settle_transaction(
        &self,
        reference: &str,
        status: TransactionStatus,
        metadata_patch: Value,
    ) -> Result<Transaction, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = TransactionRepository::lock_by_reference(&mut tx, reference)
            .await?
            .ok_or_else(|| not_found("Transaction", reference))?;
        check_transition(&current, status)?;

        let updated = TransactionRepository::update_status(&mut tx, reference, status, &metadata_patch).await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn complete_deposit(
        &self,
        reference: &str,
        metadata_patch: Value,
    ) -> Result<DepositSettlement, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // The row lock makes a concurrent second completion wait and then see
        // the completed status.
        let deposit = TransactionRepository::lock_by_reference(&mut tx, reference)
            .await?
            .ok_or_else(|| not_found("Transaction", reference))?;
        check_deposit(&deposit)?;

        if deposit.is_completed() {
            let wallet = WalletRepository::get_or_create(&mut tx, deposit.user_id).await?;
            tx.commit().await?;
            return Ok(DepositSettlement {
                transaction: deposit,
                wallet,
                newly_completed: false,
            });
        }
        check_transition(&deposit, TransactionStatus::Completed)?;

        WalletRepository::lock(&mut tx, deposit.user_id).await?;
        let wallet = WalletRepository::adjust_balance(&mut tx, deposit.user_id, deposit.amount).await?;
        let transaction =
            TransactionRepository::update_status(&mut tx, reference, TransactionStatus::Completed, &metadata_patch)
                .await?;

        tx.commit().await?;
        Ok(DepositSettlement {
            transaction,
            wallet,
            newly_completed: true,
        })
    }

    async fn reserve_withdrawal(&self, new: NewTransaction) -> Result<(Transaction, Wallet), RepositoryError> {
        let amount = check_withdrawal_reservation(&new)?;
        let mut tx = self.pool.begin().await?;

        let wallet = WalletRepository::lock(&mut tx, new.user_id).await?;
        check_funds(&wallet, amount)?;

        let transaction = TransactionRepository::insert(&mut tx, &new).await?;
        let wallet = WalletRepository::adjust_balance(&mut tx, new.user_id, -amount).await?;

        tx.commit().await?;
        Ok((transaction, wallet))
    }

    async fn reverse_withdrawal(
        &self,
        reference: &str,
        reason: &str,
    ) -> Result<WithdrawalReversal, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = TransactionRepository::lock_by_reference(&mut tx, reference)
            .await?
            .ok_or_else(|| not_found("Transaction", reference))?;
        check_withdrawal(&current)?;

        let refund = refund_leg(&current, reason);
        WalletRepository::lock(&mut tx, current.user_id).await?;

        let withdrawal = TransactionRepository::update_status(
            &mut tx,
            reference,
            TransactionStatus::Failed,
            &json!({ "failure_reason": reason, "refund_reference": refund.reference }),
        )
        .await?;
        let refund = TransactionRepository::insert(&mut tx, &refund).await?;
        let wallet = WalletRepository::adjust_balance(&mut tx, current.user_id, refund.amount).await?;

        tx.commit().await?;
        Ok(WithdrawalReversal {
            withdrawal,
            refund,
            wallet,
        })
    }

    async fn transfer(&self, transfer: InternalTransfer) -> Result<TransferReceipt, RepositoryError> {
        check_transfer(&transfer)?;
        let mut tx = self.pool.begin().await?;

        let wallets = WalletRepository::lock_many(&mut tx, &[transfer.from_user_id, transfer.to_user_id]).await?;
        let sender = wallets
            .iter()
            .find(|w| w.user_id == transfer.from_user_id)
            .ok_or_else(|| not_found("Wallet", transfer.from_user_id))?;
        check_funds(sender, transfer.amount)?;

        let (outgoing, incoming) = transfer_legs(&transfer);
        let outgoing = TransactionRepository::insert(&mut tx, &outgoing).await?;
        let incoming = TransactionRepository::insert(&mut tx, &incoming).await?;
        let sender_wallet = WalletRepository::adjust_balance(&mut tx, transfer.from_user_id, -transfer.amount).await?;
        WalletRepository::adjust_balance(&mut tx, transfer.to_user_id, transfer.amount).await?;

        tx.commit().await?;
        Ok(TransferReceipt {
            outgoing,
            incoming,
            sender_wallet,
        })
    }

    async fn create_business(&self, business: Business) -> Result<Business, RepositoryError> {
        business.validate().map_err(RepositoryError::InvalidInput)?;
        let mut conn = self.pool.acquire().await?;
        BusinessRepository::insert(&mut conn, &business).await
    }

    async fn find_business(&self, business_id: Uuid) -> Result<Option<Business>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        BusinessRepository::find(&mut conn, business_id).await
    }

    async fn activate_business(&self, business_id: Uuid, owner_id: Uuid) -> Result<Business, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut business = BusinessRepository::lock(&mut tx, business_id)
            .await?
            .ok_or_else(|| not_found("Business", business_id))?;
        check_can_activate(&business, owner_id)?;

        business.status = BusinessStatus::Active.as_str().to_string();
        let business = BusinessRepository::update_funding(&mut tx, &business).await?;

        tx.commit().await?;
        Ok(business)
    }

    async fn invest(&self, order: InvestmentOrder) -> Result<InvestmentReceipt, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut business = BusinessRepository::lock(&mut tx, order.business_id)
            .await?
            .ok_or_else(|| not_found("Business", order.business_id))?;
        check_can_invest(&business, order.investor_id, order.amount)?;

        let wallets = WalletRepository::lock_many(&mut tx, &[order.investor_id, business.owner_id]).await?;
        let investor = wallets
            .iter()
            .find(|w| w.user_id == order.investor_id)
            .ok_or_else(|| not_found("Wallet", order.investor_id))?;
        check_funds(investor, order.amount)?;

        let investment = Investment::new(order.investor_id, &business, order.amount)
            .map_err(RepositoryError::InvalidInput)?;
        let (investor_leg, owner_leg) = investment_legs(&order, &business, &investment);

        business.record_investment(order.amount);
        let business = BusinessRepository::update_funding(&mut tx, &business).await?;
        let investment = BusinessRepository::insert_investment(&mut tx, &investment).await?;
        let investor_leg = TransactionRepository::insert(&mut tx, &investor_leg).await?;
        let owner_leg = TransactionRepository::insert(&mut tx, &owner_leg).await?;
        WalletRepository::adjust_balance(&mut tx, order.investor_id, -order.amount).await?;
        WalletRepository::adjust_balance(&mut tx, business.owner_id, order.amount).await?;

        tx.commit().await?;
        Ok(InvestmentReceipt {
            investment,
            business,
            investor_leg,
            owner_leg,
        })
    }

    async fn distribute_repayment(&self, order: RepaymentOrder) -> Result<RepaymentReceipt, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut business = BusinessRepository::lock(&mut tx, order.business_id)
            .await?
            .ok_or_else(|| not_found("Business", order.business_id))?;
        check_owner(&business, order.owner_id)?;
        check_positive(order.amount)?;

        let active = BusinessRepository::lock_active_investments(&mut tx, business.id).await?;
        if active.is_empty() {
            return Err(RepositoryError::BusinessRule(
                "Business has no active investments to repay".to_string(),
            ));
        }

        let mut wallet_ids: Vec<Uuid> = active.iter().map(|inv| inv.investor_id).collect();
        wallet_ids.push(order.owner_id);
        let wallets = WalletRepository::lock_many(&mut tx, &wallet_ids).await?;
        let owner_wallet = wallets
            .iter()
            .find(|w| w.user_id == order.owner_id)
            .ok_or_else(|| not_found("Wallet", order.owner_id))?;
        check_funds(owner_wallet, order.amount)?;

        let shares = allocate_repayment(order.amount, &active)?;
        let owner_leg = repayment_owner_leg(&order, &business, active.len());
        let owner_leg = TransactionRepository::insert(&mut tx, &owner_leg).await?;
        WalletRepository::adjust_balance(&mut tx, order.owner_id, -order.amount).await?;

        let mut returns = Vec::with_capacity(active.len());
        for (mut investment, share) in active.into_iter().zip(shares) {
            if share.is_zero() {
                continue;
            }
            let leg = return_leg(&order, &business, &investment, share);
            investment.apply_return(share);

            let investment = BusinessRepository::update_investment_returns(&mut tx, &investment).await?;
            let transaction = TransactionRepository::insert(&mut tx, &leg).await?;
            WalletRepository::adjust_balance(&mut tx, investment.investor_id, share).await?;
            returns.push(ReturnPayment {
                investment,
                transaction,
            });
        }

        if BusinessRepository::count_active_investments(&mut tx, business.id).await? == 0 {
            business.status = BusinessStatus::Completed.as_str().to_string();
            business = BusinessRepository::update_funding(&mut tx, &business).await?;
        }

        tx.commit().await?;
        Ok(RepaymentReceipt {
            business,
            owner_leg,
            returns,
        })
    }

    async fn list_business_investments(&self, business_id: Uuid) -> Result<Vec<Investment>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        BusinessRepository::list_by_business(&mut conn, business_id).await
    }

    async fn list_investor_investments(&self, investor_id: Uuid) -> Result<Vec<Investment>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        BusinessRepository::list_by_investor(&mut conn, investor_id).await
    }

    async fn create_group(&self, group: SavingsGroup) -> Result<(SavingsGroup, GroupMember), RepositoryError> {
        group.validate().map_err(RepositoryError::InvalidInput)?;
        let mut tx = self.pool.begin().await?;

        let group = SavingsRepository::insert_group(&mut tx, &group).await?;
        let creator = SavingsRepository::upsert_active_member(&mut tx, group.id, group.creator_id).await?;

        tx.commit().await?;
        Ok((group, creator))
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<SavingsGroup>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        SavingsRepository::find_group(&mut conn, group_id).await
    }

    async fn find_member(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        SavingsRepository::find_member(&mut conn, group_id, user_id).await
    }

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        SavingsRepository::list_members(&mut conn, group_id).await
    }

    async fn join_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let group = SavingsRepository::lock_group(&mut tx, group_id)
            .await?
            .ok_or_else(|| not_found("Savings group", group_id))?;
        let existing = SavingsRepository::lock_member(&mut tx, group_id, user_id).await?;
        check_can_join(&group, existing.as_ref())?;

        let member = SavingsRepository::upsert_active_member(&mut tx, group_id, user_id).await?;
        tx.commit().await?;
        Ok(member)
    }

    async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let group = SavingsRepository::lock_group(&mut tx, group_id)
            .await?
            .ok_or_else(|| not_found("Savings group", group_id))?;
        let existing = SavingsRepository::lock_member(&mut tx, group_id, user_id).await?;
        check_can_leave(&group, user_id, existing.as_ref())?;

        let member = SavingsRepository::deactivate_member(&mut tx, group_id, user_id).await?;
        tx.commit().await?;
        Ok(member)
    }

    async fn contribute(&self, order: ContributionOrder) -> Result<ContributionReceipt, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let group = SavingsRepository::lock_group(&mut tx, order.group_id)
            .await?
            .ok_or_else(|| not_found("Savings group", order.group_id))?;
        let member = SavingsRepository::lock_member(&mut tx, order.group_id, order.user_id).await?;
        let amount = check_can_contribute(&group, member.as_ref(), order.amount)?;

        let wallet = WalletRepository::lock(&mut tx, order.user_id).await?;
        check_funds(&wallet, amount)?;

        let leg = contribution_leg(&order, &group, amount);
        let transaction = TransactionRepository::insert(&mut tx, &leg).await?;
        let wallet = WalletRepository::adjust_balance(&mut tx, order.user_id, -amount).await?;
        let group = SavingsRepository::add_to_total(&mut tx, order.group_id, amount).await?;
        let member = SavingsRepository::record_contribution(&mut tx, order.group_id, order.user_id, amount).await?;

        tx.commit().await?;
        Ok(ContributionReceipt {
            transaction,
            group,
            member,
            wallet,
        })
    }

    async fn group_contribution_total(&self, group_id: Uuid) -> Result<Decimal, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        TransactionRepository::sum_group_contributions(&mut conn, group_id).await
    }
}
