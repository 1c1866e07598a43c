//! In-process ledger store used by tests and local development.
//!
//! One async mutex serializes every unit. Each write validates everything it
//! needs first and only then mutates, so an error leaves the state untouched.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::ledger_store::*;
use crate::error::RepositoryError;
use crate::models::{
    Business, BusinessStatus, GroupMember, Investment, NewTransaction, SavingsGroup, Transaction,
    TransactionStatus, TransactionType, VirtualAccount, Wallet,
};

#[derive(Debug, Default)]
struct MemState {
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<Transaction>,
    by_reference: HashMap<String, usize>,
    businesses: HashMap<Uuid, Business>,
    investments: Vec<Investment>,
    groups: HashMap<Uuid, SavingsGroup>,
    members: HashMap<(Uuid, Uuid), GroupMember>,
}

fn now() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

impl MemState {
    fn wallet(&mut self, user_id: Uuid) -> &mut Wallet {
        self.wallets
            .entry(user_id)
            .or_insert_with(|| Wallet::new(user_id))
    }

    fn wallet_snapshot(&self, user_id: Uuid) -> Wallet {
        self.wallets
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| Wallet::new(user_id))
    }

    fn credit(&mut self, user_id: Uuid, delta: Decimal) -> Wallet {
        let wallet = self.wallet(user_id);
        wallet.balance += delta;
        wallet.updated_at = now();
        wallet.clone()
    }

    fn transaction(&self, reference: &str) -> Option<&Transaction> {
        self.by_reference
            .get(reference)
            .and_then(|&idx| self.transactions.get(idx))
    }

    fn transaction_mut(&mut self, reference: &str) -> Option<&mut Transaction> {
        match self.by_reference.get(reference) {
            Some(&idx) => self.transactions.get_mut(idx),
            None => None,
        }
    }

    fn ensure_unique<'a>(&self, references: impl IntoIterator<Item = &'a str>) -> Result<(), RepositoryError> {
        let mut seen = std::collections::HashSet::new();
        for reference in references {
            if self.by_reference.contains_key(reference) || !seen.insert(reference) {
                return Err(RepositoryError::Duplicate(format!(
                    "Transaction reference {} already exists",
                    reference
                )));
            }
        }
        Ok(())
    }

    /// Append a leg; callers have already checked uniqueness
    fn push(&mut self, new: NewTransaction) -> Transaction {
        let tx = Transaction::from_new(new);
        self.by_reference
            .insert(tx.reference.clone(), self.transactions.len());
        self.transactions.push(tx.clone());
        tx
    }

    fn update_status(&mut self, reference: &str, status: TransactionStatus, patch: &Value) -> Option<Transaction> {
        let tx = self.transaction_mut(reference)?;
        tx.status = status.as_str().to_string();
        tx.merge_metadata(patch);
        tx.updated_at = now();
        Some(tx.clone())
    }

    fn active_investments(&self, business_id: Uuid) -> Vec<Investment> {
        let mut active: Vec<Investment> = self
            .investments
            .iter()
            .filter(|inv| inv.business_id == business_id && inv.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|inv| inv.investment_date);
        active
    }
}

/// [`LedgerStore`] kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<MemState>,
    unavailable: AtomicBool,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`RepositoryError::Unavailable`] while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    async fn lock(&self) -> Result<MutexGuard<'_, MemState>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable);
        }
        Ok(self.state.lock().await)
    }

    /// Sum of all wallet balances
    pub async fn total_balance(&self) -> Decimal {
        self.state.lock().await.wallets.values().map(|w| w.balance).sum()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet, RepositoryError> {
        let mut state = self.lock().await?;
        Ok(state.wallet(user_id).clone())
    }

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state.wallets.get(&user_id).cloned())
    }

    async fn bind_virtual_account(
        &self,
        user_id: Uuid,
        account: VirtualAccount,
    ) -> Result<Wallet, RepositoryError> {
        let mut state = self.lock().await?;

        let taken = state.wallets.values().any(|w| {
            w.user_id != user_id
                && w.virtual_account_number.as_deref() == Some(account.account_number.as_str())
        });
        if taken {
            return Err(RepositoryError::InvalidInput(format!(
                "Virtual account {} is bound to another wallet",
                account.account_number
            )));
        }

        let wallet = state.wallet(user_id);
        match wallet.virtual_account() {
            Some(existing) if existing == account => return Ok(wallet.clone()),
            Some(_) => {
                return Err(RepositoryError::InvalidInput(
                    "Wallet already has a virtual account".to_string(),
                ))
            }
            None => {}
        }

        wallet.virtual_account_number = Some(account.account_number);
        wallet.virtual_account_name = Some(account.account_name);
        wallet.virtual_bank_name = Some(account.bank_name);
        wallet.updated_at = now();
        Ok(wallet.clone())
    }

    async fn credit_virtual_account(
        &self,
        account_number: &str,
        amount: Decimal,
        reference: &str,
        metadata: Value,
    ) -> Result<DepositSettlement, RepositoryError> {
        check_positive(amount)?;
        let mut state = self.lock().await?;

        let wallet = state
            .wallets
            .values()
            .find(|w| w.virtual_account_number.as_deref() == Some(account_number))
            .cloned()
            .ok_or_else(|| not_found("Virtual account", account_number))?;

        if let Some(existing) = state.transaction(reference) {
            return Ok(DepositSettlement {
                transaction: existing.clone(),
                wallet,
                newly_completed: false,
            });
        }

        let leg = virtual_account_leg(&wallet, amount, reference, metadata);
        let transaction = state.push(leg);
        let wallet = state.credit(wallet.user_id, amount);

        Ok(DepositSettlement {
            transaction,
            wallet,
            newly_completed: true,
        })
    }

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state.transaction(reference).cloned())
    }

    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let state = self.lock().await?;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(state
            .transactions
            .iter()
            .rev()
            .filter(|tx| tx.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_pending_transactions(
        &self,
        transaction_type: TransactionType,
        older_than: NaiveDateTime,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| {
                tx.is_pending()
                    && tx.type_enum() == Some(transaction_type)
                    && tx.created_at < older_than
            })
            .cloned()
            .collect())
    }

    async fn insert_transaction(&self, new: NewTransaction) -> Result<Transaction, RepositoryError> {
        check_standalone_insert(&new)?;
        let mut state = self.lock().await?;
        state.ensure_unique([new.reference.as_str()])?;
        Ok(state.push(new))
    }

    async fn settle_transaction(
        &self,
        reference: &str,
        status: TransactionStatus,
        metadata_patch: Value,
    ) -> Result<Transaction, RepositoryError> {
        let mut state = self.lock().await?;
        let tx = state
            .transaction(reference)
            .ok_or_else(|| not_found("Transaction", reference))?;
        check_transition(tx, status)?;

        state
            .update_status(reference, status, &metadata_patch)
            .ok_or_else(|| not_found("Transaction", reference))
    }

    async fn complete_deposit(
        &self,
        reference: &str,
        metadata_patch: Value,
    ) -> Result<DepositSettlement, RepositoryError> {
        let mut state = self.lock().await?;
        let tx = state
            .transaction(reference)
            .cloned()
            .ok_or_else(|| not_found("Transaction", reference))?;
        check_deposit(&tx)?;

        if tx.is_completed() {
            return Ok(DepositSettlement {
                wallet: state.wallet_snapshot(tx.user_id),
                transaction: tx,
                newly_completed: false,
            });
        }
        check_transition(&tx, TransactionStatus::Completed)?;

        let wallet = state.credit(tx.user_id, tx.amount);
        let transaction = state
            .update_status(reference, TransactionStatus::Completed, &metadata_patch)
            .ok_or_else(|| not_found("Transaction", reference))?;

        Ok(DepositSettlement {
            transaction,
            wallet,
            newly_completed: true,
        })
    }

    async fn reserve_withdrawal(&self, new: NewTransaction) -> Result<(Transaction, Wallet), RepositoryError> {
        let amount = check_withdrawal_reservation(&new)?;
        let mut state = self.lock().await?;

        check_funds(&state.wallet_snapshot(new.user_id), amount)?;
        state.ensure_unique([new.reference.as_str()])?;

        let user_id = new.user_id;
        let tx = state.push(new);
        let wallet = state.credit(user_id, -amount);
        Ok((tx, wallet))
    }

    async fn reverse_withdrawal(
        &self,
        reference: &str,
        reason: &str,
    ) -> Result<WithdrawalReversal, RepositoryError> {
        let mut state = self.lock().await?;
        let tx = state
            .transaction(reference)
            .cloned()
            .ok_or_else(|| not_found("Transaction", reference))?;
        check_withdrawal(&tx)?;

        let refund = refund_leg(&tx, reason);
        state.ensure_unique([refund.reference.as_str()])?;

        let withdrawal = state
            .update_status(
                reference,
                TransactionStatus::Failed,
                &json!({ "failure_reason": reason, "refund_reference": refund.reference }),
            )
            .ok_or_else(|| not_found("Transaction", reference))?;
        let refund = state.push(refund);
        let wallet = state.credit(tx.user_id, refund.amount);

        Ok(WithdrawalReversal {
            withdrawal,
            refund,
            wallet,
        })
    }

    async fn transfer(&self, transfer: InternalTransfer) -> Result<TransferReceipt, RepositoryError> {
        check_transfer(&transfer)?;
        let mut state = self.lock().await?;

        check_funds(&state.wallet_snapshot(transfer.from_user_id), transfer.amount)?;
        let (outgoing, incoming) = transfer_legs(&transfer);
        state.ensure_unique([outgoing.reference.as_str(), incoming.reference.as_str()])?;

        let outgoing = state.push(outgoing);
        let incoming = state.push(incoming);
        let sender_wallet = state.credit(transfer.from_user_id, -transfer.amount);
        state.credit(transfer.to_user_id, transfer.amount);

        Ok(TransferReceipt {
            outgoing,
            incoming,
            sender_wallet,
        })
    }

    async fn create_business(&self, business: Business) -> Result<Business, RepositoryError> {
        business.validate().map_err(RepositoryError::InvalidInput)?;
        let mut state = self.lock().await?;
        if state.businesses.contains_key(&business.id) {
            return Err(RepositoryError::Duplicate(format!("Business {}", business.id)));
        }
        state.businesses.insert(business.id, business.clone());
        Ok(business)
    }

    async fn find_business(&self, business_id: Uuid) -> Result<Option<Business>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state.businesses.get(&business_id).cloned())
    }

    async fn activate_business(&self, business_id: Uuid, owner_id: Uuid) -> Result<Business, RepositoryError> {
        let mut state = self.lock().await?;
        let business = state
            .businesses
            .get_mut(&business_id)
            .ok_or_else(|| not_found("Business", business_id))?;
        check_can_activate(business, owner_id)?;

        business.status = BusinessStatus::Active.as_str().to_string();
        business.updated_at = now();
        Ok(business.clone())
    }

    async fn invest(&self, order: InvestmentOrder) -> Result<InvestmentReceipt, RepositoryError> {
        let mut state = self.lock().await?;
        let mut business = state
            .businesses
            .get(&order.business_id)
            .cloned()
            .ok_or_else(|| not_found("Business", order.business_id))?;
        check_can_invest(&business, order.investor_id, order.amount)?;
        check_funds(&state.wallet_snapshot(order.investor_id), order.amount)?;

        let investment = Investment::new(order.investor_id, &business, order.amount)
            .map_err(RepositoryError::InvalidInput)?;
        let (investor_leg, owner_leg) = investment_legs(&order, &business, &investment);
        state.ensure_unique([investor_leg.reference.as_str(), owner_leg.reference.as_str()])?;

        business.record_investment(order.amount);
        state.businesses.insert(business.id, business.clone());
        state.investments.push(investment.clone());
        let investor_leg = state.push(investor_leg);
        let owner_leg = state.push(owner_leg);
        state.credit(order.investor_id, -order.amount);
        state.credit(business.owner_id, order.amount);

        Ok(InvestmentReceipt {
            investment,
            business,
            investor_leg,
            owner_leg,
        })
    }

    async fn distribute_repayment(&self, order: RepaymentOrder) -> Result<RepaymentReceipt, RepositoryError> {
        let mut state = self.lock().await?;
        let mut business = state
            .businesses
            .get(&order.business_id)
            .cloned()
            .ok_or_else(|| not_found("Business", order.business_id))?;
        check_owner(&business, order.owner_id)?;
        check_positive(order.amount)?;

        let active = state.active_investments(business.id);
        if active.is_empty() {
            return Err(RepositoryError::BusinessRule(
                "Business has no active investments to repay".to_string(),
            ));
        }
        check_funds(&state.wallet_snapshot(order.owner_id), order.amount)?;
        let shares = allocate_repayment(order.amount, &active)?;

        let owner_leg = repayment_owner_leg(&order, &business, active.len());
        let mut planned = Vec::with_capacity(active.len());
        for (mut investment, share) in active.into_iter().zip(shares) {
            if share.is_zero() {
                continue;
            }
            let leg = return_leg(&order, &business, &investment, share);
            investment.apply_return(share);
            planned.push((investment, leg, share));
        }
        state.ensure_unique(
            std::iter::once(owner_leg.reference.as_str())
                .chain(planned.iter().map(|(_, leg, _)| leg.reference.as_str())),
        )?;

        let owner_leg = state.push(owner_leg);
        state.credit(order.owner_id, -order.amount);

        let mut returns = Vec::with_capacity(planned.len());
        for (investment, leg, share) in planned {
            if let Some(stored) = state.investments.iter_mut().find(|i| i.id == investment.id) {
                *stored = investment.clone();
            }
            let transaction = state.push(leg);
            state.credit(investment.investor_id, share);
            returns.push(ReturnPayment {
                investment,
                transaction,
            });
        }

        if state.active_investments(business.id).is_empty() {
            business.status = BusinessStatus::Completed.as_str().to_string();
            business.updated_at = now();
            state.businesses.insert(business.id, business.clone());
        }

        Ok(RepaymentReceipt {
            business,
            owner_leg,
            returns,
        })
    }

    async fn list_business_investments(&self, business_id: Uuid) -> Result<Vec<Investment>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state
            .investments
            .iter()
            .filter(|inv| inv.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn list_investor_investments(&self, investor_id: Uuid) -> Result<Vec<Investment>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state
            .investments
            .iter()
            .filter(|inv| inv.investor_id == investor_id)
            .cloned()
            .collect())
    }

    async fn create_group(&self, group: SavingsGroup) -> Result<(SavingsGroup, GroupMember), RepositoryError> {
        group.validate().map_err(RepositoryError::InvalidInput)?;
        let mut state = self.lock().await?;
        if state.groups.contains_key(&group.id) {
            return Err(RepositoryError::Duplicate(format!("Savings group {}", group.id)));
        }

        let creator = GroupMember::new(group.id, group.creator_id);
        state.groups.insert(group.id, group.clone());
        state
            .members
            .insert((group.id, group.creator_id), creator.clone());
        Ok((group, creator))
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<SavingsGroup>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state.groups.get(&group_id).cloned())
    }

    async fn find_member(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>, RepositoryError> {
        let state = self.lock().await?;
        Ok(state.members.get(&(group_id, user_id)).cloned())
    }

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, RepositoryError> {
        let state = self.lock().await?;
        let mut members: Vec<GroupMember> = state
            .members
            .values()
            .filter(|m| m.group_id == group_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn join_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, RepositoryError> {
        let mut state = self.lock().await?;
        let group = state
            .groups
            .get(&group_id)
            .ok_or_else(|| not_found("Savings group", group_id))?;
        check_can_join(group, state.members.get(&(group_id, user_id)))?;

        let member = state
            .members
            .entry((group_id, user_id))
            .or_insert_with(|| GroupMember::new(group_id, user_id));
        member.is_active = true;
        Ok(member.clone())
    }

    async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, RepositoryError> {
        let mut state = self.lock().await?;
        let group = state
            .groups
            .get(&group_id)
            .ok_or_else(|| not_found("Savings group", group_id))?;
        check_can_leave(group, user_id, state.members.get(&(group_id, user_id)))?;

        let member = state
            .members
            .get_mut(&(group_id, user_id))
            .ok_or_else(|| not_found("Active membership in group", group_id))?;
        member.is_active = false;
        Ok(member.clone())
    }

    async fn contribute(&self, order: ContributionOrder) -> Result<ContributionReceipt, RepositoryError> {
        let mut state = self.lock().await?;
        let group = state
            .groups
            .get(&order.group_id)
            .cloned()
            .ok_or_else(|| not_found("Savings group", order.group_id))?;
        let amount = check_can_contribute(
            &group,
            state.members.get(&(order.group_id, order.user_id)),
            order.amount,
        )?;
        check_funds(&state.wallet_snapshot(order.user_id), amount)?;

        let leg = contribution_leg(&order, &group, amount);
        state.ensure_unique([leg.reference.as_str()])?;

        let transaction = state.push(leg);
        let wallet = state.credit(order.user_id, -amount);

        let group = match state.groups.get_mut(&order.group_id) {
            Some(g) => {
                g.current_total += amount;
                g.clone()
            }
            None => return Err(not_found("Savings group", order.group_id)),
        };
        let member = match state.members.get_mut(&(order.group_id, order.user_id)) {
            Some(m) => {
                m.record_contribution(amount, transaction.created_at);
                m.clone()
            }
            None => return Err(not_found("Group member", order.user_id)),
        };

        Ok(ContributionReceipt {
            transaction,
            group,
            member,
            wallet,
        })
    }

    async fn group_contribution_total(&self, group_id: Uuid) -> Result<Decimal, RepositoryError> {
        let state = self.lock().await?;
        Ok(state
            .transactions
            .iter()
            .filter(|tx| {
                tx.is_completed()
                    && tx.type_enum() == Some(TransactionType::GroupContribution)
                    && group_id_of(tx) == Some(group_id)
            })
            .map(|tx| -tx.amount)
            .sum())
    }
}
