//! The ledger store contract.
//!
//! Every write method on [`LedgerStore`] is one atomic unit: either all of
//! its balance changes and transaction legs become visible together, or none
//! do. Rule checks and leg construction live here so every implementation
//! produces identical records.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::distribution::{self, is_whole_cents, AllocationError, Claim};
use crate::error::RepositoryError;
use crate::models::{
    Business, BusinessStatus, GroupMember, Investment, NewTransaction, SavingsGroup, Transaction,
    TransactionStatus, TransactionType, VirtualAccount, Wallet,
};
use crate::reference;

/// Outcome of completing a deposit
#[derive(Debug, Clone)]
pub struct DepositSettlement {
    pub transaction: Transaction,
    pub wallet: Wallet,
    /// False when the deposit had already been completed by an earlier call
    pub newly_completed: bool,
}

#[derive(Debug, Clone)]
pub struct WithdrawalReversal {
    pub withdrawal: Transaction,
    pub refund: Transaction,
    pub wallet: Wallet,
}

/// Wallet-to-wallet movement
#[derive(Debug, Clone)]
pub struct InternalTransfer {
    /// Base reference; legs get `-OUT` / `-IN`
    pub reference: String,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub outgoing: Transaction,
    pub incoming: Transaction,
    pub sender_wallet: Wallet,
}

#[derive(Debug, Clone)]
pub struct InvestmentOrder {
    pub reference: String,
    pub investor_id: Uuid,
    pub business_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Clone)]
pub struct InvestmentReceipt {
    pub investment: Investment,
    pub business: Business,
    pub investor_leg: Transaction,
    pub owner_leg: Transaction,
}

#[derive(Debug, Clone)]
pub struct RepaymentOrder {
    pub reference: String,
    pub owner_id: Uuid,
    pub business_id: Uuid,
    pub amount: Decimal,
}

/// One investor's cut of a repayment
#[derive(Debug, Clone)]
pub struct ReturnPayment {
    pub investment: Investment,
    pub transaction: Transaction,
}

#[derive(Debug, Clone)]
pub struct RepaymentReceipt {
    pub business: Business,
    pub owner_leg: Transaction,
    pub returns: Vec<ReturnPayment>,
}

impl RepaymentReceipt {
    pub fn distributed_total(&self) -> Decimal {
        self.returns.iter().map(|r| r.transaction.amount).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ContributionOrder {
    pub reference: String,
    pub user_id: Uuid,
    pub group_id: Uuid,
    /// Falls back to the group's default contribution amount
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct ContributionReceipt {
    pub transaction: Transaction,
    pub group: SavingsGroup,
    pub member: GroupMember,
    pub wallet: Wallet,
}

/// Persistence boundary for wallets, transaction legs, businesses and groups
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Wallets

    /// Existing wallet, or a fresh one with zero balance
    async fn get_or_create_wallet(&self, user_id: Uuid) -> Result<Wallet, RepositoryError>;

    async fn find_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>, RepositoryError>;

    /// Attach a gateway virtual account; a wallet keeps its first binding forever
    async fn bind_virtual_account(
        &self,
        user_id: Uuid,
        account: VirtualAccount,
    ) -> Result<Wallet, RepositoryError>;

    /// Credit the wallet bound to `account_number` with a completed
    /// `virtual_account_deposit` leg. Replaying a reference is a no-op.
    async fn credit_virtual_account(
        &self,
        account_number: &str,
        amount: Decimal,
        reference: &str,
        metadata: Value,
    ) -> Result<DepositSettlement, RepositoryError>;

    // Transactions

    async fn find_transaction(&self, reference: &str) -> Result<Option<Transaction>, RepositoryError>;

    /// Newest first
    async fn list_transactions(
        &self,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    /// Pending legs of `transaction_type` created before `older_than`, oldest first
    async fn list_pending_transactions(
        &self,
        transaction_type: TransactionType,
        older_than: NaiveDateTime,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    /// Record a pending leg with no balance effect
    async fn insert_transaction(&self, new: NewTransaction) -> Result<Transaction, RepositoryError>;

    /// Move a pending leg to a terminal status without touching any balance
    async fn settle_transaction(
        &self,
        reference: &str,
        status: TransactionStatus,
        metadata_patch: Value,
    ) -> Result<Transaction, RepositoryError>;

    /// Complete a pending deposit and credit its wallet
    async fn complete_deposit(
        &self,
        reference: &str,
        metadata_patch: Value,
    ) -> Result<DepositSettlement, RepositoryError>;

    /// Debit the wallet and record the pending withdrawal leg
    async fn reserve_withdrawal(&self, new: NewTransaction) -> Result<(Transaction, Wallet), RepositoryError>;

    /// Fail a pending withdrawal, credit the amount back and append the refund leg
    async fn reverse_withdrawal(
        &self,
        reference: &str,
        reason: &str,
    ) -> Result<WithdrawalReversal, RepositoryError>;

    async fn transfer(&self, transfer: InternalTransfer) -> Result<TransferReceipt, RepositoryError>;

    // Businesses and investments

    async fn create_business(&self, business: Business) -> Result<Business, RepositoryError>;

    async fn find_business(&self, business_id: Uuid) -> Result<Option<Business>, RepositoryError>;

    /// Open a draft business for investment; owner only
    async fn activate_business(&self, business_id: Uuid, owner_id: Uuid) -> Result<Business, RepositoryError>;

    async fn invest(&self, order: InvestmentOrder) -> Result<InvestmentReceipt, RepositoryError>;

    async fn distribute_repayment(&self, order: RepaymentOrder) -> Result<RepaymentReceipt, RepositoryError>;

    /// Oldest first
    async fn list_business_investments(&self, business_id: Uuid) -> Result<Vec<Investment>, RepositoryError>;

    /// Oldest first
    async fn list_investor_investments(&self, investor_id: Uuid) -> Result<Vec<Investment>, RepositoryError>;

    // Savings groups

    /// Insert the group with its creator as the first active member
    async fn create_group(&self, group: SavingsGroup) -> Result<(SavingsGroup, GroupMember), RepositoryError>;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<SavingsGroup>, RepositoryError>;

    async fn find_member(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>, RepositoryError>;

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>, RepositoryError>;

    async fn join_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, RepositoryError>;

    async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember, RepositoryError>;

    async fn contribute(&self, order: ContributionOrder) -> Result<ContributionReceipt, RepositoryError>;

    /// Sum of completed contributions recorded for the group (positive)
    async fn group_contribution_total(&self, group_id: Uuid) -> Result<Decimal, RepositoryError>;
}

// =========================================================================
// Shared rules
// =========================================================================

pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::NotFound(format!("{} {} not found", what, id))
}

pub(crate) fn check_funds(wallet: &Wallet, amount: Decimal) -> Result<(), RepositoryError> {
    if !wallet.can_cover(amount) {
        return Err(RepositoryError::InsufficientFunds {
            available: wallet.balance,
            required: amount,
        });
    }
    Ok(())
}

pub(crate) fn check_positive(amount: Decimal) -> Result<(), RepositoryError> {
    if amount <= Decimal::ZERO {
        return Err(RepositoryError::InvalidInput(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if !is_whole_cents(amount) {
        return Err(RepositoryError::InvalidInput(
            "Amount cannot have more than two decimal places".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_transition(
    tx: &Transaction,
    next: TransactionStatus,
) -> Result<(), RepositoryError> {
    if !tx.status_enum().can_transition_to(next) {
        return Err(RepositoryError::InvalidTransition {
            reference: tx.reference.clone(),
            from: tx.status.clone(),
            to: next.as_str().to_string(),
        });
    }
    Ok(())
}

/// Only pending legs may be inserted on their own
pub(crate) fn check_standalone_insert(new: &NewTransaction) -> Result<(), RepositoryError> {
    if new.status != TransactionStatus::Pending {
        return Err(RepositoryError::InvalidInput(
            "Only pending transactions can be recorded without a balance change".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_deposit(tx: &Transaction) -> Result<(), RepositoryError> {
    match tx.type_enum() {
        Some(TransactionType::Deposit) | Some(TransactionType::PaymentLink) => {}
        _ => {
            return Err(RepositoryError::InvalidInput(format!(
                "{} is not a deposit",
                tx.reference
            )))
        }
    }
    if tx.amount <= Decimal::ZERO {
        return Err(RepositoryError::InvalidInput(format!(
            "Deposit {} has a non-positive amount",
            tx.reference
        )));
    }
    Ok(())
}

pub(crate) fn check_withdrawal_reservation(new: &NewTransaction) -> Result<Decimal, RepositoryError> {
    if new.transaction_type != TransactionType::Withdrawal {
        return Err(RepositoryError::InvalidInput("Not a withdrawal".to_string()));
    }
    if new.status != TransactionStatus::Pending {
        return Err(RepositoryError::InvalidInput(
            "Withdrawals start out pending".to_string(),
        ));
    }
    if new.amount >= Decimal::ZERO {
        return Err(RepositoryError::InvalidInput(
            "Withdrawal legs carry a negative amount".to_string(),
        ));
    }
    Ok(-new.amount)
}

pub(crate) fn check_withdrawal(tx: &Transaction) -> Result<(), RepositoryError> {
    if tx.type_enum() != Some(TransactionType::Withdrawal) {
        return Err(RepositoryError::InvalidInput(format!(
            "{} is not a withdrawal",
            tx.reference
        )));
    }
    check_transition(tx, TransactionStatus::Failed)
}

pub(crate) fn check_transfer(transfer: &InternalTransfer) -> Result<(), RepositoryError> {
    check_positive(transfer.amount)?;
    if transfer.from_user_id == transfer.to_user_id {
        return Err(RepositoryError::InvalidInput(
            "Cannot transfer to the same wallet".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_can_invest(
    business: &Business,
    investor_id: Uuid,
    amount: Decimal,
) -> Result<(), RepositoryError> {
    check_positive(amount)?;
    if !business.is_open_for_investment() {
        return Err(RepositoryError::BusinessRule(format!(
            "Business {} is not open for investment (status: {})",
            business.id, business.status
        )));
    }
    if business.owner_id == investor_id {
        return Err(RepositoryError::BusinessRule(
            "Owners cannot invest in their own business".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_owner(business: &Business, user_id: Uuid) -> Result<(), RepositoryError> {
    if business.owner_id != user_id {
        return Err(RepositoryError::Forbidden(
            "Only the business owner can do this".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_can_activate(business: &Business, owner_id: Uuid) -> Result<(), RepositoryError> {
    check_owner(business, owner_id)?;
    if business.status_enum() != BusinessStatus::Draft {
        return Err(RepositoryError::BusinessRule(format!(
            "Only draft businesses can be activated (status: {})",
            business.status
        )));
    }
    Ok(())
}

/// Split a repayment across `active` (ordered oldest first)
pub(crate) fn allocate_repayment(
    amount: Decimal,
    active: &[Investment],
) -> Result<Vec<Decimal>, RepositoryError> {
    let claims: Vec<Claim> = active
        .iter()
        .map(|inv| Claim {
            weight: inv.amount,
            cap: inv.outstanding(),
        })
        .collect();

    distribution::allocate(amount, &claims).map_err(|e| match e {
        AllocationError::NoRecipients => RepositoryError::BusinessRule(
            "Business has no active investments to repay".to_string(),
        ),
        other => RepositoryError::InvalidInput(other.to_string()),
    })
}

pub(crate) fn check_can_contribute(
    group: &SavingsGroup,
    member: Option<&GroupMember>,
    amount: Option<Decimal>,
) -> Result<Decimal, RepositoryError> {
    if !group.is_active {
        return Err(RepositoryError::BusinessRule(format!(
            "Savings group {} is not active",
            group.id
        )));
    }
    match member {
        Some(m) if m.is_active => {}
        _ => {
            return Err(RepositoryError::Forbidden(
                "Only active members can contribute".to_string(),
            ))
        }
    }
    let amount = amount.unwrap_or(group.contribution_amount);
    check_positive(amount)?;
    Ok(amount)
}

pub(crate) fn check_can_join(
    group: &SavingsGroup,
    member: Option<&GroupMember>,
) -> Result<(), RepositoryError> {
    if !group.is_active {
        return Err(RepositoryError::BusinessRule(format!(
            "Savings group {} is not active",
            group.id
        )));
    }
    if member.map(|m| m.is_active).unwrap_or(false) {
        return Err(RepositoryError::InvalidInput(
            "Already an active member of this group".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_can_leave(
    group: &SavingsGroup,
    user_id: Uuid,
    member: Option<&GroupMember>,
) -> Result<(), RepositoryError> {
    if group.is_creator(user_id) {
        return Err(RepositoryError::Forbidden(
            "The group creator cannot leave the group".to_string(),
        ));
    }
    match member {
        Some(m) if m.is_active => Ok(()),
        _ => Err(not_found("Active membership in group", group.id)),
    }
}

// =========================================================================
// Leg construction
// =========================================================================

pub(crate) fn refund_leg(withdrawal: &Transaction, reason: &str) -> NewTransaction {
    NewTransaction::completed(
        reference::refund_of(&withdrawal.reference),
        withdrawal.user_id,
        TransactionType::Refund,
        -withdrawal.amount,
    )
    .with_description(format!("Refund for failed withdrawal {}", withdrawal.reference))
    .with_metadata(json!({
        "original_reference": withdrawal.reference,
        "reason": reason,
    }))
}

pub(crate) fn transfer_legs(transfer: &InternalTransfer) -> (NewTransaction, NewTransaction) {
    let description = transfer
        .description
        .clone()
        .unwrap_or_else(|| "Wallet transfer".to_string());

    let outgoing = NewTransaction::completed(
        reference::with_suffix(&transfer.reference, reference::OUT_SUFFIX),
        transfer.from_user_id,
        TransactionType::Transfer,
        -transfer.amount,
    )
    .with_description(description.clone())
    .with_metadata(json!({
        "direction": "out",
        "counterparty_id": transfer.to_user_id,
        "transfer_reference": transfer.reference,
    }));

    let incoming = NewTransaction::completed(
        reference::with_suffix(&transfer.reference, reference::IN_SUFFIX),
        transfer.to_user_id,
        TransactionType::Transfer,
        transfer.amount,
    )
    .with_description(description)
    .with_metadata(json!({
        "direction": "in",
        "counterparty_id": transfer.from_user_id,
        "transfer_reference": transfer.reference,
    }));

    (outgoing, incoming)
}

pub(crate) fn investment_legs(
    order: &InvestmentOrder,
    business: &Business,
    investment: &Investment,
) -> (NewTransaction, NewTransaction) {
    let investor_leg = NewTransaction::completed(
        order.reference.clone(),
        order.investor_id,
        TransactionType::Investment,
        -order.amount,
    )
    .with_description(format!("Investment in {}", business.name))
    .with_metadata(json!({
        "business_id": business.id,
        "investment_id": investment.id,
    }));

    let owner_leg = NewTransaction::completed(
        reference::with_suffix(&order.reference, reference::RECEIVED_SUFFIX),
        business.owner_id,
        TransactionType::Investment,
        order.amount,
    )
    .with_description(format!("Investment received for {}", business.name))
    .with_metadata(json!({
        "business_id": business.id,
        "investment_id": investment.id,
        "investor_id": order.investor_id,
    }));

    (investor_leg, owner_leg)
}

pub(crate) fn repayment_owner_leg(order: &RepaymentOrder, business: &Business, investor_count: usize) -> NewTransaction {
    NewTransaction::completed(
        order.reference.clone(),
        order.owner_id,
        TransactionType::Return,
        -order.amount,
    )
    .with_description(format!("Repayment to investors of {}", business.name))
    .with_metadata(json!({
        "business_id": business.id,
        "investor_count": investor_count,
    }))
}

pub(crate) fn return_leg(
    order: &RepaymentOrder,
    business: &Business,
    investment: &Investment,
    share: Decimal,
) -> NewTransaction {
    NewTransaction::completed(
        reference::generate(reference::OpCode::Return),
        investment.investor_id,
        TransactionType::Return,
        share,
    )
    .with_description(format!("Return from {}", business.name))
    .with_metadata(json!({
        "business_id": business.id,
        "investment_id": investment.id,
        "repayment_reference": order.reference,
    }))
}

pub(crate) fn contribution_leg(order: &ContributionOrder, group: &SavingsGroup, amount: Decimal) -> NewTransaction {
    NewTransaction::completed(
        order.reference.clone(),
        order.user_id,
        TransactionType::GroupContribution,
        -amount,
    )
    .with_description(format!("Contribution to {}", group.name))
    .with_metadata(json!({ "group_id": group.id }))
}

pub(crate) fn virtual_account_leg(
    wallet: &Wallet,
    amount: Decimal,
    reference: &str,
    metadata: Value,
) -> NewTransaction {
    NewTransaction::completed(
        reference,
        wallet.user_id,
        TransactionType::VirtualAccountDeposit,
        amount,
    )
    .with_description("Virtual account deposit")
    .with_metadata(metadata)
}

/// Group a contribution leg was tagged with
pub(crate) fn group_id_of(tx: &Transaction) -> Option<Uuid> {
    tx.metadata_str("group_id").and_then(|s| Uuid::parse_str(s).ok())
}
