//! Wallet service: deposits, withdrawals, transfers, payment links and
//! virtual-account credits.
//!
//! Balance changes only ever happen inside a single [`LedgerStore`] unit
//! together with the legs that explain them. Gateway calls run outside those
//! units and are bounded by the configured gateway timeout.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{GatewayConfig, LedgerLimits};
use crate::error::{AppError, AppResult, RepositoryError};
use crate::gateway::webhook::{ChargeWebhook, VirtualAccountWebhook};
use crate::gateway::{
    GatewayError, GatewayResult, GatewayTransactionStatus, InitializeRequest, PaymentGateway,
    PaymentLinkRequest, TransferRequest,
};
use crate::models::{
    NewTransaction, Transaction, TransactionStatus, TransactionType, VirtualAccount, Wallet,
};
use crate::notify::{dispatch, LedgerEvent, LedgerNotifier};
use crate::reference::{self, OpCode};
use crate::repositories::{DepositSettlement, InternalTransfer, LedgerStore, TransferReceipt};
use crate::services::bank_verification::BankVerifier;
use crate::services::check_amount;

/// Who is paying in a checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payer {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositInitiation {
    pub reference: String,
    pub checkout_url: String,
}

/// Result of asking the gateway about a deposit
#[derive(Debug, Clone)]
pub enum DepositOutcome {
    /// Wallet credited, now or by an earlier call
    Completed {
        transaction: Transaction,
        wallet: Wallet,
        newly_completed: bool,
    },
    /// Gateway reported a non-success outcome; no balance change
    Failed { transaction: Transaction, reason: String },
    /// Gateway has no final answer yet
    Pending { transaction: Transaction },
}

impl DepositOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            DepositOutcome::Completed { transaction, .. }
            | DepositOutcome::Failed { transaction, .. }
            | DepositOutcome::Pending { transaction } => transaction,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DepositOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    pub transaction: Transaction,
    pub wallet: Wallet,
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    pub reference: String,
    pub hash: String,
    pub payment_url: String,
}

/// Orchestrates every wallet-level money movement
pub struct WalletService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn LedgerNotifier>,
    bank_verifier: BankVerifier,
    limits: LedgerLimits,
    merchant_id: String,
    callback_url: String,
    gateway_timeout: Duration,
}

impl WalletService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn LedgerNotifier>,
        limits: LedgerLimits,
        gateway_config: &GatewayConfig,
    ) -> Self {
        let gateway_timeout = gateway_config.timeout();
        Self {
            bank_verifier: BankVerifier::new(gateway.clone(), gateway_timeout),
            store,
            gateway,
            notifier,
            limits,
            merchant_id: gateway_config.merchant_id.clone(),
            callback_url: gateway_config.callback_url.clone(),
            gateway_timeout,
        }
    }

    /// Override the gateway timeout
    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self.bank_verifier = BankVerifier::new(self.gateway.clone(), timeout);
        self
    }

    async fn bounded<T>(&self, call: impl Future<Output = GatewayResult<T>>) -> GatewayResult<T> {
        tokio::time::timeout(self.gateway_timeout, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout))
    }

    fn check_minimum(amount: Decimal, minimum: Decimal, what: &str) -> AppResult<()> {
        check_amount(amount, what)?;
        if amount < minimum {
            return Err(AppError::Validation(format!(
                "Minimum {} amount is {}",
                what, minimum
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_or_create_wallet(&self, user_id: Uuid) -> AppResult<Wallet> {
        Ok(self.store.get_or_create_wallet(user_id).await?)
    }

    pub async fn wallet_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        Ok(self.store.get_or_create_wallet(user_id).await?.balance)
    }

    /// Newest first
    pub async fn transaction_history(&self, user_id: Uuid, limit: Option<i64>) -> AppResult<Vec<Transaction>> {
        Ok(self.store.list_transactions(user_id, limit).await?)
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Open a checkout and record the pending deposit; the balance is untouched
    pub async fn initiate_deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        payer: &Payer,
    ) -> AppResult<DepositInitiation> {
        Self::check_minimum(amount, self.limits.min_deposit, "deposit")?;
        self.store.get_or_create_wallet(user_id).await?;

        let reference = reference::generate(OpCode::Deposit);
        let request = InitializeRequest {
            amount,
            email: payer.email.clone(),
            reference: reference.clone(),
            customer_name: payer.name.clone(),
            metadata: json!({ "user_id": user_id }),
        };

        let checkout = self.bounded(self.gateway.initialize_transaction(request)).await.map_err(|e| {
            warn!("Deposit initialization failed for {}: {}", reference, e);
            AppError::from(e)
        })?;

        let pending = NewTransaction::pending(reference.clone(), user_id, TransactionType::Deposit, amount)
            .with_description("Wallet deposit")
            .with_metadata(json!({
                "checkout_url": checkout.checkout_url,
                "payer_email": payer.email,
            }));
        self.store.insert_transaction(pending).await?;

        info!("Deposit {} of {} initiated for user {}", reference, amount, user_id);
        Ok(DepositInitiation {
            reference,
            checkout_url: checkout.checkout_url,
        })
    }

    /// Settle a deposit against the gateway's authoritative status.
    ///
    /// Safe to call any number of times; a completed deposit is reported
    /// again without crediting twice.
    pub async fn verify_deposit(&self, reference: &str) -> AppResult<DepositOutcome> {
        let transaction = self
            .store
            .find_transaction(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", reference)))?;

        match transaction.type_enum() {
            Some(TransactionType::Deposit) | Some(TransactionType::PaymentLink) => {}
            _ => {
                return Err(AppError::Validation(format!(
                    "{} is not a deposit",
                    reference
                )))
            }
        }

        if transaction.is_completed() {
            let wallet = self.store.get_or_create_wallet(transaction.user_id).await?;
            return Ok(DepositOutcome::Completed {
                transaction,
                wallet,
                newly_completed: false,
            });
        }
        if transaction.is_failed() {
            let reason = transaction
                .metadata_str("failure_reason")
                .unwrap_or("failed")
                .to_string();
            return Ok(DepositOutcome::Failed { transaction, reason });
        }

        let verification = match self.bounded(self.gateway.verify_transaction(reference)).await {
            Ok(v) => v,
            Err(GatewayError::Rejected(reason)) => {
                return self.fail_deposit(&transaction, &reason).await;
            }
            Err(e) => {
                warn!("Could not verify deposit {}: {}", reference, e);
                return Err(AppError::from(e));
            }
        };

        match verification.status {
            GatewayTransactionStatus::Success if verification.amount == transaction.amount => {
                let patch = json!({
                    "gateway_status": verification.status.as_str(),
                    "gateway_reference": verification.gateway_reference,
                });
                let settlement = self.store.complete_deposit(reference, patch).await?;
                Ok(self.on_deposit_settled(settlement).await)
            }
            GatewayTransactionStatus::Success => {
                warn!(
                    "Deposit {} amount mismatch: recorded {}, gateway reports {}",
                    reference, transaction.amount, verification.amount
                );
                self.fail_deposit(&transaction, "amount_mismatch").await
            }
            GatewayTransactionStatus::Pending => {
                info!("Deposit {} is still pending at the gateway", reference);
                Ok(DepositOutcome::Pending { transaction })
            }
            other => self.fail_deposit(&transaction, other.as_str()).await,
        }
    }

    async fn on_deposit_settled(&self, settlement: DepositSettlement) -> DepositOutcome {
        let DepositSettlement {
            transaction,
            wallet,
            newly_completed,
        } = settlement;

        if newly_completed {
            info!(
                "Deposit {} completed: credited {} to user {}",
                transaction.reference, transaction.amount, transaction.user_id
            );
            dispatch(
                self.notifier.as_ref(),
                LedgerEvent::DepositCompleted {
                    user_id: transaction.user_id,
                    reference: transaction.reference.clone(),
                    amount: transaction.amount,
                },
            )
            .await;
        }

        DepositOutcome::Completed {
            transaction,
            wallet,
            newly_completed,
        }
    }

    async fn fail_deposit(&self, transaction: &Transaction, reason: &str) -> AppResult<DepositOutcome> {
        let patch = json!({ "failure_reason": reason });
        match self
            .store
            .settle_transaction(&transaction.reference, TransactionStatus::Failed, patch)
            .await
        {
            Ok(failed) => {
                warn!("Deposit {} failed: {}", failed.reference, reason);
                Ok(DepositOutcome::Failed {
                    transaction: failed,
                    reason: reason.to_string(),
                })
            }
            // Another caller settled it first; report whatever it decided
            Err(RepositoryError::InvalidTransition { .. }) | Err(RepositoryError::Conflict(_)) => {
                let current = self
                    .store
                    .find_transaction(&transaction.reference)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Transaction {} not found", transaction.reference))
                    })?;
                if current.is_completed() {
                    let wallet = self.store.get_or_create_wallet(current.user_id).await?;
                    Ok(DepositOutcome::Completed {
                        transaction: current,
                        wallet,
                        newly_completed: false,
                    })
                } else {
                    Ok(DepositOutcome::Failed {
                        transaction: current,
                        reason: reason.to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Entry point for signature-checked charge webhooks
    pub async fn handle_charge_webhook(&self, payload: &ChargeWebhook) -> AppResult<Option<DepositOutcome>> {
        if !payload.is_successful_charge() {
            info!("Ignoring {} webhook for {}", payload.event, payload.transaction_ref);
            return Ok(None);
        }
        let reference = reference::strip_merchant_prefix(&self.merchant_id, &payload.transaction_ref);
        self.verify_deposit(reference).await.map(Some)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Pay out to a bank account.
    ///
    /// The amount is reserved (debited) before the gateway is called. If the
    /// payout fails or times out the reservation is reversed with a refund
    /// leg and the caller gets [`AppError::WithdrawalFailed`].
    pub async fn withdraw_to_bank(
        &self,
        user_id: Uuid,
        amount: Decimal,
        bank_code: &str,
        account_number: &str,
        account_name: &str,
    ) -> AppResult<WithdrawalReceipt> {
        Self::check_minimum(amount, self.limits.min_withdrawal, "withdrawal")?;
        let account = self.bank_verifier.verify(bank_code, account_number).await?;

        let reference = reference::generate(OpCode::Withdrawal);
        let reservation = NewTransaction::pending(reference.clone(), user_id, TransactionType::Withdrawal, -amount)
            .with_description(format!("Withdrawal to {} {}", bank_code, account_number))
            .with_metadata(json!({
                "bank_code": bank_code,
                "account_number": account_number,
                "account_name": account.account_name,
                "requested_account_name": account_name,
            }));
        let (transaction, wallet) = self.store.reserve_withdrawal(reservation).await?;
        info!("Reserved {} for withdrawal {} by user {}", amount, reference, user_id);

        let request = TransferRequest {
            reference: reference::merchant_reference(&self.merchant_id, &reference),
            amount,
            bank_code: bank_code.to_string(),
            account_number: account_number.to_string(),
            account_name: account.account_name.clone(),
            remark: format!("MoneyFlow withdrawal {}", reference),
        };

        match self.bounded(self.gateway.transfer_funds(request)).await {
            Ok(payout) => {
                let patch = json!({
                    "gateway_reference": payout.gateway_reference,
                    "transfer_reference": payout.reference,
                });
                let transaction = match self
                    .store
                    .settle_transaction(&reference, TransactionStatus::Completed, patch)
                    .await
                {
                    Ok(completed) => completed,
                    Err(e) => {
                        // Money has left; the debit stands and the record stays pending
                        error!(
                            "Withdrawal {} paid out but could not be marked completed: {}. Manual reconciliation required",
                            reference, e
                        );
                        transaction
                    }
                };

                info!("Withdrawal {} of {} completed for user {}", reference, amount, user_id);
                dispatch(
                    self.notifier.as_ref(),
                    LedgerEvent::WithdrawalCompleted {
                        user_id,
                        reference: reference.clone(),
                        amount,
                    },
                )
                .await;

                Ok(WithdrawalReceipt {
                    transaction,
                    wallet,
                    gateway_reference: payout.gateway_reference,
                })
            }
            Err(e) => {
                warn!("Payout for withdrawal {} failed: {}", reference, e);
                let reversed = self.reverse_withdrawal(&reference, user_id, amount, &e).await;
                Err(AppError::WithdrawalFailed { reference, reversed })
            }
        }
    }

    /// Credit a failed payout back. Not retried: a reversal that cannot
    /// commit is left for manual reconciliation.
    async fn reverse_withdrawal(&self, reference: &str, user_id: Uuid, amount: Decimal, cause: &GatewayError) -> bool {
        let reason = match cause {
            GatewayError::Timeout => "gateway_timeout".to_string(),
            other => other.to_string(),
        };

        match self.store.reverse_withdrawal(reference, &reason).await {
            Ok(reversal) => {
                info!(
                    "Withdrawal {} reversed with refund {}; balance back to {}",
                    reference, reversal.refund.reference, reversal.wallet.balance
                );
                dispatch(
                    self.notifier.as_ref(),
                    LedgerEvent::WithdrawalReversed {
                        user_id,
                        reference: reference.to_string(),
                        amount,
                    },
                )
                .await;
                true
            }
            Err(e) => {
                error!(
                    "Reversal of withdrawal {} ({} for user {}) failed: {}. Manual reconciliation required",
                    reference, amount, user_id, e
                );
                false
            }
        }
    }

    // =========================================================================
    // Transfers and payment links
    // =========================================================================

    /// Move funds between two wallets in one unit
    pub async fn transfer_funds(
        &self,
        from_user_id: Uuid,
        to_user_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> AppResult<TransferReceipt> {
        Self::check_minimum(amount, self.limits.min_transfer, "transfer")?;
        if from_user_id == to_user_id {
            return Err(AppError::Validation(
                "Cannot transfer to the same wallet".to_string(),
            ));
        }

        let reference = reference::generate(OpCode::Transfer);
        let receipt = self
            .store
            .transfer(InternalTransfer {
                reference: reference.clone(),
                from_user_id,
                to_user_id,
                amount,
                description,
            })
            .await?;

        info!("Transfer {} of {} from {} to {}", reference, amount, from_user_id, to_user_id);
        dispatch(
            self.notifier.as_ref(),
            LedgerEvent::TransferCompleted {
                from_user_id,
                to_user_id,
                reference,
                amount,
            },
        )
        .await;

        Ok(receipt)
    }

    /// Mint a shareable link; paying it completes through [`Self::verify_deposit`]
    pub async fn create_payment_link(
        &self,
        user_id: Uuid,
        amount: Decimal,
        description: Option<String>,
    ) -> AppResult<PaymentLink> {
        Self::check_minimum(amount, self.limits.min_deposit, "payment link")?;
        self.store.get_or_create_wallet(user_id).await?;

        let reference = reference::generate(OpCode::PaymentLink);
        let description = description.unwrap_or_else(|| "MoneyFlow wallet top-up".to_string());
        let request = PaymentLinkRequest {
            name: description.clone(),
            hash: reference.clone(),
            amount,
            description: description.clone(),
            redirect_link: self.callback_url.clone(),
        };

        let link = self.bounded(self.gateway.create_payment_link(request)).await.map_err(|e| {
            warn!("Payment link creation failed for {}: {}", reference, e);
            AppError::from(e)
        })?;

        let pending = NewTransaction::pending(reference.clone(), user_id, TransactionType::PaymentLink, amount)
            .with_description(description)
            .with_metadata(json!({
                "hash": link.hash,
                "payment_url": link.payment_url,
            }));
        self.store.insert_transaction(pending).await?;

        info!("Payment link {} for {} created for user {}", reference, amount, user_id);
        Ok(PaymentLink {
            reference,
            hash: link.hash,
            payment_url: link.payment_url,
        })
    }

    // =========================================================================
    // Virtual accounts
    // =========================================================================

    pub async fn bind_virtual_account(&self, user_id: Uuid, account: VirtualAccount) -> AppResult<Wallet> {
        if account.account_number.trim().is_empty() || account.bank_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Virtual account number and bank name are required".to_string(),
            ));
        }
        let wallet = self.store.bind_virtual_account(user_id, account).await?;
        info!("Virtual account bound to wallet of user {}", user_id);
        Ok(wallet)
    }

    /// Credit a signature-checked virtual-account webhook.
    ///
    /// Returns `None` for debit notifications. Redelivery of the same
    /// gateway reference credits only once.
    pub async fn handle_virtual_account_webhook(
        &self,
        payload: &VirtualAccountWebhook,
    ) -> AppResult<Option<DepositSettlement>> {
        if !payload.is_credit() {
            info!(
                "Ignoring non-credit virtual account notification {}",
                payload.transaction_reference
            );
            return Ok(None);
        }
        check_amount(payload.principal_amount, "virtual account credit")?;

        let reference = reference::virtual_account_deposit(&payload.transaction_reference);
        let metadata = json!({
            "gateway_reference": payload.transaction_reference,
            "virtual_account_number": payload.virtual_account_number,
            "customer_identifier": payload.customer_identifier,
            "remarks": payload.remarks,
        });

        let settlement = self
            .store
            .credit_virtual_account(
                &payload.virtual_account_number,
                payload.principal_amount,
                &reference,
                metadata,
            )
            .await?;

        if settlement.newly_completed {
            info!(
                "Virtual account deposit {} credited {} to user {}",
                reference, payload.principal_amount, settlement.wallet.user_id
            );
            dispatch(
                self.notifier.as_ref(),
                LedgerEvent::VirtualAccountCredited {
                    user_id: settlement.wallet.user_id,
                    reference,
                    amount: payload.principal_amount,
                },
            )
            .await;
        } else {
            info!("Virtual account deposit {} already credited", reference);
        }

        Ok(Some(settlement))
    }
}
