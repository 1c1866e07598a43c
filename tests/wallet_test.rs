mod helpers;

use helpers::*;
use moneyflow_ledger::gateway::webhook;
use moneyflow_ledger::gateway::{GatewayCall, GatewayTransactionStatus, TransferOutcome};
use moneyflow_ledger::models::*;
use moneyflow_ledger::notify::LedgerEvent;
use moneyflow_ledger::services::DepositOutcome;
use moneyflow_ledger::AppError;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_deposit_then_failed_withdrawal_scenario() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    assert_eq!(ledger.balance(user).await, dec("0"));

    let initiation = ledger
        .wallets
        .initiate_deposit(user, dec("1000"), &TestLedger::payer())
        .await
        .unwrap();
    assert!(initiation.reference.starts_with("MF-DEP-"));
    assert!(initiation.checkout_url.contains(&initiation.reference));
    // Nothing is credited until verification
    assert_eq!(ledger.balance(user).await, dec("0"));

    let outcome = ledger.wallets.verify_deposit(&initiation.reference).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(ledger.balance(user).await, dec("1000"));

    ledger
        .gateway
        .set_transfer_outcome(TransferOutcome::Reject("Beneficiary bank offline".to_string()));
    let err = ledger
        .wallets
        .withdraw_to_bank(user, dec("500"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await
        .unwrap_err();

    let reference = match err {
        AppError::WithdrawalFailed { reference, reversed } => {
            assert!(reversed);
            reference
        }
        other => panic!("expected WithdrawalFailed, got {:?}", other),
    };
    assert_eq!(ledger.balance(user).await, dec("1000"));

    let history = ledger.history(user).await;
    assert_eq!(history.len(), 3);

    let deposits: Vec<_> = history
        .iter()
        .filter(|t| t.type_enum() == Some(TransactionType::Deposit))
        .collect();
    assert_eq!(deposits.len(), 1);
    assert!(deposits[0].is_completed());
    assert_eq!(deposits[0].amount, dec("1000"));

    let withdrawal = history.iter().find(|t| t.reference == reference).unwrap();
    assert!(withdrawal.is_failed());
    assert_eq!(withdrawal.amount, dec("-500"));

    let refunds: Vec<_> = history
        .iter()
        .filter(|t| t.type_enum() == Some(TransactionType::Refund))
        .collect();
    assert_eq!(refunds.len(), 1);
    assert!(refunds[0].is_completed());
    assert_eq!(refunds[0].amount, dec("500"));
    assert_eq!(refunds[0].reference, format!("{}-REFUND", reference));
    assert_eq!(refunds[0].metadata_str("original_reference"), Some(reference.as_str()));
}

#[tokio::test]
async fn test_verify_deposit_is_idempotent() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let deposit = ledger.fund(user, dec("250")).await;

    let again = ledger.wallets.verify_deposit(&deposit.reference).await.unwrap();
    match again {
        DepositOutcome::Completed {
            newly_completed,
            wallet,
            ..
        } => {
            assert!(!newly_completed);
            assert_eq!(wallet.balance, dec("250"));
        }
        other => panic!("expected completed, got {:?}", other),
    }
    assert_eq!(ledger.balance(user).await, dec("250"));

    // The second call never went back to the gateway
    let verifies = ledger
        .gateway
        .calls()
        .into_iter()
        .filter(|c| matches!(c, GatewayCall::Verify(_)))
        .count();
    assert_eq!(verifies, 1);
    assert_eq!(ledger.notifier.names(), vec!["deposit_completed"]);
}

#[tokio::test]
async fn test_racing_verifications_credit_once() {
    let ledger = Arc::new(TestLedger::new());
    let user = Uuid::new_v4();
    let initiation = ledger
        .wallets
        .initiate_deposit(user, dec("400"), &TestLedger::payer())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        let reference = initiation.reference.clone();
        handles.push(tokio::spawn(async move {
            ledger.wallets.verify_deposit(&reference).await.unwrap()
        }));
    }

    let mut newly = 0;
    for handle in handles {
        if let DepositOutcome::Completed { newly_completed: true, .. } = handle.await.unwrap() {
            newly += 1;
        }
    }
    assert_eq!(newly, 1);
    assert_eq!(ledger.balance(user).await, dec("400"));
}

#[tokio::test]
async fn test_deposit_below_minimum_rejected() {
    let ledger = TestLedger::new();
    let err = ledger
        .wallets
        .initiate_deposit(Uuid::new_v4(), dec("99.99"), &TestLedger::payer())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(ledger.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_abandoned_deposit_is_marked_failed() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let initiation = ledger
        .wallets
        .initiate_deposit(user, dec("500"), &TestLedger::payer())
        .await
        .unwrap();
    ledger
        .gateway
        .set_verify_status(&initiation.reference, GatewayTransactionStatus::Abandoned);

    let outcome = ledger.wallets.verify_deposit(&initiation.reference).await.unwrap();
    match &outcome {
        DepositOutcome::Failed { transaction, reason } => {
            assert!(transaction.is_failed());
            assert_eq!(reason, "abandoned");
        }
        other => panic!("expected failed, got {:?}", other),
    }
    assert_eq!(ledger.balance(user).await, dec("0"));

    // A failed deposit stays failed
    let again = ledger.wallets.verify_deposit(&initiation.reference).await.unwrap();
    assert!(matches!(again, DepositOutcome::Failed { .. }));
}

#[tokio::test]
async fn test_amount_mismatch_fails_deposit() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let initiation = ledger
        .wallets
        .initiate_deposit(user, dec("500"), &TestLedger::payer())
        .await
        .unwrap();
    ledger.gateway.set_verify_amount(&initiation.reference, dec("50"));

    let outcome = ledger.wallets.verify_deposit(&initiation.reference).await.unwrap();
    assert!(matches!(outcome, DepositOutcome::Failed { ref reason, .. } if reason == "amount_mismatch"));
    assert_eq!(ledger.balance(user).await, dec("0"));
}

#[tokio::test]
async fn test_pending_and_unreachable_gateway_leave_deposit_pending() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let initiation = ledger
        .wallets
        .initiate_deposit(user, dec("300"), &TestLedger::payer())
        .await
        .unwrap();

    ledger
        .gateway
        .set_verify_status(&initiation.reference, GatewayTransactionStatus::Pending);
    let outcome = ledger.wallets.verify_deposit(&initiation.reference).await.unwrap();
    assert!(matches!(outcome, DepositOutcome::Pending { .. }));

    ledger.gateway.set_verify_unavailable(&initiation.reference);
    let err = ledger.wallets.verify_deposit(&initiation.reference).await.unwrap_err();
    assert!(matches!(err, AppError::ExternalGateway(_)));
    assert!(err.is_retryable());

    let stored = ledger.history(user).await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_pending());
    assert_eq!(ledger.balance(user).await, dec("0"));
}

#[tokio::test]
async fn test_verify_unknown_reference_not_found() {
    let ledger = TestLedger::new();
    let err = ledger.wallets.verify_deposit("MF-DEP-0-00000").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_successful_withdrawal() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    ledger.fund(user, dec("1000")).await;
    ledger.gateway.register_account(BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME);

    let receipt = ledger
        .wallets
        .withdraw_to_bank(user, dec("400"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await
        .unwrap();

    assert!(receipt.transaction.is_completed());
    assert_eq!(receipt.transaction.amount, dec("-400"));
    assert_eq!(receipt.wallet.balance, dec("600"));
    assert_eq!(ledger.balance(user).await, dec("600"));
    assert_eq!(
        receipt.gateway_reference,
        Some(format!("SIM-NIP-{}", receipt.transaction.reference))
    );
    assert_eq!(receipt.transaction.metadata_str("account_name"), Some(ACCOUNT_NAME));

    // The payout went out under the merchant-prefixed reference
    assert!(ledger
        .gateway
        .calls()
        .contains(&GatewayCall::Transfer(format!("MFSIM_{}", receipt.transaction.reference))));
}

#[tokio::test]
async fn test_withdrawal_timeout_is_reversed() {
    let ledger = TestLedger::with_gateway_timeout(Duration::from_millis(50));
    let user = Uuid::new_v4();
    ledger.fund(user, dec("800")).await;
    ledger
        .gateway
        .set_transfer_outcome(TransferOutcome::Delay(Duration::from_millis(500)));

    let err = ledger
        .wallets
        .withdraw_to_bank(user, dec("300"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WithdrawalFailed { reversed: true, .. }));
    assert_eq!(ledger.balance(user).await, dec("800"));

    let withdrawal = ledger
        .history(user)
        .await
        .into_iter()
        .find(|t| t.type_enum() == Some(TransactionType::Withdrawal))
        .unwrap();
    assert_eq!(withdrawal.metadata_str("failure_reason"), Some("gateway_timeout"));
    assert!(ledger.notifier.names().contains(&"withdrawal_reversed"));
}

#[tokio::test]
async fn test_unreversible_withdrawal_reports_not_reversed() {
    let ledger = TestLedger::with_gateway_timeout(Duration::from_millis(150));
    let user = Uuid::new_v4();
    ledger.fund(user, dec("800")).await;
    ledger
        .gateway
        .set_transfer_outcome(TransferOutcome::Delay(Duration::from_secs(2)));

    let wallets = ledger.wallets.clone();
    let withdraw = tokio::spawn(async move {
        wallets
            .withdraw_to_bank(user, dec("300"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
            .await
    });

    // Store goes down after the reservation, before the payout times out
    tokio::time::sleep(Duration::from_millis(50)).await;
    ledger.store.set_unavailable(true);
    let result = withdraw.await.unwrap();
    ledger.store.set_unavailable(false);

    assert!(matches!(result, Err(AppError::WithdrawalFailed { reversed: false, .. })));
    // The reservation stands for manual reconciliation
    assert_eq!(ledger.balance(user).await, dec("500"));
    let withdrawal = ledger
        .history(user)
        .await
        .into_iter()
        .find(|t| t.type_enum() == Some(TransactionType::Withdrawal))
        .unwrap();
    assert!(withdrawal.is_pending());
    assert!(!ledger.notifier.names().contains(&"withdrawal_reversed"));
}

#[tokio::test]
async fn test_withdrawal_with_store_down_reserves_nothing() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    ledger.fund(user, dec("800")).await;

    ledger.store.set_unavailable(true);
    let err = ledger
        .wallets
        .withdraw_to_bank(user, dec("300"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await
        .unwrap_err();
    assert!(err.is_connection_error());
    ledger.store.set_unavailable(false);

    assert_eq!(ledger.gateway.transfer_count(), 0);
    assert_eq!(ledger.balance(user).await, dec("800"));
}

#[tokio::test]
async fn test_withdrawal_insufficient_funds_touches_nothing() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    ledger.fund(user, dec("200")).await;

    let err = ledger
        .wallets
        .withdraw_to_bank(user, dec("500"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFunds { .. }));
    assert_eq!(err.status_code(), 422);
    assert_eq!(ledger.gateway.transfer_count(), 0);
    assert_eq!(ledger.history(user).await.len(), 1);
}

#[tokio::test]
async fn test_withdrawal_with_malformed_account_fails_fast() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    ledger.fund(user, dec("500")).await;
    let calls_before = ledger.gateway.calls().len();

    let err = ledger
        .wallets
        .withdraw_to_bank(user, dec("200"), "58", ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = ledger
        .wallets
        .withdraw_to_bank(user, dec("200"), BANK_CODE, "12345", ACCOUNT_NAME)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert_eq!(ledger.gateway.calls().len(), calls_before);
    assert_eq!(ledger.history(user).await.len(), 1);
    assert_eq!(ledger.balance(user).await, dec("500"));
}

#[tokio::test]
async fn test_transfer_moves_funds_with_paired_legs() {
    let ledger = TestLedger::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(alice, dec("1000")).await;

    let receipt = ledger
        .wallets
        .transfer_funds(alice, bob, dec("250.50"), Some("Lunch".to_string()))
        .await
        .unwrap();

    assert_eq!(ledger.balance(alice).await, dec("749.50"));
    assert_eq!(ledger.balance(bob).await, dec("250.50"));
    assert_eq!(receipt.sender_wallet.balance, dec("749.50"));

    assert!(receipt.outgoing.reference.ends_with("-OUT"));
    assert!(receipt.incoming.reference.ends_with("-IN"));
    let base = receipt.outgoing.reference.trim_end_matches("-OUT");
    assert_eq!(receipt.incoming.reference.trim_end_matches("-IN"), base);
    assert_eq!(receipt.outgoing.amount, dec("-250.50"));
    assert_eq!(receipt.incoming.amount, dec("250.50"));
    assert_eq!(receipt.incoming.description.as_deref(), Some("Lunch"));
}

#[tokio::test]
async fn test_transfer_rejections() {
    let ledger = TestLedger::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(alice, dec("100")).await;

    let below_min = ledger.wallets.transfer_funds(alice, bob, dec("5"), None).await;
    assert!(matches!(below_min, Err(AppError::Validation(_))));

    let to_self = ledger.wallets.transfer_funds(alice, alice, dec("50"), None).await;
    assert!(matches!(to_self, Err(AppError::Validation(_))));

    let too_much = ledger.wallets.transfer_funds(alice, bob, dec("100.01"), None).await;
    assert!(matches!(too_much, Err(AppError::InsufficientFunds { .. })));

    assert_eq!(ledger.balance(alice).await, dec("100"));
    assert_eq!(ledger.balance(bob).await, dec("0"));
}

#[tokio::test]
async fn test_sub_cent_amounts_are_rejected() {
    let ledger = TestLedger::new();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(alice, dec("100")).await;
    let calls_before = ledger.gateway.calls().len();

    let transfer = ledger.wallets.transfer_funds(alice, bob, dec("10.005"), None).await;
    assert!(matches!(transfer, Err(AppError::Validation(_))));

    let deposit = ledger
        .wallets
        .initiate_deposit(alice, dec("100.005"), &TestLedger::payer())
        .await;
    assert!(matches!(deposit, Err(AppError::Validation(_))));

    let withdrawal = ledger
        .wallets
        .withdraw_to_bank(alice, dec("50.001"), BANK_CODE, ACCOUNT_NUMBER, ACCOUNT_NAME)
        .await;
    assert!(matches!(withdrawal, Err(AppError::Validation(_))));

    let link = ledger.wallets.create_payment_link(alice, dec("200.999"), None).await;
    assert!(matches!(link, Err(AppError::Validation(_))));

    // Nothing reached the gateway or the ledger
    assert_eq!(ledger.gateway.calls().len(), calls_before);
    assert_eq!(ledger.balance(alice).await, dec("100"));
    assert_eq!(ledger.balance(bob).await, dec("0"));
    assert_eq!(ledger.history(alice).await.len(), 1);

    // Trailing zeros are still whole cents
    ledger.wallets.transfer_funds(alice, bob, dec("10.500"), None).await.unwrap();
    assert_eq!(ledger.balance(alice).await, dec("89.50"));
    assert_eq!(ledger.balance(bob).await, dec("10.50"));
}

#[tokio::test]
async fn test_sub_cent_virtual_account_credit_is_rejected() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let account = VirtualAccount {
        account_number: "7834927714".to_string(),
        account_name: "MoneyFlow/Ada Obi".to_string(),
        bank_name: "GTBank".to_string(),
    };
    ledger.wallets.bind_virtual_account(user, account).await.unwrap();

    let body = br#"{
        "transaction_reference": "REF2024061500009",
        "virtual_account_number": "7834927714",
        "principal_amount": "5000.005",
        "transaction_indicator": "C"
    }"#;
    let payload = webhook::parse_virtual_account(body).unwrap();
    let err = ledger.wallets.handle_virtual_account_webhook(&payload).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(ledger.balance(user).await, dec("0"));
}

#[tokio::test]
async fn test_concurrent_transfers_conserve_total() {
    let ledger = Arc::new(TestLedger::new());
    let users: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    for user in &users {
        ledger.fund(*user, dec("500")).await;
    }
    let total_before = ledger.store.total_balance().await;

    let mut handles = Vec::new();
    for i in 0..40 {
        let ledger = ledger.clone();
        let from = users[i % users.len()];
        let to = users[(i * 3 + 1) % users.len()];
        handles.push(tokio::spawn(async move {
            // Some of these overdraw or target self; they must fail cleanly
            let _ = ledger.wallets.transfer_funds(from, to, dec("75"), None).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(ledger.store.total_balance().await, total_before);
    for user in &users {
        assert!(ledger.balance(*user).await >= dec("0"));
    }
}

#[tokio::test]
async fn test_payment_link_completes_through_verification() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();

    let link = ledger
        .wallets
        .create_payment_link(user, dec("150"), Some("Dues".to_string()))
        .await
        .unwrap();
    assert!(link.reference.starts_with("MF-LNK-"));
    assert_eq!(link.hash, link.reference);
    assert!(link.payment_url.ends_with(&link.hash));

    let pending = ledger.history(user).await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].type_enum(), Some(TransactionType::PaymentLink));
    assert!(pending[0].is_pending());
    assert_eq!(pending[0].metadata_str("hash"), Some(link.hash.as_str()));

    let outcome = ledger.wallets.verify_deposit(&link.reference).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(ledger.balance(user).await, dec("150"));
}

#[tokio::test]
async fn test_charge_webhook_completes_deposit() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let initiation = ledger
        .wallets
        .initiate_deposit(user, dec("700"), &TestLedger::payer())
        .await
        .unwrap();

    let body = format!(
        r#"{{"Event":"charge_successful","TransactionRef":"MFSIM_{}","Body":{{}}}}"#,
        initiation.reference
    );
    let signature = webhook::sign("whsec", body.as_bytes()).unwrap();
    assert!(webhook::verify_signature("whsec", body.as_bytes(), &signature));

    let payload = webhook::parse_charge(body.as_bytes()).unwrap();
    let outcome = ledger.wallets.handle_charge_webhook(&payload).await.unwrap().unwrap();
    assert!(outcome.is_completed());
    // Redelivery is harmless
    ledger.wallets.handle_charge_webhook(&payload).await.unwrap();
    assert_eq!(ledger.balance(user).await, dec("700"));
}

#[tokio::test]
async fn test_virtual_account_credit_is_idempotent() {
    let ledger = TestLedger::new();
    let user = Uuid::new_v4();
    let account = VirtualAccount {
        account_number: "7834927713".to_string(),
        account_name: "MoneyFlow/Ada Obi".to_string(),
        bank_name: "GTBank".to_string(),
    };
    let wallet = ledger.wallets.bind_virtual_account(user, account.clone()).await.unwrap();
    assert!(wallet.has_virtual_account());

    let other = VirtualAccount {
        account_number: "1111111111".to_string(),
        ..account.clone()
    };
    let err = ledger.wallets.bind_virtual_account(user, other).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let body = br#"{
        "transaction_reference": "REF2024061500001",
        "virtual_account_number": "7834927713",
        "principal_amount": "5000.00",
        "transaction_indicator": "C"
    }"#;
    let payload = webhook::parse_virtual_account(body).unwrap();

    let first = ledger
        .wallets
        .handle_virtual_account_webhook(&payload)
        .await
        .unwrap()
        .unwrap();
    assert!(first.newly_completed);
    assert_eq!(first.transaction.reference, "MF-VAD-REF2024061500001");
    assert_eq!(
        first.transaction.type_enum(),
        Some(TransactionType::VirtualAccountDeposit)
    );

    let second = ledger
        .wallets
        .handle_virtual_account_webhook(&payload)
        .await
        .unwrap()
        .unwrap();
    assert!(!second.newly_completed);
    assert_eq!(ledger.balance(user).await, dec("5000"));

    let debit = br#"{"transaction_reference":"REF2","virtual_account_number":"7834927713","principal_amount":10,"transaction_indicator":"D"}"#;
    let payload = webhook::parse_virtual_account(debit).unwrap();
    assert!(ledger
        .wallets
        .handle_virtual_account_webhook(&payload)
        .await
        .unwrap()
        .is_none());

    let unknown = br#"{"transaction_reference":"REF3","virtual_account_number":"0000000000","principal_amount":10}"#;
    let payload = webhook::parse_virtual_account(unknown).unwrap();
    let err = ledger.wallets.handle_virtual_account_webhook(&payload).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_notification_failure_never_rolls_back() {
    let ledger = TestLedger::new();
    ledger.notifier.fail_deliveries();
    let user = Uuid::new_v4();

    ledger.fund(user, dec("300")).await;
    assert_eq!(ledger.balance(user).await, dec("300"));
    assert_eq!(
        ledger.notifier.events(),
        vec![LedgerEvent::DepositCompleted {
            user_id: user,
            reference: ledger.history(user).await[0].reference.clone(),
            amount: dec("300"),
        }]
    );
}
