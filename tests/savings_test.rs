mod helpers;

use helpers::*;
use moneyflow_ledger::models::*;
use moneyflow_ledger::AppError;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

#[tokio::test]
async fn test_group_membership_lifecycle() {
    let ledger = TestLedger::new();
    let (creator, member) = (Uuid::new_v4(), Uuid::new_v4());

    let (group, founder) = ledger
        .savings
        .create_group(creator, "Hostel Ajo".to_string(), dec("250"))
        .await
        .unwrap();
    assert!(group.is_active);
    assert_eq!(group.current_total, dec("0"));
    assert_eq!(founder.user_id, creator);
    assert!(founder.is_active);

    let joined = assert_ok!(ledger.savings.join_group(group.id, member).await);
    assert!(joined.is_active);
    assert_eq!(ledger.savings.group_members(group.id).await.unwrap().len(), 2);

    let again = assert_err!(ledger.savings.join_group(group.id, member).await);
    assert!(matches!(again, AppError::Validation(_)));

    let left = assert_ok!(ledger.savings.leave_group(group.id, member).await);
    assert!(!left.is_active);

    let twice = assert_err!(ledger.savings.leave_group(group.id, member).await);
    assert!(twice.is_not_found());

    let creator_leaves = assert_err!(ledger.savings.leave_group(group.id, creator).await);
    assert_eq!(creator_leaves.status_code(), 403);

    // Re-joining reactivates the same membership
    let back = assert_ok!(ledger.savings.join_group(group.id, member).await);
    assert!(back.is_active);
    assert_eq!(ledger.savings.group_members(group.id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_group_validation() {
    let ledger = TestLedger::new();
    let creator = Uuid::new_v4();

    let nameless = ledger.savings.create_group(creator, "  ".to_string(), dec("100")).await;
    assert!(matches!(nameless, Err(AppError::Validation(_))));

    let free = ledger.savings.create_group(creator, "Free".to_string(), dec("0")).await;
    assert!(matches!(free, Err(AppError::Validation(_))));

    let fractional = ledger.savings.create_group(creator, "Odd".to_string(), dec("99.999")).await;
    assert!(matches!(fractional, Err(AppError::Validation(_))));

    let missing = Uuid::new_v4();
    assert!(matches!(
        ledger.savings.join_group(missing, creator).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        ledger.savings.group_members(missing).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_contribution_uses_group_default() {
    let ledger = TestLedger::new();
    let (creator, member) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(member, dec("1000")).await;
    let (group, _) = ledger
        .savings
        .create_group(creator, "Book Fund".to_string(), dec("250"))
        .await
        .unwrap();
    ledger.savings.join_group(group.id, member).await.unwrap();

    let receipt = ledger
        .savings
        .make_contribution(member, group.id, None)
        .await
        .unwrap();
    assert_eq!(receipt.transaction.amount, dec("-250"));
    assert_eq!(
        receipt.transaction.type_enum(),
        Some(TransactionType::GroupContribution)
    );
    assert_eq!(receipt.group.current_total, dec("250"));
    assert_eq!(receipt.member.contributions_made, 1);
    assert_eq!(receipt.member.total_contributed, dec("250"));
    assert!(receipt.member.last_contribution_date.is_some());
    assert_eq!(receipt.wallet.balance, dec("750"));

    let custom = ledger
        .savings
        .make_contribution(member, group.id, Some(dec("100.50")))
        .await
        .unwrap();
    assert_eq!(custom.group.current_total, dec("350.50"));
    assert_eq!(custom.member.contributions_made, 2);
    assert_eq!(ledger.balance(member).await, dec("649.50"));
    assert_eq!(ledger.notifier.names().last(), Some(&"contribution_made"));
}

#[tokio::test]
async fn test_contribution_rejections() {
    let ledger = TestLedger::new();
    let (creator, member, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(outsider, dec("1000")).await;
    ledger.fund(member, dec("100")).await;
    let (group, _) = ledger
        .savings
        .create_group(creator, "Trip Fund".to_string(), dec("200"))
        .await
        .unwrap();
    ledger.savings.join_group(group.id, member).await.unwrap();

    let outside = ledger.savings.make_contribution(outsider, group.id, None).await;
    assert!(matches!(outside, Err(AppError::Forbidden(_))));

    let broke = ledger.savings.make_contribution(member, group.id, None).await;
    assert!(matches!(broke, Err(AppError::InsufficientFunds { .. })));

    let negative = ledger.savings.make_contribution(member, group.id, Some(dec("-5"))).await;
    assert!(matches!(negative, Err(AppError::Validation(_))));

    let fractional = ledger.savings.make_contribution(member, group.id, Some(dec("10.001"))).await;
    assert!(matches!(fractional, Err(AppError::Validation(_))));

    ledger.savings.leave_group(group.id, member).await.unwrap();
    let former = ledger.savings.make_contribution(member, group.id, Some(dec("50"))).await;
    assert!(matches!(former, Err(AppError::Forbidden(_))));

    let missing = ledger.savings.make_contribution(member, Uuid::new_v4(), None).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    assert_eq!(ledger.balance(member).await, dec("100"));
    assert_eq!(ledger.balance(outsider).await, dec("1000"));
    let audit = ledger.worker().audit_group(group.id).await.unwrap();
    assert_eq!(audit.current_total, dec("0"));
    assert!(audit.is_consistent());
}

#[tokio::test]
async fn test_group_pool_matches_contribution_legs() {
    let ledger = TestLedger::new();
    let creator = Uuid::new_v4();
    ledger.fund(creator, dec("2000")).await;
    let (group, _) = ledger
        .savings
        .create_group(creator, "Rent Pool".to_string(), dec("150"))
        .await
        .unwrap();

    let mut members = vec![creator];
    for _ in 0..3 {
        let member = Uuid::new_v4();
        ledger.fund(member, dec("500")).await;
        ledger.savings.join_group(group.id, member).await.unwrap();
        members.push(member);
    }
    for member in &members {
        ledger.savings.make_contribution(*member, group.id, None).await.unwrap();
    }
    ledger
        .savings
        .make_contribution(creator, group.id, Some(dec("75.25")))
        .await
        .unwrap();

    let audit = ledger.worker().audit_group(group.id).await.unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.current_total, dec("675.25"));
    assert_eq!(audit.contribution_total, dec("675.25"));
}
