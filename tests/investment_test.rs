mod helpers;

use helpers::*;
use moneyflow_ledger::models::*;
use moneyflow_ledger::AppError;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_invest_moves_funds_to_owner() {
    let ledger = TestLedger::new();
    let (owner, investor) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(investor, dec("5000")).await;
    let business = ledger.open_business(owner, "10000", "12.5").await;
    assert_eq!(business.status_enum(), BusinessStatus::Active);

    let receipt = ledger
        .investments
        .invest_in_business(investor, business.id, dec("2000"))
        .await
        .unwrap();

    assert_eq!(ledger.balance(investor).await, dec("3000"));
    assert_eq!(ledger.balance(owner).await, dec("2000"));
    assert_eq!(receipt.business.raised_amount, dec("2000"));
    assert_eq!(receipt.investment.expected_return, dec("2250.00"));
    assert!(receipt.investment.maturity_date > receipt.investment.investment_date);

    assert_eq!(receipt.investor_leg.amount, dec("-2000"));
    assert_eq!(receipt.investor_leg.type_enum(), Some(TransactionType::Investment));
    assert_eq!(
        receipt.owner_leg.reference,
        format!("{}-RECEIVED", receipt.investor_leg.reference)
    );
    assert_eq!(receipt.owner_leg.user_id, owner);
    assert_eq!(receipt.owner_leg.amount, dec("2000"));
    assert_eq!(ledger.notifier.names().last(), Some(&"investment_made"));
}

#[tokio::test]
async fn test_business_flips_to_funded_at_goal() {
    let ledger = TestLedger::new();
    let (owner, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(a, dec("1000")).await;
    ledger.fund(b, dec("1000")).await;
    let business = ledger.open_business(owner, "1000", "10").await;

    let first = ledger.investments.invest_in_business(a, business.id, dec("600")).await.unwrap();
    assert_eq!(first.business.status_enum(), BusinessStatus::Active);

    let second = ledger.investments.invest_in_business(b, business.id, dec("400")).await.unwrap();
    assert_eq!(second.business.status_enum(), BusinessStatus::Funded);
    assert_eq!(second.business.raised_amount, dec("1000"));

    let err = ledger
        .investments
        .invest_in_business(a, business.id, dec("100"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(ledger.balance(a).await, dec("400"));
}

#[tokio::test]
async fn test_investment_rejections() {
    let ledger = TestLedger::new();
    let (owner, investor) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(owner, dec("1000")).await;
    ledger.fund(investor, dec("300")).await;

    let draft = ledger
        .investments
        .create_business(owner, "Laundry Run".to_string(), dec("5000"), dec("8"), 3)
        .await
        .unwrap();
    let not_active = ledger.investments.invest_in_business(investor, draft.id, dec("100")).await;
    assert!(matches!(not_active, Err(AppError::Validation(_))));

    let err = ledger.investments.activate_business(draft.id, investor).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let business = ledger.investments.activate_business(draft.id, owner).await.unwrap();

    let own = ledger.investments.invest_in_business(owner, business.id, dec("100")).await;
    assert!(matches!(own, Err(AppError::Validation(_))));

    let too_much = ledger.investments.invest_in_business(investor, business.id, dec("300.01")).await;
    assert!(matches!(too_much, Err(AppError::InsufficientFunds { .. })));

    let zero = ledger.investments.invest_in_business(investor, business.id, Decimal::ZERO).await;
    assert!(matches!(zero, Err(AppError::Validation(_))));

    let fractional = ledger.investments.invest_in_business(investor, business.id, dec("100.005")).await;
    assert!(matches!(fractional, Err(AppError::Validation(_))));

    let missing = ledger.investments.invest_in_business(investor, Uuid::new_v4(), dec("100")).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    assert_eq!(ledger.balance(investor).await, dec("300"));
    assert_eq!(ledger.balance(owner).await, dec("1000"));
    assert!(ledger.investments.business_investments(business.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_investments_raise_exact_total() {
    let ledger = Arc::new(TestLedger::new());
    let owner = Uuid::new_v4();
    let business = ledger.open_business(owner, "100000", "10").await;

    let investors: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();
    for investor in &investors {
        ledger.fund(*investor, dec("500")).await;
    }

    let mut handles = Vec::new();
    for investor in investors.clone() {
        let ledger = ledger.clone();
        let business_id = business.id;
        handles.push(tokio::spawn(async move {
            ledger
                .investments
                .invest_in_business(investor, business_id, dec("150"))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let investments = ledger.investments.business_investments(business.id).await.unwrap();
    assert_eq!(investments.len(), 10);
    let raised: Decimal = investments.iter().map(|i| i.amount).sum();
    assert_eq!(raised, dec("1500"));
    assert_eq!(ledger.balance(owner).await, dec("1500"));
    for investor in &investors {
        assert_eq!(ledger.balance(*investor).await, dec("350"));
    }
}

#[tokio::test]
async fn test_repayment_is_pro_rata_and_completes_business() {
    let ledger = TestLedger::new();
    let (owner, a, b) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(a, dec("3000")).await;
    ledger.fund(b, dec("1000")).await;
    ledger.fund(owner, dec("1000")).await;
    let business = ledger.open_business(owner, "10000", "10").await;

    ledger.investments.invest_in_business(a, business.id, dec("3000")).await.unwrap();
    ledger.investments.invest_in_business(b, business.id, dec("1000")).await.unwrap();
    assert_eq!(ledger.balance(owner).await, dec("5000"));

    let receipt = ledger
        .investments
        .make_repayment(owner, business.id, dec("1000"))
        .await
        .unwrap();
    assert_eq!(receipt.distributed_total(), dec("1000"));
    assert_eq!(receipt.returns.len(), 2);
    assert_eq!(receipt.owner_leg.amount, dec("-1000"));
    assert_eq!(receipt.owner_leg.type_enum(), Some(TransactionType::Return));
    assert_eq!(receipt.business.status_enum(), BusinessStatus::Active);
    assert_eq!(ledger.balance(a).await, dec("750"));
    assert_eq!(ledger.balance(b).await, dec("250"));

    for payment in &receipt.returns {
        assert_eq!(
            payment.transaction.metadata_str("repayment_reference"),
            Some(receipt.owner_leg.reference.as_str())
        );
    }

    // Everything still owed is 4400 - 1000
    let over = ledger
        .investments
        .make_repayment(owner, business.id, dec("3400.01"))
        .await
        .unwrap_err();
    assert!(matches!(over, AppError::Validation(_)));
    assert_eq!(ledger.balance(owner).await, dec("4000"));

    let last = ledger
        .investments
        .make_repayment(owner, business.id, dec("3400"))
        .await
        .unwrap();
    assert_eq!(last.business.status_enum(), BusinessStatus::Completed);
    assert_eq!(ledger.balance(a).await, dec("3300"));
    assert_eq!(ledger.balance(b).await, dec("1100"));
    assert_eq!(ledger.balance(owner).await, dec("600"));

    let investments = ledger.investments.business_investments(business.id).await.unwrap();
    assert!(investments.iter().all(|i| i.status_enum() == InvestmentStatus::Completed));
    assert!(investments.iter().all(|i| i.returns_received == i.expected_return));

    let err = ledger
        .investments
        .make_repayment(owner, business.id, dec("10"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_repayment_shares_sum_to_the_cent() {
    let ledger = TestLedger::new();
    let owner = Uuid::new_v4();
    let business = ledger.open_business(owner, "10000", "10").await;

    for _ in 0..3 {
        let investor = Uuid::new_v4();
        ledger.fund(investor, dec("100")).await;
        ledger.investments.invest_in_business(investor, business.id, dec("100")).await.unwrap();
    }

    let receipt = ledger
        .investments
        .make_repayment(owner, business.id, dec("100"))
        .await
        .unwrap();

    let shares: Vec<Decimal> = receipt.returns.iter().map(|r| r.transaction.amount).collect();
    assert_eq!(shares.iter().copied().sum::<Decimal>(), dec("100"));
    assert!(shares.iter().all(|s| *s == dec("33.33") || *s == dec("33.34")));
    assert_eq!(ledger.balance(owner).await, dec("200"));
    assert_eq!(ledger.store.total_balance().await, dec("300"));
}

#[tokio::test]
async fn test_repayment_respects_outstanding_caps() {
    let ledger = TestLedger::new();
    let (owner, early, late) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(early, dec("1000")).await;
    ledger.fund(late, dec("1000")).await;
    let business = ledger.open_business(owner, "10000", "10").await;

    ledger.investments.invest_in_business(early, business.id, dec("1000")).await.unwrap();
    ledger.investments.make_repayment(owner, business.id, dec("1000")).await.unwrap();

    // `early` is owed only 100 more; the rest of an even split goes to `late`
    ledger.investments.invest_in_business(late, business.id, dec("1000")).await.unwrap();
    let receipt = ledger
        .investments
        .make_repayment(owner, business.id, dec("1000"))
        .await
        .unwrap();

    let share_of = |investor: Uuid| {
        receipt
            .returns
            .iter()
            .find(|r| r.investment.investor_id == investor)
            .map(|r| r.transaction.amount)
    };
    assert_eq!(share_of(early), Some(dec("100")));
    assert_eq!(share_of(late), Some(dec("900")));
    assert_eq!(ledger.balance(early).await, dec("1100"));

    let portfolio = ledger.investments.investor_portfolio(early).await.unwrap();
    assert_eq!(portfolio.active_count, 0);
    assert_eq!(portfolio.total_received, dec("1100"));
}

#[tokio::test]
async fn test_repayment_rejections() {
    let ledger = TestLedger::new();
    let (owner, stranger) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(owner, dec("1000")).await;
    ledger.fund(stranger, dec("1000")).await;
    let business = ledger.open_business(owner, "10000", "10").await;

    let nobody = ledger.investments.make_repayment(owner, business.id, dec("100")).await;
    assert!(matches!(nobody, Err(AppError::Validation(_))));

    ledger.investments.invest_in_business(stranger, business.id, dec("500")).await.unwrap();

    let forbidden = ledger.investments.make_repayment(stranger, business.id, dec("100")).await;
    assert!(matches!(forbidden, Err(AppError::Forbidden(_))));

    let broke = ledger.investments.make_repayment(owner, business.id, dec("1500.01")).await;
    assert!(matches!(broke, Err(AppError::InsufficientFunds { .. })));

    let fractional = ledger.investments.make_repayment(owner, business.id, dec("50.125")).await;
    assert!(matches!(fractional, Err(AppError::Validation(_))));

    assert_eq!(ledger.balance(owner).await, dec("1500"));
    assert_eq!(ledger.balance(stranger).await, dec("500"));
}

#[tokio::test]
async fn test_investor_portfolio_totals() {
    let ledger = TestLedger::new();
    let (owner, investor) = (Uuid::new_v4(), Uuid::new_v4());
    ledger.fund(investor, dec("2000")).await;
    let cafe = ledger.open_business(owner, "10000", "10").await;
    let shop = ledger.open_business(owner, "10000", "20").await;

    ledger.investments.invest_in_business(investor, cafe.id, dec("500")).await.unwrap();
    ledger.investments.invest_in_business(investor, shop.id, dec("1000")).await.unwrap();
    ledger.investments.make_repayment(owner, cafe.id, dec("550")).await.unwrap();

    let portfolio = ledger.investments.investor_portfolio(investor).await.unwrap();
    assert_eq!(portfolio.investments.len(), 2);
    assert_eq!(portfolio.total_invested, dec("1500"));
    assert_eq!(portfolio.total_expected, dec("1750"));
    assert_eq!(portfolio.total_received, dec("550"));
    assert_eq!(portfolio.active_count, 1);

    let empty = ledger.investments.investor_portfolio(Uuid::new_v4()).await.unwrap();
    assert!(empty.investments.is_empty());
    assert_eq!(empty.total_invested, Decimal::ZERO);

    let missing = ledger.investments.business_investments(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
