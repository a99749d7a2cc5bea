use kpg_common::Money;
use kula_payment_engine::{
    db_types::{NewOrder, NewTransaction, OrderStatusType, TransactionStatus, TransactionType},
    test_utils::{prepare_test_env, random_db_path},
    OrderFlowApi,
    PaymentGatewayDatabase,
    PaymentResult,
    PayoutResult,
    ReconcileOutcome,
    ReconcilerApi,
    SqliteDatabase,
};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database")
}

/// Places an order and registers its push, returning the correlation id the gateway would use.
async fn in_flight_payment(db: &SqliteDatabase, order_id: &str) -> String {
    let api = OrderFlowApi::new(db.clone());
    let order = NewOrder::new(
        order_id.parse().unwrap(),
        "cust-1".into(),
        "vend-1".into(),
        Money::from_kes(1000),
        Money::from_kes(100),
    );
    let (_, payment) = api.place_order(order).await.unwrap();
    let reconciler = ReconcilerApi::new(db.clone());
    let correlation = format!("ws_CO_{order_id}");
    reconciler.register_push(payment.id, &correlation, "mr-1", "254722000001").await.unwrap();
    correlation
}

#[tokio::test]
async fn a_successful_result_settles_the_payment_and_the_order() {
    let db = new_db().await;
    let correlation = in_flight_payment(&db, "ord-1").await;
    let reconciler = ReconcilerApi::new(db.clone());
    let result = PaymentResult::settled(correlation.clone(), Money::from_kes(1100), "RCPT001".into());
    let outcome = reconciler.process_payment_result(result).await.unwrap();
    let ReconcileOutcome::Applied { transaction, order } = outcome else {
        panic!("Expected the result to be applied");
    };
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(transaction.receipt.as_deref(), Some("RCPT001"));
    assert_eq!(order.unwrap().status, OrderStatusType::Paid);
}

#[tokio::test]
async fn a_duplicate_result_is_a_no_op() {
    let db = new_db().await;
    let correlation = in_flight_payment(&db, "ord-1").await;
    let reconciler = ReconcilerApi::new(db.clone());
    let result = PaymentResult::settled(correlation.clone(), Money::from_kes(1100), "RCPT001".into());
    reconciler.process_payment_result(result).await.unwrap();

    // The gateway redelivers, this time claiming a failure. The original settlement must stand.
    let duplicate = PaymentResult::failed(correlation.clone(), "Request cancelled by user".into());
    let outcome = reconciler.process_payment_result(duplicate).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Duplicate), "{outcome:?}");
    let txn = db.fetch_transaction_by_correlation_id(&correlation).await.unwrap().unwrap();
    assert_eq!(txn.status, TransactionStatus::Completed);
    assert_eq!(txn.receipt.as_deref(), Some("RCPT001"));
}

#[tokio::test]
async fn a_failure_result_fails_the_payment_and_the_order() {
    let db = new_db().await;
    let correlation = in_flight_payment(&db, "ord-1").await;
    let reconciler = ReconcilerApi::new(db.clone());
    let result = PaymentResult::failed(correlation.clone(), "Request cancelled by user".into());
    let outcome = reconciler.process_payment_result(result).await.unwrap();
    let ReconcileOutcome::Applied { transaction, order } = outcome else {
        panic!("Expected the result to be applied");
    };
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(transaction.failure_reason.as_deref(), Some("Request cancelled by user"));
    assert_eq!(order.unwrap().status, OrderStatusType::PaymentFailed);
}

#[tokio::test]
async fn unknown_correlation_ids_are_dropped() {
    let db = new_db().await;
    let reconciler = ReconcilerApi::new(db.clone());
    let result = PaymentResult::settled("ws_CO_nothing".into(), Money::from_kes(10), "RCPT".into());
    let outcome = reconciler.process_payment_result(result).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Unmatched), "{outcome:?}");
}

#[tokio::test]
async fn an_amount_mismatch_fails_the_payment() {
    let db = new_db().await;
    let correlation = in_flight_payment(&db, "ord-1").await;
    let reconciler = ReconcilerApi::new(db.clone());
    // KES 11.00 settled against a KES 1100.00 order.
    let result = PaymentResult::settled(correlation.clone(), Money::from_kes(11), "RCPT001".into());
    let outcome = reconciler.process_payment_result(result).await.unwrap();
    let ReconcileOutcome::Applied { transaction, order } = outcome else {
        panic!("Expected the result to be applied");
    };
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(order.unwrap().status, OrderStatusType::PaymentFailed);
}

#[tokio::test]
async fn a_one_cent_rounding_difference_is_tolerated() {
    let db = new_db().await;
    let correlation = in_flight_payment(&db, "ord-1").await;
    let reconciler = ReconcilerApi::new(db.clone());
    let settled = Money::from(1100_00 - 1);
    let result = PaymentResult::settled(correlation, settled, "RCPT001".into());
    let outcome = reconciler.process_payment_result(result).await.unwrap();
    let ReconcileOutcome::Applied { transaction, .. } = outcome else {
        panic!("Expected the result to be applied");
    };
    assert_eq!(transaction.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn a_result_arriving_right_after_registration_is_never_dropped() {
    // The gateway can answer the callback before the registering request's connection has even been returned to
    // the pool. The finalization is a conditional write keyed on the correlation id, so it must always see the
    // registration, whichever pool connection it lands on.
    let db = new_db().await;
    let reconciler = ReconcilerApi::new(db.clone());
    for i in 0..25 {
        let correlation = in_flight_payment(&db, &format!("ord-{i}")).await;
        let result = PaymentResult::settled(correlation.clone(), Money::from_kes(1100), format!("RCPT{i}"));
        let outcome = reconciler.process_payment_result(result).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Applied { .. }), "result {i} was not applied: {outcome:?}");
    }
}

#[tokio::test]
async fn payout_results_finalize_the_ledger_entry() {
    let db = new_db().await;
    let reconciler = ReconcilerApi::new(db.clone());
    let payout = NewTransaction::payout(
        "vend-1".into(),
        TransactionType::VendorPayout,
        Money::from_kes(900),
        Some("254722000002".into()),
    );
    let txn = reconciler.record_payout(payout).await.unwrap();
    let txn = reconciler.register_payout(txn.id, "AG_1", "254722000002").await.unwrap();
    // B2C payouts only carry a ConversationID. The merchant handle must stay NULL, not become "".
    assert!(txn.merchant_request_id.is_none());
    let result =
        PayoutResult { correlation_id: "AG_1".into(), success: true, receipt: Some("RC900".into()), failure_reason: None };
    let outcome = reconciler.process_payout_result(result).await.unwrap();
    let ReconcileOutcome::Applied { transaction, order } = outcome else {
        panic!("Expected the result to be applied");
    };
    assert!(order.is_none());
    assert_eq!(transaction.status, TransactionStatus::Completed);
    assert_eq!(transaction.receipt.as_deref(), Some("RC900"));
}
