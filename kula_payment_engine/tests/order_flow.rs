use chrono::Duration;
use kpg_common::Money;
use kula_payment_engine::{
    db_types::{ActorRole, NewOrder, OrderStatusType, TransactionStatus},
    test_utils::{prepare_test_env, random_db_path},
    OrderFlowApi,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    PaymentResult,
    ReconcilerApi,
    SqliteDatabase,
};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database")
}

fn order(id: &str) -> NewOrder {
    NewOrder::new(id.parse().unwrap(), "cust-1".into(), "vend-1".into(), Money::from_kes(1000), Money::from_kes(100))
        .with_delivery_address("14 Biashara St, Nairobi".into())
}

/// Drives the payment through the reconciler so the order reaches `paid`.
async fn settle_payment(db: &SqliteDatabase, order_id: &str, amount: Money) {
    let reconciler = ReconcilerApi::new(db.clone());
    let payment = db.fetch_pending_payment_for_order(&order_id.parse().unwrap()).await.unwrap().unwrap();
    let correlation = format!("ws_CO_{order_id}");
    reconciler.register_push(payment.id, &correlation, "mr-1", "254722000001").await.unwrap();
    let result = PaymentResult::settled(correlation, amount, format!("RCPT{order_id}"));
    reconciler.process_payment_result(result).await.unwrap();
}

#[tokio::test]
async fn placing_an_order_records_a_pending_payment() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    let (order, payment) = api.place_order(order("ord-1")).await.unwrap();
    assert_eq!(order.status, OrderStatusType::PendingPayment);
    assert_eq!(order.total, Money::from_kes(1100));
    assert_eq!(payment.status, TransactionStatus::Pending);
    assert_eq!(payment.amount, Money::from_kes(1100));
    // The commission split is snapshotted at placement time, at the default 10% rate.
    let split = payment.breakdown().unwrap();
    assert_eq!(split.platform_commission, Money::from_kes(100));
    assert_eq!(split.vendor_share, Money::from_kes(900));
    assert_eq!(split.rider_share, Money::from_kes(100));
    assert_eq!(payment.commission_rate, Some(10.0));
}

#[tokio::test]
async fn duplicate_order_ids_are_rejected() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    api.place_order(order("ord-1")).await.unwrap();
    let err = api.place_order(order("ord-1")).await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::OrderAlreadyExists(_)), "{err}");
}

#[tokio::test]
async fn the_full_fulfillment_lifecycle() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    let (order, _payment) = api.place_order(order("ord-1")).await.unwrap();
    let oid = order.order_id.clone();
    settle_payment(&db, "ord-1", Money::from_kes(1100)).await;
    let order = api.fetch_order(&oid).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Paid);
    assert!(order.paid_at.is_some());

    for status in [OrderStatusType::Confirmed, OrderStatusType::Preparing, OrderStatusType::ReadyForPickup] {
        api.advance_order(&oid, status, ActorRole::Vendor, "vend-1").await.unwrap();
    }
    let order = api.accept_order(&oid, "rider-1").await.unwrap();
    assert_eq!(order.status, OrderStatusType::AssignedToRider);
    assert_eq!(order.rider_id.as_deref(), Some("rider-1"));

    for status in [OrderStatusType::PickedUp, OrderStatusType::InTransit, OrderStatusType::Delivered] {
        api.advance_order(&oid, status, ActorRole::Rider, "rider-1").await.unwrap();
    }
    let order = api.fetch_order(&oid).await.unwrap().unwrap();
    assert!(order.delivered_at.is_some());

    // Delivery credits the earnings caches from the settled payment's breakdown.
    let vendor = db.fetch_cached_earnings("vend-1", kula_payment_engine::db_types::EarningsRole::Vendor).await.unwrap();
    assert_eq!(vendor.unwrap().total_earnings, Money::from_kes(900));
    let rider = db.fetch_cached_earnings("rider-1", kula_payment_engine::db_types::EarningsRole::Rider).await.unwrap();
    assert_eq!(rider.unwrap().total_earnings, Money::from_kes(100));

    let order = api.advance_order(&oid, OrderStatusType::Completed, ActorRole::Customer, "cust-1").await.unwrap();
    assert_eq!(order.status, OrderStatusType::Completed);
}

#[tokio::test]
async fn vendors_cannot_skip_states_or_act_on_others_orders() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    let (order, _) = api.place_order(order("ord-1")).await.unwrap();
    let oid = order.order_id.clone();
    settle_payment(&db, "ord-1", Money::from_kes(1100)).await;

    // paid -> preparing skips confirmed
    let err = api.advance_order(&oid, OrderStatusType::Preparing, ActorRole::Vendor, "vend-1").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidTransition(_)), "{err}");

    // the wrong vendor
    let err = api.advance_order(&oid, OrderStatusType::Confirmed, ActorRole::Vendor, "vend-9").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::NotAParty { .. }), "{err}");

    // a rider has no business here at all
    let err = api.advance_order(&oid, OrderStatusType::Confirmed, ActorRole::Rider, "rider-1").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidTransition(_)), "{err}");
}

#[tokio::test]
async fn only_one_rider_wins_a_claim() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    let (order, _) = api.place_order(order("ord-1")).await.unwrap();
    let oid = order.order_id.clone();
    settle_payment(&db, "ord-1", Money::from_kes(1100)).await;
    for status in [OrderStatusType::Confirmed, OrderStatusType::Preparing, OrderStatusType::ReadyForPickup] {
        api.advance_order(&oid, status, ActorRole::Vendor, "vend-1").await.unwrap();
    }
    let winner = api.accept_order(&oid, "rider-1").await.unwrap();
    assert_eq!(winner.rider_id.as_deref(), Some("rider-1"));
    let err = api.accept_order(&oid, "rider-2").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::RiderAssignmentConflict(_)), "{err}");
    // The losing claim did not dislodge the winner.
    let order = api.fetch_order(&oid).await.unwrap().unwrap();
    assert_eq!(order.rider_id.as_deref(), Some("rider-1"));
}

#[tokio::test]
async fn customers_can_cancel_only_unpaid_orders() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    let (order, _) = api.place_order(order("ord-1")).await.unwrap();
    let oid = order.order_id.clone();
    let order = api.advance_order(&oid, OrderStatusType::Cancelled, ActorRole::Customer, "cust-1").await.unwrap();
    assert_eq!(order.status, OrderStatusType::Cancelled);

    let (order, _) = api.place_order(self::order("ord-2")).await.unwrap();
    let oid = order.order_id.clone();
    settle_payment(&db, "ord-2", Money::from_kes(1100)).await;
    let err = api.advance_order(&oid, OrderStatusType::Cancelled, ActorRole::Customer, "cust-1").await.unwrap_err();
    assert!(matches!(err, PaymentGatewayError::InvalidTransition(_)), "{err}");
}

#[tokio::test]
async fn the_reaper_removes_only_stale_unpaid_orders() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    api.place_order(order("ord-stale")).await.unwrap();
    let (paid, _) = api.place_order(order("ord-paid")).await.unwrap();
    settle_payment(&db, "ord-paid", Money::from_kes(1100)).await;

    // A negative TTL makes everything eligible without having to sleep through a real timeout.
    let reaped = api.reap_stale_orders(Duration::seconds(-1), None).await.unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].order_id.as_str(), "ord-stale");
    assert!(api.fetch_order(&"ord-stale".parse().unwrap()).await.unwrap().is_none());
    // The pending payment went with it.
    assert!(db.fetch_pending_payment_for_order(&"ord-stale".parse().unwrap()).await.unwrap().is_none());
    // The paid order is untouched.
    assert!(api.fetch_order(&paid.order_id).await.unwrap().is_some());
}

#[tokio::test]
async fn clearing_history_removes_only_a_customers_dead_end_orders() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());

    // One cancelled, one payment_failed, one still awaiting payment, one paid.
    api.place_order(order("ord-cancelled")).await.unwrap();
    api.advance_order(&"ord-cancelled".parse().unwrap(), OrderStatusType::Cancelled, ActorRole::Customer, "cust-1")
        .await
        .unwrap();
    api.place_order(order("ord-failed")).await.unwrap();
    {
        let reconciler = ReconcilerApi::new(db.clone());
        let payment = db.fetch_pending_payment_for_order(&"ord-failed".parse().unwrap()).await.unwrap().unwrap();
        reconciler.register_push(payment.id, "ws_CO_ord-failed", "mr-1", "254722000001").await.unwrap();
        let result = PaymentResult::failed("ws_CO_ord-failed".into(), "Request cancelled by user".into());
        reconciler.process_payment_result(result).await.unwrap();
    }
    api.place_order(order("ord-pending")).await.unwrap();
    api.place_order(order("ord-paid")).await.unwrap();
    settle_payment(&db, "ord-paid", Money::from_kes(1100)).await;

    // Another customer's cancelled order must survive a clear scoped to cust-1.
    let other = NewOrder::new(
        "ord-other".parse().unwrap(),
        "cust-2".into(),
        "vend-1".into(),
        Money::from_kes(500),
        Money::from_kes(50),
    );
    api.place_order(other).await.unwrap();
    api.advance_order(&"ord-other".parse().unwrap(), OrderStatusType::Cancelled, ActorRole::Customer, "cust-2")
        .await
        .unwrap();

    let cleared = api.clear_customer_history("cust-1").await.unwrap();
    let mut ids: Vec<&str> = cleared.iter().map(|o| o.order_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["ord-cancelled", "ord-failed"]);

    assert!(api.fetch_order(&"ord-cancelled".parse().unwrap()).await.unwrap().is_none());
    assert!(api.fetch_order(&"ord-failed".parse().unwrap()).await.unwrap().is_none());
    // The failed payment record went with its order.
    assert!(db.fetch_transaction_by_correlation_id("ws_CO_ord-failed").await.unwrap().is_none());
    // In-flight and settled orders are untouched, and so is the other customer's history.
    assert!(api.fetch_order(&"ord-pending".parse().unwrap()).await.unwrap().is_some());
    assert!(api.fetch_order(&"ord-paid".parse().unwrap()).await.unwrap().is_some());
    assert!(db.fetch_transaction_by_correlation_id("ws_CO_ord-paid").await.unwrap().is_some());
    assert!(api.fetch_order(&"ord-other".parse().unwrap()).await.unwrap().is_some());
}

#[tokio::test]
async fn reaping_can_be_scoped_to_one_customer() {
    let db = new_db().await;
    let api = OrderFlowApi::new(db.clone());
    api.place_order(order("ord-1")).await.unwrap();
    let other = NewOrder::new(
        "ord-2".parse().unwrap(),
        "cust-2".into(),
        "vend-1".into(),
        Money::from_kes(500),
        Money::from_kes(50),
    );
    api.place_order(other).await.unwrap();

    let reaped = api.reap_stale_orders(Duration::seconds(-1), Some("cust-2")).await.unwrap();
    assert_eq!(reaped.len(), 1);
    assert_eq!(reaped[0].customer_id, "cust-2");
    assert!(api.fetch_order(&"ord-1".parse().unwrap()).await.unwrap().is_some());
}
