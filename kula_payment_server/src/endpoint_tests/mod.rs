//! Endpoint tests that exercise the routes end to end against a throwaway SQLite database, with the M-Pesa gateway
//! in simulation mode. No HTTP leaves the process and no live credentials are needed.
use actix_web::{http::StatusCode, test, test::TestRequest, web, App};
use kpg_common::Money;
use kula_payment_engine::{
    db_types::EarningsRole,
    test_utils::{prepare_test_env, random_db_path},
    AuditApi,
    OrderFlowApi,
    PaymentGatewayDatabase,
    ReconcilerApi,
    SqliteDatabase,
};
use mpesa_tools::{MpesaApi, MpesaConfig};
use serde_json::{json, Value};

use crate::routes::{
    accept_order,
    create_order,
    financial_audit,
    financial_audit_action,
    get_order,
    health,
    payment_callback,
    push_payment,
    request_payout,
    update_order_status,
};

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database")
}

fn simulation_gateway() -> MpesaApi {
    // Placeholder credentials select simulation mode.
    MpesaApi::new(MpesaConfig::default()).expect("Error creating gateway client")
}

macro_rules! init_app {
    ($db:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(OrderFlowApi::new($db.clone())))
                .app_data(web::Data::new(ReconcilerApi::new($db.clone())))
                .app_data(web::Data::new(AuditApi::new($db.clone())))
                .app_data(web::Data::new(simulation_gateway()))
                .service(health)
                .service(create_order)
                .service(get_order)
                .service(update_order_status)
                .service(accept_order)
                .service(push_payment)
                .service(payment_callback)
                .service(request_payout)
                .service(financial_audit)
                .service(financial_audit_action),
        )
        .await
    };
}

fn order_body(id: &str) -> Value {
    json!({
        "orderId": id,
        "customerId": "cust-1",
        "vendorId": "vend-1",
        "subtotal": 1000.0,
        "deliveryFee": 100.0,
        "deliveryAddress": "14 Biashara St, Nairobi",
    })
}

fn status_body(status: &str, role: &str, actor_id: &str) -> Value {
    json!({ "status": status, "actorRole": role, "actorId": actor_id })
}

#[actix_web::test]
async fn health_check() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::get().uri("/health").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = test::read_body(res).await;
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn creating_and_fetching_orders() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "pending_payment");
    assert_eq!(body["total"], 1100.0);

    // Same id again loses to the UNIQUE constraint.
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let req = TestRequest::get().uri("/orders/ord-1").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let req = TestRequest::get().uri("/orders/no-such-order").to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn nonsense_amounts_are_rejected() {
    let db = new_db().await;
    let app = init_app!(db);
    let mut body = order_body("ord-1");
    body["subtotal"] = json!(-50.0);
    let req = TestRequest::post().uri("/orders").set_json(body).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn a_simulated_push_settles_the_order_synchronously() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    test::call_service(&app, req).await;

    let push = json!({ "orderId": "ord-1", "phoneNumber": "0722000001", "amount": 1100.0 });
    let req = TestRequest::post().uri("/payments/push").set_json(push).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    let correlation = body["checkoutRequestId"].as_str().unwrap().to_string();
    assert!(correlation.starts_with("ws_CO_SIM_"), "{correlation}");

    let req = TestRequest::get().uri("/orders/ord-1").to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "paid");

    // A late contradictory webhook for the same correlation id is a no-op.
    let callback = json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "mr-1",
            "CheckoutRequestID": correlation,
            "ResultCode": 1032,
            "ResultDesc": "Request cancelled by user",
        }}
    });
    let req = TestRequest::post().uri("/payments/callback").set_json(callback).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(res).await;
    assert_eq!(ack["ResultCode"], 0);

    let req = TestRequest::get().uri("/orders/ord-1").to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "paid");
}

#[actix_web::test]
async fn pushes_are_refused_for_wrong_amounts_and_settled_orders() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    test::call_service(&app, req).await;

    let push = json!({ "orderId": "ord-1", "phoneNumber": "0722000001", "amount": 900.0 });
    let req = TestRequest::post().uri("/payments/push").set_json(push).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let push = json!({ "orderId": "ord-1", "phoneNumber": "0722000001", "amount": 1100.0 });
    let req = TestRequest::post().uri("/payments/push").set_json(push.clone()).to_request();
    test::call_service(&app, req).await;

    // The order is paid now, so a second push has nothing to pay for.
    let req = TestRequest::post().uri("/payments/push").set_json(push).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[actix_web::test]
async fn a_malformed_callback_is_still_acknowledged() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post()
        .uri("/payments/callback")
        .insert_header(("content-type", "application/json"))
        .set_payload("this is not json")
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(res).await;
    assert_ne!(ack["ResultCode"], 0);
}

#[actix_web::test]
async fn a_callback_for_an_unknown_correlation_is_acknowledged_and_dropped() {
    let db = new_db().await;
    let app = init_app!(db);
    let callback = json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "mr-x",
            "CheckoutRequestID": "ws_CO_never_issued",
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
        }}
    });
    let req = TestRequest::post().uri("/payments/callback").set_json(callback).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(res).await;
    assert_eq!(ack["ResultCode"], 0);
}

#[actix_web::test]
async fn a_callback_is_acknowledged_even_when_the_backend_is_down() {
    // Anything but a 200 makes Daraja redeliver the same payload, so a backend failure while applying the result
    // must still be acknowledged.
    let mut db = new_db().await;
    let app = init_app!(db);
    db.close().await.unwrap();

    let callback = json!({
        "Body": { "stkCallback": {
            "MerchantRequestID": "mr-1",
            "CheckoutRequestID": "ws_CO_1",
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
        }}
    });
    let req = TestRequest::post().uri("/payments/callback").set_json(callback).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let ack: Value = test::read_body_json(res).await;
    assert_eq!(ack["ResultCode"], 0);
}

#[actix_web::test]
async fn the_status_route_walks_the_fulfillment_chain() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    test::call_service(&app, req).await;
    let push = json!({ "orderId": "ord-1", "phoneNumber": "0722000001", "amount": 1100.0 });
    let req = TestRequest::post().uri("/payments/push").set_json(push).to_request();
    test::call_service(&app, req).await;

    for status in ["confirmed", "preparing", "ready_for_pickup"] {
        let req = TestRequest::post()
            .uri("/orders/ord-1/status")
            .set_json(status_body(status, "vendor", "vend-1"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK, "vendor could not reach {status}");
    }

    // First rider in wins, the second gets a conflict.
    let req = TestRequest::post().uri("/orders/ord-1/accept").set_json(json!({ "riderId": "rider-1" })).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let req = TestRequest::post().uri("/orders/ord-1/accept").set_json(json!({ "riderId": "rider-2" })).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    for status in ["picked_up", "in_transit", "delivered"] {
        let req = TestRequest::post()
            .uri("/orders/ord-1/status")
            .set_json(status_body(status, "rider", "rider-1"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK, "rider could not reach {status}");
    }
    let req = TestRequest::get().uri("/orders/ord-1").to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["status"], "delivered");
    assert_eq!(body["riderId"], "rider-1");
}

#[actix_web::test]
async fn actors_cannot_act_outside_their_slice() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    test::call_service(&app, req).await;
    let push = json!({ "orderId": "ord-1", "phoneNumber": "0722000001", "amount": 1100.0 });
    let req = TestRequest::post().uri("/payments/push").set_json(push).to_request();
    test::call_service(&app, req).await;

    // Another vendor on someone else's order.
    let req = TestRequest::post()
        .uri("/orders/ord-1/status")
        .set_json(status_body("confirmed", "vendor", "vend-9"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // The reconciler role is reserved for the callback path.
    let req = TestRequest::post()
        .uri("/orders/ord-1/status")
        .set_json(status_body("paid", "reconciler", "gateway"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // A vendor may not skip straight to ready_for_pickup.
    let req = TestRequest::post()
        .uri("/orders/ord-1/status")
        .set_json(status_body("ready_for_pickup", "vendor", "vend-1"))
        .to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn a_simulated_payout_completes_the_ledger_entry() {
    let db = new_db().await;
    let app = init_app!(db);
    let payout = json!({ "userId": "vend-1", "amount": 900.0, "type": "vendor_payout", "phoneNumber": "0722000002" });
    let req = TestRequest::post().uri("/payments/payout").set_json(payout).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["success"], true);
    assert!(body["conversationId"].as_str().unwrap().starts_with("AG_SIM_"));

    // Payment types are not payout types.
    let payout = json!({ "userId": "cust-1", "amount": 900.0, "type": "customer_payment", "phoneNumber": "0722000002" });
    let req = TestRequest::post().uri("/payments/payout").set_json(payout).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn the_audit_route_flags_tampering_and_repairs_it() {
    let db = new_db().await;
    let app = init_app!(db);
    let req = TestRequest::post().uri("/orders").set_json(order_body("ord-1")).to_request();
    test::call_service(&app, req).await;
    let push = json!({ "orderId": "ord-1", "phoneNumber": "0722000001", "amount": 1100.0 });
    let req = TestRequest::post().uri("/payments/push").set_json(push).to_request();
    test::call_service(&app, req).await;
    for status in ["confirmed", "preparing", "ready_for_pickup"] {
        let req = TestRequest::post()
            .uri("/orders/ord-1/status")
            .set_json(status_body(status, "vendor", "vend-1"))
            .to_request();
        test::call_service(&app, req).await;
    }
    let req = TestRequest::post().uri("/orders/ord-1/accept").set_json(json!({ "riderId": "rider-1" })).to_request();
    test::call_service(&app, req).await;
    for status in ["picked_up", "in_transit", "delivered"] {
        let req = TestRequest::post()
            .uri("/orders/ord-1/status")
            .set_json(status_body(status, "rider", "rider-1"))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = TestRequest::get().uri("/audit/financial").to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["healthStatus"], "HEALTHY");
    assert_eq!(body["summary"]["totalPlatformCommission"], 100.0);

    // Tamper with the vendor's cached figure behind the audit's back.
    db.set_cached_earnings("vend-1", EarningsRole::Vendor, Money::from_kes(400)).await.unwrap();
    let req = TestRequest::get().uri("/audit/financial").to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["healthStatus"], "NEEDS_ATTENTION");
    assert_eq!(body["summary"]["vendorDiscrepancies"], 1);

    let req = TestRequest::post().uri("/audit/financial").set_json(json!({ "action": "recalculate_all" })).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::OK);

    let req = TestRequest::get().uri("/audit/financial").to_request();
    let res = test::call_service(&app, req).await;
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["healthStatus"], "HEALTHY");

    // Anything other than recalculate_all is refused.
    let req = TestRequest::post().uri("/audit/financial").set_json(json!({ "action": "explode" })).to_request();
    let res = test::call_service(&app, req).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
