//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Handlers are async and never block the worker thread: all I/O (database, gateway) is awaited. The callback
//! handler is the one deliberate oddball: it parses its own body so that a malformed payload can still be answered
//! with a `200` acknowledgment, which is what Daraja requires to stop re-delivering.
use actix_web::{get, post, web, HttpResponse, Responder};
use kpg_common::Money;
use kula_payment_engine::{
    db_types::{ActorRole, NewOrder, NewTransaction, OrderId, OrderStatusType, TransactionType},
    AuditApi,
    OrderFlowApi,
    PaymentResult,
    PayoutResult,
    ReconcilerApi,
    SqliteDatabase,
};
use log::*;
use mpesa_tools::{MpesaApi, StkCallbackEnvelope};

use crate::{
    data_objects::{
        parse_amount,
        AcceptOrderParams,
        AuditActionParams,
        AuditResult,
        CallbackAck,
        JsonResponse,
        NewOrderParams,
        OrderResult,
        OrderStatusParams,
        PayoutParams,
        PayoutResponse,
        PushPaymentParams,
        PushPaymentResult,
    },
    errors::ServerError,
};

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Orders  ----------------------------------------------------
#[post("/orders")]
pub async fn create_order(
    params: web::Json<NewOrderParams>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    trace!("💻️ Received new order request for {}", params.order_id);
    let subtotal = parse_amount(params.subtotal)
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("{} is not a valid subtotal", params.subtotal)))?;
    let delivery_fee = if params.delivery_fee == 0.0 {
        Money::default()
    } else {
        parse_amount(params.delivery_fee).ok_or_else(|| {
            ServerError::InvalidRequestBody(format!("{} is not a valid delivery fee", params.delivery_fee))
        })?
    };
    if params.order_id.trim().is_empty() {
        return Err(ServerError::InvalidRequestBody("orderId must not be empty".to_string()));
    }
    let mut order =
        NewOrder::new(OrderId(params.order_id), params.customer_id, params.vendor_id, subtotal, delivery_fee);
    if let Some(address) = params.delivery_address {
        order = order.with_delivery_address(address);
    }
    let (order, _payment) = api.place_order(order).await?;
    Ok(HttpResponse::Created().json(OrderResult::from(order)))
}

#[get("/orders/{id}")]
pub async fn get_order(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

#[post("/orders/{id}/status")]
pub async fn update_order_status(
    path: web::Path<String>,
    params: web::Json<OrderStatusParams>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let params = params.into_inner();
    trace!("💻️ {} {} asks to move order {order_id} to {}", params.actor_role, params.actor_id, params.status);
    // Settling and failing payments belongs to the callback reconciler alone.
    if params.actor_role == ActorRole::Reconciler {
        return Err(ServerError::Forbidden("Payment results arrive via the gateway callback".to_string()));
    }
    let order = api.advance_order(&order_id, params.status, params.actor_role, &params.actor_id).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

#[post("/orders/{id}/accept")]
pub async fn accept_order(
    path: web::Path<String>,
    params: web::Json<AcceptOrderParams>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let order = api.accept_order(&order_id, &params.rider_id).await?;
    Ok(HttpResponse::Ok().json(OrderResult::from(order)))
}

// ---------------------------------------------   Payments  ---------------------------------------------------
#[post("/payments/push")]
pub async fn push_payment(
    params: web::Json<PushPaymentParams>,
    orders: web::Data<OrderFlowApi<SqliteDatabase>>,
    reconciler: web::Data<ReconcilerApi<SqliteDatabase>>,
    gateway: web::Data<MpesaApi>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    trace!("💻️ Received push payment request for order {}", params.order_id);
    let order_id = OrderId(params.order_id);
    let order = orders
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id} does not exist")))?;
    if order.status != OrderStatusType::PendingPayment {
        return Err(ServerError::Conflict(format!("Order {order_id} is {}, not awaiting payment", order.status)));
    }
    let amount = parse_amount(params.amount)
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("{} is not a valid amount", params.amount)))?;
    if !amount.is_within(order.total, 1) {
        return Err(ServerError::InvalidRequestBody(format!(
            "The amount {amount} does not match the order total {}",
            order.total
        )));
    }
    let payment = orders
        .fetch_pending_payment(&order_id)
        .await?
        .ok_or_else(|| ServerError::Conflict(format!("Order {order_id} has no pending payment record")))?;

    let reference = order_id.as_str().to_string();
    let response = if gateway.is_simulation() {
        gateway.simulate_stk_push(&params.phone_number, &reference)?
    } else {
        gateway.stk_push(&params.phone_number, order.total, &reference, "Kula food delivery order").await?
    };
    reconciler
        .register_push(payment.id, &response.checkout_request_id, &response.merchant_request_id, &params.phone_number)
        .await?;

    if gateway.is_simulation() {
        // Feed the synthetic settlement through the same path the real webhook takes.
        let result =
            PaymentResult::settled(response.checkout_request_id.clone(), order.total, gateway.simulate_receipt());
        reconciler.process_payment_result(result).await?;
        info!("🧪️ Order {order_id} settled synchronously in simulation mode");
    }
    Ok(HttpResponse::Ok().json(PushPaymentResult {
        checkout_request_id: response.checkout_request_id,
        response_code: response.response_code,
        customer_message: response.customer_message,
    }))
}

/// The Daraja STK result webhook.
///
/// Daraja re-delivers until it sees a `200`, so once the request reaches us the answer is always `200`: a parseable
/// payload is acknowledged with `ResultCode: 0` whatever the reconciler decides, and an unparseable one with a
/// non-zero code. All the idempotency lives in the reconciler.
#[post("/payments/callback")]
pub async fn payment_callback(
    body: web::Bytes,
    reconciler: web::Data<ReconcilerApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received payment callback ({} bytes)", body.len());
    let envelope: StkCallbackEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("💻️ Discarding a callback payload that does not parse: {e}");
            return Ok(HttpResponse::Ok().json(CallbackAck::rejected("Could not parse callback payload")));
        },
    };
    let callback = envelope.body.stk_callback;
    let result = if callback.is_success() {
        let amount = callback.amount().map(Money::from_kes_f64);
        PaymentResult {
            correlation_id: callback.checkout_request_id.clone(),
            success: true,
            amount,
            receipt: callback.receipt_number(),
            failure_reason: None,
        }
    } else {
        PaymentResult::failed(callback.checkout_request_id.clone(), callback.result_desc.clone())
    };
    // A failure here is ours, not Daraja's. Answering anything but 200 only buys a redelivery of the same
    // payload, so log it and acknowledge; the reconciler is idempotent when the retry does come.
    if let Err(e) = reconciler.process_payment_result(result).await {
        error!("💻️ Could not apply a gateway result for {}: {e}", callback.checkout_request_id);
    }
    Ok(HttpResponse::Ok().json(CallbackAck::success()))
}

#[post("/payments/payout")]
pub async fn request_payout(
    params: web::Json<PayoutParams>,
    reconciler: web::Data<ReconcilerApi<SqliteDatabase>>,
    gateway: web::Data<MpesaApi>,
) -> Result<HttpResponse, ServerError> {
    let params = params.into_inner();
    trace!("💻️ Received payout request for {}", params.user_id);
    if !matches!(params.txn_type, TransactionType::VendorPayout | TransactionType::RiderPayout) {
        return Err(ServerError::InvalidRequestBody(format!("{} is not a payout type", params.txn_type)));
    }
    let amount = parse_amount(params.amount)
        .ok_or_else(|| ServerError::InvalidRequestBody(format!("{} is not a valid amount", params.amount)))?;
    let payout =
        NewTransaction::payout(params.user_id, params.txn_type, amount, Some(params.phone_number.clone()));
    let txn = reconciler.record_payout(payout).await?;

    let response = if gateway.is_simulation() {
        gateway.simulate_b2c(&params.phone_number)?
    } else {
        gateway.b2c_payment(&params.phone_number, amount, "Kula earnings payout").await?
    };
    reconciler.register_payout(txn.id, &response.conversation_id, &params.phone_number).await?;

    if gateway.is_simulation() {
        let result = PayoutResult {
            correlation_id: response.conversation_id.clone(),
            success: true,
            receipt: Some(gateway.simulate_receipt()),
            failure_reason: None,
        };
        reconciler.process_payout_result(result).await?;
    }
    Ok(HttpResponse::Ok().json(PayoutResponse { success: true, conversation_id: response.conversation_id }))
}

// ----------------------------------------------   Audit  -----------------------------------------------------
#[get("/audit/financial")]
pub async fn financial_audit(api: web::Data<AuditApi<SqliteDatabase>>) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received financial audit request");
    let report = api.run_audit().await?;
    Ok(HttpResponse::Ok().json(AuditResult::from(report)))
}

#[post("/audit/financial")]
pub async fn financial_audit_action(
    params: web::Json<AuditActionParams>,
    api: web::Data<AuditApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    match params.action.as_str() {
        "recalculate_all" => {
            let report = api.repair().await?;
            let message = format!(
                "{} breakdowns restored, {} earnings caches rewritten",
                report.breakdowns_restored, report.caches_rewritten
            );
            Ok(HttpResponse::Ok().json(JsonResponse::success(message)))
        },
        other => Err(ServerError::InvalidRequestBody(format!("Unknown audit action '{other}'"))),
    }
}
