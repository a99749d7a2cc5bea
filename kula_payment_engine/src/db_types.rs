use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use kpg_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

use crate::helpers::commission::CommissionSplit;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The public identifier of an order, assigned by the ordering front-end.
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
/// The order fulfillment vocabulary. The snake_case strings are part of the wire and storage contract; do not rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// Newly created; the STK push has not been confirmed yet.
    PendingPayment,
    /// Payment settled in full.
    Paid,
    /// The payment result came back as a failure. Terminal, but the order remains inspectable.
    PaymentFailed,
    /// The vendor has accepted the order.
    Confirmed,
    Preparing,
    ReadyForPickup,
    AssignedToRider,
    PickedUp,
    InTransit,
    /// The rider has handed the order over. Earnings are credited on this transition.
    Delivered,
    /// The customer confirmed receipt. Terminal.
    Completed,
    /// Terminal. Only reachable from `PendingPayment`.
    Cancelled,
}

impl OrderStatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusType::PendingPayment => "pending_payment",
            OrderStatusType::Paid => "paid",
            OrderStatusType::PaymentFailed => "payment_failed",
            OrderStatusType::Confirmed => "confirmed",
            OrderStatusType::Preparing => "preparing",
            OrderStatusType::ReadyForPickup => "ready_for_pickup",
            OrderStatusType::AssignedToRider => "assigned_to_rider",
            OrderStatusType::PickedUp => "picked_up",
            OrderStatusType::InTransit => "in_transit",
            OrderStatusType::Delivered => "delivered",
            OrderStatusType::Completed => "completed",
            OrderStatusType::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::PaymentFailed | OrderStatusType::Completed | OrderStatusType::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "payment_failed" => Ok(Self::PaymentFailed),
            "confirmed" => Ok(Self::Confirmed),
            "preparing" => Ok(Self::Preparing),
            "ready_for_pickup" => Ok(Self::ReadyForPickup),
            "assigned_to_rider" => Ok(Self::AssignedToRider),
            "picked_up" => Ok(Self::PickedUp),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to PendingPayment");
            OrderStatusType::PendingPayment
        })
    }
}

//--------------------------------------      ActorRole        -------------------------------------------------------
/// Who is asking for an order transition. The state machine grants each actor its own slice of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Customer,
    Vendor,
    Rider,
    /// The callback reconciler. The only actor allowed to settle or fail a payment.
    Reconciler,
}

impl Display for ActorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorRole::Customer => write!(f, "customer"),
            ActorRole::Vendor => write!(f, "vendor"),
            ActorRole::Rider => write!(f, "rider"),
            ActorRole::Reconciler => write!(f, "reconciler"),
        }
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub vendor_id: String,
    pub rider_id: Option<String>,
    pub status: OrderStatusType,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub total: Money,
    pub delivery_address: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub vendor_id: String,
    pub subtotal: Money,
    pub delivery_fee: Money,
    pub delivery_address: String,
}

impl NewOrder {
    pub fn new(order_id: OrderId, customer_id: String, vendor_id: String, subtotal: Money, delivery_fee: Money) -> Self {
        Self { order_id, customer_id, vendor_id, subtotal, delivery_fee, delivery_address: String::default() }
    }

    pub fn with_delivery_address(mut self, address: String) -> Self {
        self.delivery_address = address;
        self
    }

    /// `total` is always derived; it is never accepted from a client.
    pub fn total(&self) -> Money {
        self.subtotal + self.delivery_fee
    }
}

//--------------------------------------   TransactionType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    CustomerPayment,
    VendorPayout,
    RiderPayout,
    Refund,
    PlatformCommission,
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::CustomerPayment => write!(f, "customer_payment"),
            TransactionType::VendorPayout => write!(f, "vendor_payout"),
            TransactionType::RiderPayout => write!(f, "rider_payout"),
            TransactionType::Refund => write!(f, "refund"),
            TransactionType::PlatformCommission => write!(f, "platform_commission"),
        }
    }
}

//--------------------------------------  TransactionStatus    -------------------------------------------------------
/// Transaction lifecycle. Monotonic: once a transaction leaves `Pending` it never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Refunded => write!(f, "refunded"),
        }
    }
}

//--------------------------------------     Transaction       -------------------------------------------------------
/// A ledger entry. Customer payments are created alongside their order and finalized exactly once by the reconciler;
/// payouts are created on request and finalized by the payout result handler.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub order_id: Option<OrderId>,
    pub user_id: String,
    pub txn_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Money,
    pub vendor_share: Option<Money>,
    pub rider_share: Option<Money>,
    pub platform_commission: Option<Money>,
    /// The global commission percentage at creation time, snapshotted so that later recomputation is reproducible.
    pub commission_rate: Option<f64>,
    /// The gateway-assigned request id (`CheckoutRequestID` / `ConversationID`). Unique per in-flight payment.
    pub correlation_id: Option<String>,
    pub merchant_request_id: Option<String>,
    /// The M-Pesa receipt number reported by the settlement.
    pub receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn has_breakdown(&self) -> bool {
        self.vendor_share.is_some() && self.rider_share.is_some() && self.platform_commission.is_some()
    }

    pub fn breakdown(&self) -> Option<CommissionSplit> {
        match (self.platform_commission, self.vendor_share, self.rider_share) {
            (Some(platform_commission), Some(vendor_share), Some(rider_share)) => {
                Some(CommissionSplit { platform_commission, vendor_share, rider_share })
            },
            _ => None,
        }
    }
}

//--------------------------------------    NewTransaction     -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub order_id: Option<OrderId>,
    pub user_id: String,
    pub txn_type: TransactionType,
    pub amount: Money,
    pub breakdown: Option<CommissionSplit>,
    pub commission_rate: Option<f64>,
    pub phone: Option<String>,
}

impl NewTransaction {
    pub fn customer_payment(order: &NewOrder, split: CommissionSplit, rate: f64) -> Self {
        Self {
            order_id: Some(order.order_id.clone()),
            user_id: order.customer_id.clone(),
            txn_type: TransactionType::CustomerPayment,
            amount: order.total(),
            breakdown: Some(split),
            commission_rate: Some(rate),
            phone: None,
        }
    }

    pub fn payout(user_id: String, txn_type: TransactionType, amount: Money, phone: Option<String>) -> Self {
        Self { order_id: None, user_id, txn_type, amount, breakdown: None, commission_rate: None, phone }
    }
}

//--------------------------------------    EarningsRole       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EarningsRole {
    Vendor,
    Rider,
}

impl Display for EarningsRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EarningsRole::Vendor => write!(f, "vendor"),
            EarningsRole::Rider => write!(f, "rider"),
        }
    }
}

//--------------------------------------   CachedEarnings      -------------------------------------------------------
/// A denormalized running total of what a vendor or rider has earned. This is a cache: the source of truth is the
/// sum of completed-payment shares over delivered orders, which is exactly what the audit job verifies.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CachedEarnings {
    pub user_id: String,
    pub role: EarningsRole,
    pub total_earnings: Money,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_round_trips_through_wire_strings() {
        let all = [
            OrderStatusType::PendingPayment,
            OrderStatusType::Paid,
            OrderStatusType::PaymentFailed,
            OrderStatusType::Confirmed,
            OrderStatusType::Preparing,
            OrderStatusType::ReadyForPickup,
            OrderStatusType::AssignedToRider,
            OrderStatusType::PickedUp,
            OrderStatusType::InTransit,
            OrderStatusType::Delivered,
            OrderStatusType::Completed,
            OrderStatusType::Cancelled,
        ];
        for status in all {
            assert_eq!(status.as_str().parse::<OrderStatusType>().unwrap(), status);
        }
        assert_eq!(OrderStatusType::PendingPayment.as_str(), "pending_payment");
        assert_eq!(OrderStatusType::ReadyForPickup.as_str(), "ready_for_pickup");
    }

    #[test]
    fn new_order_total_is_derived() {
        let order = NewOrder::new(
            "ord-1".parse().unwrap(),
            "cust-1".into(),
            "vend-1".into(),
            Money::from_kes(1000),
            Money::from_kes(100),
        );
        assert_eq!(order.total(), Money::from_kes(1100));
    }
}
