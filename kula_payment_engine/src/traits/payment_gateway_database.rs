use chrono::Duration;
use kpg_common::Money;
use thiserror::Error;

use crate::{
    db_types::{
        ActorRole,
        CachedEarnings,
        EarningsRole,
        NewOrder,
        NewTransaction,
        Order,
        OrderId,
        OrderStatusType,
        Transaction,
    },
    helpers::commission::CommissionSplit,
    order_flow::TransitionError,
    traits::data_objects::LedgerTotals,
};

/// This trait defines the behaviour a storage backend must provide to support the Kula Payment Engine.
///
/// This behaviour includes:
/// * Creating orders together with their pending customer payment record, atomically.
/// * Compare-and-swap status transitions along the fulfillment state machine.
/// * Idempotent finalization of pending transactions from gateway callbacks.
/// * The ledger queries and cache writes that back the audit and repair job.
///
/// Every mutation here is a *conditional* update: it succeeds only when the stored row is still in the expected
/// prior state. Callers must treat a "no rows matched" result as a lost race, not a bug.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Takes a new order and its pending customer payment, and in a single atomic transaction, stores both in the
    /// database. If an order with the same `order_id` already exists, [`PaymentGatewayError::OrderAlreadyExists`]
    /// is returned and nothing is written.
    ///
    /// Returns the created order and transaction records.
    async fn insert_order_with_payment(
        &self,
        order: NewOrder,
        payment: NewTransaction,
    ) -> Result<(Order, Transaction), PaymentGatewayError>;

    /// Fetches the order with the given public order id.
    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    /// Fetches the transaction carrying the given gateway correlation id.
    async fn fetch_transaction_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// Fetches the pending customer payment for the given order, if one exists.
    async fn fetch_pending_payment_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// Records the gateway correlation handles on a transaction after a push request has been accepted upstream.
    /// `merchant_request_id` is absent for B2C payouts, which only carry a `ConversationID`.
    async fn attach_correlation(
        &self,
        txn_id: i64,
        correlation_id: &str,
        merchant_request_id: Option<&str>,
        phone: &str,
    ) -> Result<Transaction, PaymentGatewayError>;

    /// Moves the order from `expected` to `new_status` in a single conditional update.
    ///
    /// If the order is no longer in `expected`, the update matches zero rows and
    /// [`PaymentGatewayError::StatusConflict`] is returned with the status the order was actually in.
    /// The `paid_at` timestamp is stamped when the new status is `Paid`.
    async fn transition_order(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<Order, PaymentGatewayError>;

    /// Claims the order for the given rider.
    ///
    /// The update is conditional on `status = 'ready_for_pickup' AND rider_id IS NULL`, so when two riders race,
    /// exactly one wins and the loser receives [`PaymentGatewayError::RiderAssignmentConflict`].
    async fn assign_rider(&self, order_id: &OrderId, rider_id: &str) -> Result<Order, PaymentGatewayError>;

    /// Marks the order delivered, and in the same database transaction, credits the cached earnings of the vendor,
    /// rider and platform from the order's completed customer payment breakdown.
    ///
    /// The status update is conditional on `in_transit`, and `delivered_at` is stamped. If the customer payment has
    /// no completed record or no breakdown, the caches are left alone and the payment (if any) is returned so the
    /// caller can log the anomaly for the audit job to find.
    async fn deliver_order(
        &self,
        order_id: &OrderId,
        rider_id: &str,
    ) -> Result<(Order, Option<Transaction>), PaymentGatewayError>;

    /// Completes the pending transaction carrying `correlation_id` in a single conditional write.
    ///
    /// The write must be keyed on the correlation id directly, never on a row id from an earlier read, so that it
    /// always operates on the latest committed state. It is conditional on the transaction still being `pending`
    /// and, when `reported_amount` is given, on that amount matching the stored one to within `tolerance` cents.
    /// `None` means no pending row satisfied the conditions; callers must read afterwards to tell a duplicate
    /// delivery apart from an unknown correlation id.
    async fn complete_transaction_by_correlation(
        &self,
        correlation_id: &str,
        receipt: &str,
        reported_amount: Option<Money>,
        tolerance: i64,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// Fails the pending transaction carrying `correlation_id`. Same conditional-write contract as
    /// [`PaymentGatewayDatabase::complete_transaction_by_correlation`].
    async fn fail_transaction_by_correlation(
        &self,
        correlation_id: &str,
        reason: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// Writes the financial breakdown columns on a transaction that is missing them.
    async fn set_transaction_breakdown(
        &self,
        txn_id: i64,
        split: &CommissionSplit,
        rate: f64,
    ) -> Result<Transaction, PaymentGatewayError>;

    /// Stores a new payout transaction (vendor or rider).
    async fn insert_payout(&self, payout: NewTransaction) -> Result<Transaction, PaymentGatewayError>;

    /// Deletes orders that have sat in `pending_payment` for longer than `ttl`, along with their pending payment
    /// records.
    ///
    /// When `customer_id` is given, only that customer's stale orders are removed. Returns the deleted orders.
    async fn reap_stale_orders(
        &self,
        ttl: Duration,
        customer_id: Option<&str>,
    ) -> Result<Vec<Order>, PaymentGatewayError>;

    /// Hard-deletes a customer's orders that ended in `payment_failed` or `cancelled`, along with their unsettled
    /// payment records. Delivered and completed orders are retained: their settled payments back the earnings
    /// ledger. Returns the deleted orders.
    async fn clear_customer_history(&self, customer_id: &str) -> Result<Vec<Order>, PaymentGatewayError>;

    /// The platform's current commission rate, as a percentage of the order subtotal.
    async fn commission_rate(&self) -> Result<f64, PaymentGatewayError>;

    /// Updates the platform commission rate. Only affects orders paid after the change.
    async fn set_commission_rate(&self, rate: f64) -> Result<(), PaymentGatewayError>;

    /// Fetches a single entity's cached earnings figure, if one has been written.
    async fn fetch_cached_earnings(
        &self,
        user_id: &str,
        role: EarningsRole,
    ) -> Result<Option<CachedEarnings>, PaymentGatewayError>;

    /// Overwrites (or creates) an entity's cached earnings figure.
    async fn set_cached_earnings(
        &self,
        user_id: &str,
        role: EarningsRole,
        total: Money,
    ) -> Result<(), PaymentGatewayError>;

    /// All cached earnings rows, for the audit's comparison pass.
    async fn all_cached_earnings(&self) -> Result<Vec<CachedEarnings>, PaymentGatewayError>;

    /// The ledger-derived source of truth: per-entity sums over completed customer payments whose orders reached
    /// `delivered` or `completed`.
    async fn settled_share_totals(&self) -> Result<LedgerTotals, PaymentGatewayError>;

    /// Completed customer payments that are missing their financial breakdown, oldest first.
    async fn transactions_missing_breakdown(&self) -> Result<Vec<Transaction>, PaymentGatewayError>;

    /// The number of customer payment records in the ledger. Used by the audit report.
    async fn count_customer_payments(&self) -> Result<i64, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested transaction (internal id {0}) does not exist")]
    TransactionNotFound(i64),
    #[error("Order {order_id} is in status {actual}, not {expected}")]
    StatusConflict { order_id: OrderId, expected: OrderStatusType, actual: OrderStatusType },
    #[error("Order {0} has already been claimed by another rider")]
    RiderAssignmentConflict(OrderId),
    #[error("{0}")]
    InvalidTransition(#[from] TransitionError),
    #[error("The {actor} {actor_id} is not a party to order {order_id}")]
    NotAParty { order_id: OrderId, actor: ActorRole, actor_id: String },
    #[error("The commission rate {0} is not a percentage between 0 and 100")]
    InvalidCommissionRate(f64),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
