use std::fmt::Debug;

use chrono::Duration;
use log::*;

use crate::{
    db_types::{ActorRole, NewOrder, NewTransaction, Order, OrderId, OrderStatusType, Transaction},
    helpers::commission,
    order_flow::validate_transition,
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// `OrderFlowApi` is the primary API for handling the order fulfillment lifecycle: placing orders, walking them
/// through the vendor and rider state machine, and reaping the ones that never get paid.
pub struct OrderFlowApi<B> {
    db: B,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Submit a new order.
    ///
    /// This should be a brand-new order; if the order id already exists, an error is returned. The order's total is
    /// derived from the subtotal and delivery fee, its commission split is snapshotted at the current platform rate,
    /// and a pending customer payment is recorded alongside it, all in one atomic write.
    pub async fn place_order(&self, order: NewOrder) -> Result<(Order, Transaction), PaymentGatewayError> {
        let rate = self.db.commission_rate().await?;
        let split = commission::split(order.subtotal, order.delivery_fee, rate);
        let payment = NewTransaction::customer_payment(&order, split, rate);
        let (order, payment) = self.db.insert_order_with_payment(order, payment).await?;
        debug!(
            "🔄️📦️ Order {} placed for {} ({} + {} delivery). Awaiting payment.",
            order.order_id, order.total, order.subtotal, order.delivery_fee
        );
        Ok((order, payment))
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn fetch_pending_payment(&self, order_id: &OrderId) -> Result<Option<Transaction>, PaymentGatewayError> {
        self.db.fetch_pending_payment_for_order(order_id).await
    }

    /// Move the order to `requested` on behalf of `actor`.
    ///
    /// The transition must be the immediate successor of the order's current state in the actor's slice of the
    /// graph, and `actor_id` must match the order's vendor, customer or assigned rider as appropriate. The database
    /// update is conditional on the state the order was validated against, so a racing writer cannot sneak a second
    /// transition through.
    ///
    /// The `delivered` transition additionally credits the vendor's and rider's cached earnings from the order's
    /// settled payment, atomically with the status change.
    pub async fn advance_order(
        &self,
        order_id: &OrderId,
        requested: OrderStatusType,
        actor: ActorRole,
        actor_id: &str,
    ) -> Result<Order, PaymentGatewayError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        validate_transition(order.status, requested, actor)?;
        check_ownership(&order, actor, actor_id)?;
        let order = if requested == OrderStatusType::Delivered {
            let (order, _payment) = self.db.deliver_order(order_id, actor_id).await?;
            order
        } else {
            self.db.transition_order(order_id, order.status, requested).await?
        };
        info!("🔄️📦️ Order {order_id} moved to {requested} by {actor} {actor_id}");
        Ok(order)
    }

    /// A rider claims an order that is ready for pickup. When several riders race for the same order, exactly one
    /// claim succeeds; the rest receive [`PaymentGatewayError::RiderAssignmentConflict`].
    pub async fn accept_order(&self, order_id: &OrderId, rider_id: &str) -> Result<Order, PaymentGatewayError> {
        let order = self.db.assign_rider(order_id, rider_id).await?;
        info!("🔄️📦️ Order {order_id} assigned to rider {rider_id}");
        Ok(order)
    }

    /// Delete orders that have been awaiting payment for longer than `ttl`, along with their pending payment
    /// records. Scoped to a single customer when `customer_id` is given.
    pub async fn reap_stale_orders(
        &self,
        ttl: Duration,
        customer_id: Option<&str>,
    ) -> Result<Vec<Order>, PaymentGatewayError> {
        self.db.reap_stale_orders(ttl, customer_id).await
    }

    /// Hard-delete a customer's dead-end orders (`payment_failed` and `cancelled`) together with their unsettled
    /// payment records. Delivered and completed orders stay: their settled payments back the earnings ledger.
    pub async fn clear_customer_history(&self, customer_id: &str) -> Result<Vec<Order>, PaymentGatewayError> {
        let cleared = self.db.clear_customer_history(customer_id).await?;
        info!("🔄️📦️ Customer {customer_id} cleared {} dead-end order(s) from their history", cleared.len());
        Ok(cleared)
    }

    pub async fn commission_rate(&self) -> Result<f64, PaymentGatewayError> {
        self.db.commission_rate().await
    }

    pub async fn set_commission_rate(&self, rate: f64) -> Result<(), PaymentGatewayError> {
        self.db.set_commission_rate(rate).await
    }
}

/// `actor_id` must be the party the order names for that role. Riders are checked against the assigned rider except
/// for the claim itself, which is handled by [`OrderFlowApi::accept_order`].
fn check_ownership(order: &Order, actor: ActorRole, actor_id: &str) -> Result<(), PaymentGatewayError> {
    let owned = match actor {
        ActorRole::Customer => order.customer_id == actor_id,
        ActorRole::Vendor => order.vendor_id == actor_id,
        ActorRole::Rider => order.rider_id.as_deref() == Some(actor_id),
        ActorRole::Reconciler => true,
    };
    if owned {
        Ok(())
    } else {
        Err(PaymentGatewayError::NotAParty {
            order_id: order.order_id.clone(),
            actor,
            actor_id: actor_id.to_string(),
        })
    }
}
