//! `SqliteDatabase` is a concrete implementation of a Kula Payment Engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the [`PaymentGatewayDatabase`] trait defined in the
//! [`crate::traits`] module.
use std::fmt::Debug;

use chrono::Duration;
use kpg_common::Money;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, earnings, new_pool, orders, settings, transactions};
use crate::{
    db_types::{CachedEarnings, EarningsRole, NewOrder, NewTransaction, Order, OrderId, OrderStatusType, Transaction},
    helpers::commission::CommissionSplit,
    traits::{LedgerTotals, PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the DB URL from the `KPG_DATABASE_URL` environment variable.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order_with_payment(
        &self,
        order: NewOrder,
        payment: NewTransaction,
    ) -> Result<(Order, Transaction), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if orders::order_exists(&order.order_id, &mut tx).await?.is_some() {
            return Err(PaymentGatewayError::OrderAlreadyExists(order.order_id));
        }
        let order = orders::insert_order(order, &mut tx).await?;
        let payment = transactions::insert_transaction(payment, &mut tx).await?;
        debug!("🗃️ Order {} saved with pending payment {} for {}", order.order_id, payment.id, payment.amount);
        tx.commit().await?;
        Ok((order, payment))
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_transaction_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let txn = transactions::fetch_by_correlation_id(correlation_id, &mut conn).await?;
        Ok(txn)
    }

    async fn fetch_pending_payment_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let txn = transactions::fetch_pending_payment_for_order(order_id, &mut conn).await?;
        Ok(txn)
    }

    async fn attach_correlation(
        &self,
        txn_id: i64,
        correlation_id: &str,
        merchant_request_id: Option<&str>,
        phone: &str,
    ) -> Result<Transaction, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let txn = transactions::attach_correlation(txn_id, correlation_id, merchant_request_id, phone, &mut conn).await?;
        trace!("🗃️ Transaction {txn_id} now carries correlation id {correlation_id}");
        Ok(txn)
    }

    async fn transition_order(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
    ) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        match orders::transition_status(order_id, expected, new_status, &mut conn).await? {
            Some(order) => Ok(order),
            None => {
                // Zero rows matched. Distinguish a lost race from a missing order for the caller.
                let order = orders::fetch_order_by_order_id(order_id, &mut conn)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
                Err(PaymentGatewayError::StatusConflict {
                    order_id: order_id.clone(),
                    expected,
                    actual: order.status,
                })
            },
        }
    }

    async fn assign_rider(&self, order_id: &OrderId, rider_id: &str) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        match orders::assign_rider(order_id, rider_id, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order {order_id} claimed by rider {rider_id}");
                Ok(order)
            },
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut conn)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
                if order.status == OrderStatusType::ReadyForPickup && order.rider_id.is_none() {
                    // Should not happen, but do not mask a racing writer as a claim conflict.
                    Err(PaymentGatewayError::DatabaseError(format!("Claim of order {order_id} matched no rows")))
                } else {
                    Err(PaymentGatewayError::RiderAssignmentConflict(order_id.clone()))
                }
            },
        }
    }

    async fn deliver_order(
        &self,
        order_id: &OrderId,
        rider_id: &str,
    ) -> Result<(Order, Option<Transaction>), PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::mark_delivered(order_id, rider_id, &mut tx).await? {
            Some(order) => order,
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
                return Err(PaymentGatewayError::StatusConflict {
                    order_id: order_id.clone(),
                    expected: OrderStatusType::InTransit,
                    actual: order.status,
                });
            },
        };
        let payment = transactions::fetch_completed_payment_for_order(order_id, &mut tx).await?;
        match payment.as_ref().and_then(|p| p.breakdown()) {
            Some(split) => {
                earnings::credit_earnings(&order.vendor_id, EarningsRole::Vendor, split.vendor_share, &mut tx).await?;
                earnings::credit_earnings(rider_id, EarningsRole::Rider, split.rider_share, &mut tx).await?;
                debug!(
                    "🗃️ Order {order_id} delivered. Credited {} to vendor {} and {} to rider {rider_id}",
                    split.vendor_share, order.vendor_id, split.rider_share
                );
            },
            None => {
                warn!(
                    "🗃️ Order {order_id} was delivered but its payment has no usable breakdown. Earnings caches were \
                     not credited; the audit job will pick this up."
                );
            },
        }
        tx.commit().await?;
        Ok((order, payment))
    }

    async fn complete_transaction_by_correlation(
        &self,
        correlation_id: &str,
        receipt: &str,
        reported_amount: Option<Money>,
        tolerance: i64,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result =
            transactions::complete_by_correlation(correlation_id, receipt, reported_amount, tolerance, &mut conn)
                .await?;
        Ok(result)
    }

    async fn fail_transaction_by_correlation(
        &self,
        correlation_id: &str,
        reason: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let result = transactions::fail_by_correlation(correlation_id, reason, &mut conn).await?;
        Ok(result)
    }

    async fn set_transaction_breakdown(
        &self,
        txn_id: i64,
        split: &CommissionSplit,
        rate: f64,
    ) -> Result<Transaction, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let txn = transactions::set_breakdown(txn_id, split, rate, &mut conn).await?;
        Ok(txn)
    }

    async fn insert_payout(&self, payout: NewTransaction) -> Result<Transaction, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let txn = transactions::insert_transaction(payout, &mut conn).await?;
        Ok(txn)
    }

    async fn reap_stale_orders(
        &self,
        ttl: Duration,
        customer_id: Option<&str>,
    ) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        // The orders are deleted before their payment rows, so the FK check must wait for the commit.
        sqlx::query("PRAGMA defer_foreign_keys = ON").execute(&mut *tx).await?;
        let reaped = orders::reap_stale(ttl, customer_id, &mut tx).await?;
        for order in &reaped {
            let n = transactions::delete_pending_payments_for_order(&order.order_id, &mut tx).await?;
            trace!("🗃️ Removed {n} pending payment(s) for reaped order {}", order.order_id);
        }
        tx.commit().await?;
        if !reaped.is_empty() {
            info!("🗃️ Reaped {} unpaid order(s) older than {} seconds", reaped.len(), ttl.num_seconds());
        }
        Ok(reaped)
    }

    async fn clear_customer_history(&self, customer_id: &str) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        // The orders are deleted before their payment rows, so the FK check must wait for the commit.
        sqlx::query("PRAGMA defer_foreign_keys = ON").execute(&mut *tx).await?;
        let cleared = orders::clear_history(customer_id, &mut tx).await?;
        for order in &cleared {
            let n = transactions::delete_unsettled_payments_for_order(&order.order_id, &mut tx).await?;
            trace!("🗃️ Removed {n} unsettled payment(s) for cleared order {}", order.order_id);
        }
        tx.commit().await?;
        if !cleared.is_empty() {
            info!("🗃️ Cleared {} dead-end order(s) from customer {customer_id}'s history", cleared.len());
        }
        Ok(cleared)
    }

    async fn commission_rate(&self) -> Result<f64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        settings::commission_rate(&mut conn).await
    }

    async fn set_commission_rate(&self, rate: f64) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        settings::set_commission_rate(rate, &mut conn).await?;
        info!("🪛️ Platform commission rate set to {rate}%");
        Ok(())
    }

    async fn fetch_cached_earnings(
        &self,
        user_id: &str,
        role: EarningsRole,
    ) -> Result<Option<CachedEarnings>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let row = earnings::fetch_earnings(user_id, role, &mut conn).await?;
        Ok(row)
    }

    async fn set_cached_earnings(
        &self,
        user_id: &str,
        role: EarningsRole,
        total: Money,
    ) -> Result<(), PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        earnings::set_earnings(user_id, role, total, &mut conn).await
    }

    async fn all_cached_earnings(&self) -> Result<Vec<CachedEarnings>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let rows = earnings::all_earnings(&mut conn).await?;
        Ok(rows)
    }

    async fn settled_share_totals(&self) -> Result<LedgerTotals, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        transactions::settled_share_totals(&mut conn).await
    }

    async fn transactions_missing_breakdown(&self) -> Result<Vec<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        transactions::missing_breakdown(&mut conn).await
    }

    async fn count_customer_payments(&self) -> Result<i64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        transactions::count_customer_payments(&mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}
