use std::fmt::Debug;

use kpg_common::Money;
use log::*;

use crate::{
    db_types::{NewTransaction, Order, OrderStatusType, Transaction},
    helpers::commission,
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// Settlements may arrive a cent off from what was requested due to rounding at the gateway. Anything further out
/// is treated as a failed payment.
pub const AMOUNT_TOLERANCE_CENTS: i64 = 1;

/// A gateway payment result, normalized from the callback payload (or synthesized by the simulator). The reconciler
/// neither knows nor cares which.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub correlation_id: String,
    pub success: bool,
    /// The settled amount as reported by the gateway. Absent on failures.
    pub amount: Option<Money>,
    pub receipt: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentResult {
    pub fn settled(correlation_id: String, amount: Money, receipt: String) -> Self {
        Self { correlation_id, success: true, amount: Some(amount), receipt: Some(receipt), failure_reason: None }
    }

    pub fn failed(correlation_id: String, reason: String) -> Self {
        Self { correlation_id, success: false, amount: None, receipt: None, failure_reason: Some(reason) }
    }
}

/// A gateway result for an outbound payout.
#[derive(Debug, Clone)]
pub struct PayoutResult {
    pub correlation_id: String,
    pub success: bool,
    pub receipt: Option<String>,
    pub failure_reason: Option<String>,
}

/// What applying a gateway result actually did.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The transaction was finalized. For customer payments, the updated order is included when the status
    /// transition also went through.
    Applied { transaction: Transaction, order: Option<Order> },
    /// The transaction had already been finalized. Expected under at-least-once delivery; nothing was changed.
    Duplicate,
    /// No transaction carries this correlation id. Logged and dropped.
    Unmatched,
}

/// `ReconcilerApi` applies asynchronous gateway results to the ledger and the order book.
///
/// It is the only component allowed to settle or fail a payment. Every mutation is idempotent: results are applied
/// with a conditional update keyed on the transaction still being pending, so a redelivered callback is a no-op.
pub struct ReconcilerApi<B> {
    db: B,
}

impl<B> Debug for ReconcilerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi")
    }
}

impl<B> ReconcilerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReconcilerApi<B>
where B: PaymentGatewayDatabase
{
    /// Records the gateway correlation handles on a pending payment once the push request has been accepted
    /// upstream. Results arriving later are matched on the correlation id alone.
    pub async fn register_push(
        &self,
        txn_id: i64,
        correlation_id: &str,
        merchant_request_id: &str,
        phone: &str,
    ) -> Result<Transaction, PaymentGatewayError> {
        let txn = self.db.attach_correlation(txn_id, correlation_id, Some(merchant_request_id), phone).await?;
        debug!("🔄️💰️ Payment {} is in flight with correlation id {correlation_id}", txn.id);
        Ok(txn)
    }

    /// Apply a customer payment result.
    ///
    /// On success the payment is completed and the order moves to `paid`; on failure the payment is failed and the
    /// order moves to `payment_failed`. A settled amount that differs from the requested amount by more than
    /// [`AMOUNT_TOLERANCE_CENTS`] is treated as a failure. Duplicate deliveries and unknown correlation ids are
    /// absorbed without touching anything.
    ///
    /// The finalization is a single conditional write keyed on the correlation id, never on an earlier read, so it
    /// cannot miss a registration committed a moment ago on another connection. Only when the write matches nothing
    /// is a read used to tell a duplicate delivery apart from an unknown correlation id.
    pub async fn process_payment_result(&self, result: PaymentResult) -> Result<ReconcileOutcome, PaymentGatewayError> {
        let correlation_id = result.correlation_id.as_str();
        let settled = if result.success {
            let receipt = result.receipt.clone().unwrap_or_default();
            let completed = self
                .db
                .complete_transaction_by_correlation(correlation_id, &receipt, result.amount, AMOUNT_TOLERANCE_CENTS)
                .await?;
            match completed {
                Some(txn) => {
                    let txn = self.ensure_breakdown(txn).await?;
                    Some((txn, OrderStatusType::Paid))
                },
                None => match result.amount {
                    // A pending row exists but the reported amount does not match it, or nothing is pending at
                    // all. The conditional failure write settles which: it only fires on a live pending row.
                    Some(amount) => {
                        let reason = format!("Settled amount {amount} does not match the requested amount");
                        match self.db.fail_transaction_by_correlation(correlation_id, &reason).await? {
                            Some(txn) => {
                                warn!(
                                    "🔄️💰️ Settlement for transaction {} reported {amount} but {} was requested. \
                                     Failing the payment.",
                                    txn.id, txn.amount
                                );
                                Some((txn, OrderStatusType::PaymentFailed))
                            },
                            None => None,
                        }
                    },
                    None => None,
                },
            }
        } else {
            let reason = result.failure_reason.clone().unwrap_or_else(|| "Payment failed".to_string());
            self.db
                .fail_transaction_by_correlation(correlation_id, &reason)
                .await?
                .map(|txn| (txn, OrderStatusType::PaymentFailed))
        };
        let Some((txn, new_order_status)) = settled else {
            return self.unapplied_outcome(correlation_id).await;
        };
        let order = match &txn.order_id {
            Some(order_id) => {
                match self.db.transition_order(order_id, OrderStatusType::PendingPayment, new_order_status).await {
                    Ok(order) => {
                        info!("🔄️💰️ Order {order_id} is now {new_order_status}");
                        Some(order)
                    },
                    Err(PaymentGatewayError::StatusConflict { actual, .. }) => {
                        warn!(
                            "🔄️💰️ Payment {} settled but order {order_id} is {actual}, not pending_payment. The \
                             ledger is updated; the order was left alone.",
                            txn.id
                        );
                        None
                    },
                    Err(e) => return Err(e),
                }
            },
            None => None,
        };
        Ok(ReconcileOutcome::Applied { transaction: txn, order })
    }

    /// Apply a payout result. Payouts have no order attached, so only the ledger entry is finalized. The same
    /// correlation-keyed conditional write as the payment path applies.
    pub async fn process_payout_result(&self, result: PayoutResult) -> Result<ReconcileOutcome, PaymentGatewayError> {
        let correlation_id = result.correlation_id.as_str();
        let settled = if result.success {
            let receipt = result.receipt.clone().unwrap_or_default();
            self.db.complete_transaction_by_correlation(correlation_id, &receipt, None, 0).await?
        } else {
            let reason = result.failure_reason.clone().unwrap_or_else(|| "Payout failed".to_string());
            self.db.fail_transaction_by_correlation(correlation_id, &reason).await?
        };
        match settled {
            Some(txn) => {
                info!("🔄️💸️ Payout {} is now {}", txn.id, txn.status);
                Ok(ReconcileOutcome::Applied { transaction: txn, order: None })
            },
            None => self.unapplied_outcome(correlation_id).await,
        }
    }

    /// Record an outbound payout before handing it to the gateway.
    pub async fn record_payout(&self, payout: NewTransaction) -> Result<Transaction, PaymentGatewayError> {
        let txn = self.db.insert_payout(payout).await?;
        debug!("🔄️💸️ Payout {} of {} recorded for {}", txn.id, txn.amount, txn.user_id);
        Ok(txn)
    }

    /// Attach the gateway correlation id to a payout so its result can be matched later. Payouts carry no
    /// `MerchantRequestID`.
    pub async fn register_payout(
        &self,
        txn_id: i64,
        correlation_id: &str,
        phone: &str,
    ) -> Result<Transaction, PaymentGatewayError> {
        self.db.attach_correlation(txn_id, correlation_id, None, phone).await
    }

    /// Derives and stores the commission breakdown on a just-completed payment that was settled without one. The
    /// rate snapshotted at order time takes precedence over the live rate so late settlements are not repriced.
    /// A payment whose order is gone is left as-is for the audit job to flag.
    async fn ensure_breakdown(&self, txn: Transaction) -> Result<Transaction, PaymentGatewayError> {
        if txn.has_breakdown() {
            return Ok(txn);
        }
        let Some(order_id) = txn.order_id.clone() else {
            return Ok(txn);
        };
        let Some(order) = self.db.fetch_order_by_order_id(&order_id).await? else {
            warn!(
                "🔄️💰️ Transaction {} settled without a breakdown and order {order_id} is gone. The audit job will \
                 flag it.",
                txn.id
            );
            return Ok(txn);
        };
        let rate = match txn.commission_rate {
            Some(rate) => rate,
            None => self.db.commission_rate().await?,
        };
        let split = commission::split(order.subtotal, order.delivery_fee, rate);
        debug!("🔄️💰️ Derived a missing breakdown for transaction {} at {rate}%", txn.id);
        self.db.set_transaction_breakdown(txn.id, &split, rate).await
    }

    /// The conditional writes matched nothing. A plain read is safe to interpret now: either the transaction is
    /// already terminal (a duplicate delivery) or nothing carries the correlation id at all.
    async fn unapplied_outcome(&self, correlation_id: &str) -> Result<ReconcileOutcome, PaymentGatewayError> {
        match self.db.fetch_transaction_by_correlation_id(correlation_id).await? {
            Some(_) => {
                debug!("🔄️ Duplicate result for correlation id {correlation_id}. The transaction is already settled.");
                Ok(ReconcileOutcome::Duplicate)
            },
            None => {
                warn!(
                    "🔄️ A gateway result arrived for correlation id {correlation_id} but no transaction carries it. \
                     Dropping it."
                );
                Ok(ReconcileOutcome::Unmatched)
            },
        }
    }
}
