use kpg_common::Money;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransaction, OrderId, Transaction},
    helpers::commission::CommissionSplit,
    traits::{LedgerTotals, PaymentGatewayError, ShareTotal},
};

pub async fn insert_transaction(
    txn: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, PaymentGatewayError> {
    let (vendor_share, rider_share, platform_commission) = match txn.breakdown {
        Some(split) => (Some(split.vendor_share), Some(split.rider_share), Some(split.platform_commission)),
        None => (None, None, None),
    };
    let txn: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                order_id,
                user_id,
                txn_type,
                amount,
                vendor_share,
                rider_share,
                platform_commission,
                commission_rate,
                phone
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(txn.order_id)
    .bind(txn.user_id)
    .bind(txn.txn_type)
    .bind(txn.amount)
    .bind(vendor_share)
    .bind(rider_share)
    .bind(platform_commission)
    .bind(txn.commission_rate)
    .bind(txn.phone)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ {} transaction {} recorded for {}", txn.txn_type, txn.id, txn.amount);
    Ok(txn)
}

pub async fn fetch_by_correlation_id(
    correlation_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let txn = sqlx::query_as("SELECT * FROM transactions WHERE correlation_id = $1")
        .bind(correlation_id)
        .fetch_optional(conn)
        .await?;
    Ok(txn)
}

/// The order's customer payment that is still awaiting its gateway result, if any.
pub async fn fetch_pending_payment_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let txn = sqlx::query_as(
        "SELECT * FROM transactions WHERE order_id = $1 AND txn_type = 'customer_payment' AND status = 'pending'",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(txn)
}

/// The order's settled customer payment, if the reconciler has completed one.
pub async fn fetch_completed_payment_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let txn = sqlx::query_as(
        "SELECT * FROM transactions WHERE order_id = $1 AND txn_type = 'customer_payment' AND status = 'completed'",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(txn)
}

/// Records the gateway correlation handles on the transaction once the push request has been accepted upstream.
/// `merchant_request_id` is None for B2C payouts, which only carry a `ConversationID`.
pub(crate) async fn attach_correlation(
    txn_id: i64,
    correlation_id: &str,
    merchant_request_id: Option<&str>,
    phone: &str,
    conn: &mut SqliteConnection,
) -> Result<Transaction, PaymentGatewayError> {
    let result: Option<Transaction> = sqlx::query_as(
        r#"
            UPDATE transactions SET
                correlation_id = $1,
                merchant_request_id = $2,
                phone = $3,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $4 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(correlation_id)
    .bind(merchant_request_id)
    .bind(phone)
    .bind(txn_id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(PaymentGatewayError::TransactionNotFound(txn_id))
}

/// Completes the pending transaction carrying this correlation id.
///
/// The write is keyed on the correlation id itself rather than on a previously read row id, so it always operates
/// on the latest committed state. It is conditional on `status = 'pending'` and, when the gateway reported a
/// settled amount, on that amount matching the stored one to within `tolerance` cents. `None` means no pending
/// row satisfied those conditions.
pub(crate) async fn complete_by_correlation(
    correlation_id: &str,
    receipt: &str,
    reported_amount: Option<Money>,
    tolerance: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, PaymentGatewayError> {
    let result: Option<Transaction> = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = 'completed',
                receipt = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE correlation_id = $1 AND status = 'pending'
              AND ($3 IS NULL OR ABS(amount - $3) <= $4)
            RETURNING *;
        "#,
    )
    .bind(correlation_id)
    .bind(receipt)
    .bind(reported_amount)
    .bind(tolerance)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Complete transaction for correlation id {correlation_id}. Applied: {}", result.is_some());
    Ok(result)
}

/// Fails the pending transaction carrying this correlation id. Same conditional-write contract as
/// [`complete_by_correlation`]: `None` means nothing was pending under this correlation id.
pub(crate) async fn fail_by_correlation(
    correlation_id: &str,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, PaymentGatewayError> {
    let result: Option<Transaction> = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = 'failed',
                failure_reason = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE correlation_id = $1 AND status = 'pending'
            RETURNING *;
        "#,
    )
    .bind(correlation_id)
    .bind(reason)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Fail transaction for correlation id {correlation_id}. Applied: {}", result.is_some());
    Ok(result)
}

pub(crate) async fn set_breakdown(
    txn_id: i64,
    split: &CommissionSplit,
    rate: f64,
    conn: &mut SqliteConnection,
) -> Result<Transaction, PaymentGatewayError> {
    let result: Option<Transaction> = sqlx::query_as(
        r#"
            UPDATE transactions SET
                vendor_share = $1,
                rider_share = $2,
                platform_commission = $3,
                commission_rate = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(split.vendor_share)
    .bind(split.rider_share)
    .bind(split.platform_commission)
    .bind(rate)
    .bind(txn_id)
    .fetch_optional(conn)
    .await?;
    result.ok_or(PaymentGatewayError::TransactionNotFound(txn_id))
}

/// Removes the unsettled payment records of an order being cleared from a customer's history. Orders eligible for
/// clearing never settled, so completed rows (which back the earnings ledger) are not touched.
pub(crate) async fn delete_unsettled_payments_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<u64, PaymentGatewayError> {
    let res = sqlx::query(
        "DELETE FROM transactions WHERE order_id = $1 AND txn_type = 'customer_payment' AND status != 'completed'",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

/// Removes the pending payment records belonging to a reaped order.
pub(crate) async fn delete_pending_payments_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<u64, PaymentGatewayError> {
    let res = sqlx::query(
        "DELETE FROM transactions WHERE order_id = $1 AND txn_type = 'customer_payment' AND status = 'pending'",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

/// The ledger-derived earnings totals: completed customer payments joined to orders that reached `delivered` or
/// `completed`. This is the audit's source of truth.
pub(crate) async fn settled_share_totals(conn: &mut SqliteConnection) -> Result<LedgerTotals, PaymentGatewayError> {
    let vendors: Vec<ShareTotal> = sqlx::query_as(
        r#"
            SELECT o.vendor_id AS user_id, CAST(SUM(t.vendor_share) AS INTEGER) AS total
            FROM transactions t JOIN orders o ON t.order_id = o.order_id
            WHERE t.txn_type = 'customer_payment' AND t.status = 'completed'
              AND o.status IN ('delivered', 'completed')
              AND t.vendor_share IS NOT NULL
            GROUP BY o.vendor_id;
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    let riders: Vec<ShareTotal> = sqlx::query_as(
        r#"
            SELECT o.rider_id AS user_id, CAST(SUM(t.rider_share) AS INTEGER) AS total
            FROM transactions t JOIN orders o ON t.order_id = o.order_id
            WHERE t.txn_type = 'customer_payment' AND t.status = 'completed'
              AND o.status IN ('delivered', 'completed')
              AND t.rider_share IS NOT NULL AND o.rider_id IS NOT NULL
            GROUP BY o.rider_id;
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;
    let (platform_commission,): (i64,) = sqlx::query_as(
        r#"
            SELECT CAST(COALESCE(SUM(t.platform_commission), 0) AS INTEGER)
            FROM transactions t JOIN orders o ON t.order_id = o.order_id
            WHERE t.txn_type = 'customer_payment' AND t.status = 'completed'
              AND o.status IN ('delivered', 'completed');
        "#,
    )
    .fetch_one(conn)
    .await?;
    Ok(LedgerTotals { vendors, riders, platform_commission: platform_commission.into() })
}

/// Completed customer payments that were settled without a financial breakdown, oldest first.
pub(crate) async fn missing_breakdown(conn: &mut SqliteConnection) -> Result<Vec<Transaction>, PaymentGatewayError> {
    let rows = sqlx::query_as(
        r#"
            SELECT * FROM transactions
            WHERE txn_type = 'customer_payment' AND status = 'completed'
              AND (vendor_share IS NULL OR rider_share IS NULL OR platform_commission IS NULL)
            ORDER BY created_at ASC;
        "#,
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub(crate) async fn count_customer_payments(conn: &mut SqliteConnection) -> Result<i64, PaymentGatewayError> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE txn_type = 'customer_payment'")
        .fetch_one(conn)
        .await?;
    Ok(count)
}
