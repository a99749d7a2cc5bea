use chrono::Duration;
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    traits::PaymentGatewayError,
};

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let total = order.total();
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                vendor_id,
                subtotal,
                delivery_fee,
                total,
                delivery_address
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.customer_id)
    .bind(order.vendor_id)
    .bind(order.subtotal)
    .bind(order.delivery_fee)
    .bind(total)
    .bind(order.delivery_address)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order [{}] inserted with id {}", order.order_id, order.id);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Checks whether the order with the given `OrderId` already exists in the database. If it does exist, the `id` of the
/// order is returned. If it does not exist, `None` is returned.
pub async fn order_exists(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<i64>, PaymentGatewayError> {
    let order = fetch_order_by_order_id(order_id, conn).await?;
    Ok(order.map(|o| o.id))
}

/// Moves the order to `new_status`, conditional on it still being in `expected`. Returns `None` when zero rows
/// matched, which means another writer got there first (or the order does not exist).
///
/// `paid_at` is stamped when the new status is `paid`.
pub(crate) async fn transition_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    new_status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                updated_at = CURRENT_TIMESTAMP,
                paid_at = CASE WHEN $1 = 'paid' THEN CURRENT_TIMESTAMP ELSE paid_at END
            WHERE order_id = $2 AND status = $3
            RETURNING *;
        "#,
    )
    .bind(new_status.as_str())
    .bind(order_id.as_str())
    .bind(expected.as_str())
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Transition {order_id}: {expected} -> {new_status}. Won: {}", result.is_some());
    Ok(result)
}

/// Claims the order for `rider_id`. Conditional on the order being `ready_for_pickup` with no rider attached, so
/// exactly one of any number of racing claims succeeds.
pub(crate) async fn assign_rider(
    order_id: &OrderId,
    rider_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                rider_id = $1,
                status = 'assigned_to_rider',
                updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $2 AND status = 'ready_for_pickup' AND rider_id IS NULL
            RETURNING *;
        "#,
    )
    .bind(rider_id)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Marks the order delivered. Conditional on `in_transit` and on `rider_id` matching the assigned rider.
pub(crate) async fn mark_delivered(
    order_id: &OrderId,
    rider_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = 'delivered',
                updated_at = CURRENT_TIMESTAMP,
                delivered_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND status = 'in_transit' AND rider_id = $2
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(rider_id)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Hard-deletes a customer's orders that ended in a dead-end terminal state. `delivered`/`completed` orders are
/// kept: their settled payments back the earnings ledger and must remain auditable.
pub(crate) async fn clear_history(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PaymentGatewayError> {
    let rows = sqlx::query_as(
        r#"
            DELETE FROM orders
            WHERE customer_id = $1 AND status IN ('payment_failed', 'cancelled')
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Deletes orders that have sat in `pending_payment` for longer than `ttl`, optionally scoped to one customer.
/// Returns the deleted rows so the caller can clean up their payment records and log the reaping.
pub(crate) async fn reap_stale(
    ttl: Duration,
    customer_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PaymentGatewayError> {
    let rows = match customer_id {
        Some(cid) => {
            sqlx::query_as(
                format!(
                    "DELETE FROM orders WHERE status = 'pending_payment' AND customer_id = $1 AND \
                     (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *;",
                    ttl.num_seconds()
                )
                .as_str(),
            )
            .bind(cid)
            .fetch_all(conn)
            .await?
        },
        None => {
            sqlx::query_as(
                format!(
                    "DELETE FROM orders WHERE status = 'pending_payment' AND \
                     (unixepoch(CURRENT_TIMESTAMP) - unixepoch(created_at)) > {} RETURNING *;",
                    ttl.num_seconds()
                )
                .as_str(),
            )
            .fetch_all(conn)
            .await?
        },
    };
    Ok(rows)
}
