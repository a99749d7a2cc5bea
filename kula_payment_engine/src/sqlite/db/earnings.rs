use kpg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CachedEarnings, EarningsRole},
    traits::PaymentGatewayError,
};

pub async fn fetch_earnings(
    user_id: &str,
    role: EarningsRole,
    conn: &mut SqliteConnection,
) -> Result<Option<CachedEarnings>, sqlx::Error> {
    let row = sqlx::query_as("SELECT * FROM cached_earnings WHERE user_id = $1 AND role = $2")
        .bind(user_id)
        .bind(role)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn all_earnings(conn: &mut SqliteConnection) -> Result<Vec<CachedEarnings>, sqlx::Error> {
    let rows = sqlx::query_as("SELECT * FROM cached_earnings ORDER BY role, user_id").fetch_all(conn).await?;
    Ok(rows)
}

/// Adds `amount` to the entity's cached total, creating the row if it does not exist yet.
pub(crate) async fn credit_earnings(
    user_id: &str,
    role: EarningsRole,
    amount: Money,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        r#"
            INSERT INTO cached_earnings (user_id, role, total_earnings) VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role) DO UPDATE SET
                total_earnings = total_earnings + excluded.total_earnings,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(user_id)
    .bind(role)
    .bind(amount)
    .execute(conn)
    .await?;
    Ok(())
}

/// Overwrites the entity's cached total. This is the repair path; normal crediting is incremental.
pub(crate) async fn set_earnings(
    user_id: &str,
    role: EarningsRole,
    total: Money,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query(
        r#"
            INSERT INTO cached_earnings (user_id, role, total_earnings) VALUES ($1, $2, $3)
            ON CONFLICT (user_id, role) DO UPDATE SET
                total_earnings = excluded.total_earnings,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(user_id)
    .bind(role)
    .bind(total)
    .execute(conn)
    .await?;
    Ok(())
}
