use log::warn;
use sqlx::SqliteConnection;

use crate::traits::PaymentGatewayError;

pub const COMMISSION_RATE_KEY: &str = "vendor_commission_percentage";
pub const DEFAULT_COMMISSION_RATE: f64 = 10.0;

/// The platform's current commission rate. Falls back to the default (with a warning) if the setting row is missing
/// or unparseable, so a corrupted settings table degrades to the stock rate rather than refusing orders.
pub async fn commission_rate(conn: &mut SqliteConnection) -> Result<f64, PaymentGatewayError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM platform_settings WHERE name = $1")
        .bind(COMMISSION_RATE_KEY)
        .fetch_optional(conn)
        .await?;
    let rate = match row {
        Some((value,)) => value.parse::<f64>().unwrap_or_else(|_| {
            warn!("🪛️ The stored commission rate '{value}' is not a number. Using {DEFAULT_COMMISSION_RATE}%");
            DEFAULT_COMMISSION_RATE
        }),
        None => {
            warn!("🪛️ No commission rate is configured. Using {DEFAULT_COMMISSION_RATE}%");
            DEFAULT_COMMISSION_RATE
        },
    };
    Ok(rate)
}

pub(crate) async fn set_commission_rate(rate: f64, conn: &mut SqliteConnection) -> Result<(), PaymentGatewayError> {
    if !(0.0..=100.0).contains(&rate) {
        return Err(PaymentGatewayError::InvalidCommissionRate(rate));
    }
    sqlx::query(
        r#"
            INSERT INTO platform_settings (name, value) VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(COMMISSION_RATE_KEY)
    .bind(rate.to_string())
    .execute(conn)
    .await?;
    Ok(())
}
