use chrono::{DateTime, Utc};

use crate::MpesaApiError;

/// Normalises a Kenyan MSISDN to the `2547XXXXXXXX` / `2541XXXXXXXX` form Daraja expects.
///
/// Accepts `07...`, `01...`, `+254...` and `254...` inputs. Anything else is an [`MpesaApiError::InvalidPhoneNumber`],
/// raised before any network call is made.
pub fn normalize_phone(phone: &str) -> Result<String, MpesaApiError> {
    let trimmed: String = phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    let digits = trimmed.strip_prefix('+').unwrap_or(&trimmed);
    if digits.chars().any(|c| !c.is_ascii_digit()) {
        return Err(MpesaApiError::InvalidPhoneNumber(phone.to_string()));
    }
    let msisdn = if let Some(rest) = digits.strip_prefix("254") {
        format!("254{rest}")
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("254{rest}")
    } else {
        return Err(MpesaApiError::InvalidPhoneNumber(phone.to_string()));
    };
    if msisdn.len() != 12 {
        return Err(MpesaApiError::InvalidPhoneNumber(phone.to_string()));
    }
    Ok(msisdn)
}

/// Daraja timestamps are `YYYYMMDDHHmmss` in local Nairobi time; UTC+3 with no DST.
pub fn daraja_timestamp(now: DateTime<Utc>) -> String {
    (now + chrono::Duration::hours(3)).format("%Y%m%d%H%M%S").to_string()
}

/// The STK password: base64(shortcode + passkey + timestamp).
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    base64::encode(format!("{shortcode}{passkey}{timestamp}"))
}

/// STK amounts are whole shillings, sent as a string.
pub fn daraja_amount(amount: kpg_common::Money) -> String {
    format!("{}", (amount.cents() + 50) / 100)
}
