//! Wire DTOs.
//!
//! Clients exchange decimal KES amounts (`f64`); everything behind the routes deals in [`Money`] cents. The
//! conversions happen here and nowhere else.
use std::fmt::Display;

use chrono::{DateTime, Utc};
use kpg_common::Money;
use kula_payment_engine::{
    audit_objects::{AuditReport, AuditVerdict},
    db_types::{ActorRole, Order, OrderStatusType, TransactionType},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

//--------------------------------------       Orders          -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderParams {
    pub order_id: String,
    pub customer_id: String,
    pub vendor_id: String,
    /// Decimal KES.
    pub subtotal: f64,
    pub delivery_fee: f64,
    #[serde(default)]
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusParams {
    pub status: OrderStatusType,
    pub actor_role: ActorRole,
    pub actor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOrderParams {
    pub rider_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResult {
    pub order_id: String,
    pub customer_id: String,
    pub vendor_id: String,
    pub rider_id: Option<String>,
    pub status: OrderStatusType,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total: f64,
    pub delivery_address: String,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResult {
    fn from(o: Order) -> Self {
        Self {
            order_id: o.order_id.0,
            customer_id: o.customer_id,
            vendor_id: o.vendor_id,
            rider_id: o.rider_id,
            status: o.status,
            subtotal: o.subtotal.to_kes_f64(),
            delivery_fee: o.delivery_fee.to_kes_f64(),
            total: o.total.to_kes_f64(),
            delivery_address: o.delivery_address,
            created_at: o.created_at,
            paid_at: o.paid_at,
            delivered_at: o.delivered_at,
        }
    }
}

//--------------------------------------      Payments         -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPaymentParams {
    pub order_id: String,
    pub phone_number: String,
    /// Decimal KES. Must equal the order total to within one cent.
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPaymentResult {
    pub checkout_request_id: String,
    pub response_code: String,
    pub customer_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutParams {
    pub user_id: String,
    /// Decimal KES.
    pub amount: f64,
    #[serde(rename = "type")]
    pub txn_type: TransactionType,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResponse {
    pub success: bool,
    pub conversation_id: String,
}

/// The acknowledgment Daraja expects from a webhook, success or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    pub result_code: i64,
    pub result_desc: String,
}

impl CallbackAck {
    pub fn success() -> Self {
        Self { result_code: 0, result_desc: "Success".to_string() }
    }

    pub fn rejected(desc: impl Display) -> Self {
        Self { result_code: 1, result_desc: desc.to_string() }
    }
}

//--------------------------------------        Audit          -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActionParams {
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total_transactions: i64,
    pub missing_financial_breakdown: usize,
    pub vendor_discrepancies: usize,
    pub rider_discrepancies: usize,
    /// Decimal KES.
    pub total_platform_commission: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub timestamp: DateTime<Utc>,
    pub summary: AuditSummary,
    pub issues: Vec<String>,
    pub health_status: AuditVerdict,
}

impl From<AuditReport> for AuditResult {
    fn from(report: AuditReport) -> Self {
        let vendor_discrepancies = report
            .discrepancies
            .iter()
            .filter(|d| d.role == kula_payment_engine::db_types::EarningsRole::Vendor)
            .count();
        let rider_discrepancies = report.discrepancies.len() - vendor_discrepancies;
        let mut issues: Vec<String> = report
            .discrepancies
            .iter()
            .map(|d| {
                format!(
                    "{} {} cache reads {} but the ledger says {} (difference {})",
                    d.role, d.user_id, d.cached, d.ledger, d.difference
                )
            })
            .collect();
        issues.extend(
            report.missing_breakdowns.iter().map(|id| format!("Transaction {id} has no financial breakdown")),
        );
        Self {
            timestamp: report.generated_at,
            summary: AuditSummary {
                total_transactions: report.total_payments,
                missing_financial_breakdown: report.missing_breakdowns.len(),
                vendor_discrepancies,
                rider_discrepancies,
                total_platform_commission: report.platform_commission.to_kes_f64(),
            },
            issues,
            health_status: report.verdict,
        }
    }
}

/// Positive, sane decimal-KES amount check shared by the money-accepting routes.
pub fn parse_amount(kes: f64) -> Option<Money> {
    if !kes.is_finite() || kes <= 0.0 || kes > 10_000_000.0 {
        return None;
    }
    Some(Money::from_kes_f64(kes))
}
