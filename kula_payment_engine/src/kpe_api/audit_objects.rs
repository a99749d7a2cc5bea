use chrono::{DateTime, Utc};
use kpg_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::EarningsRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditVerdict {
    Healthy,
    NeedsAttention,
}

/// One entity whose cached earnings figure does not match the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub user_id: String,
    pub role: EarningsRole,
    pub cached: Money,
    pub ledger: Money,
    pub difference: Money,
}

/// The audit's findings. The verdict is `Healthy` only when every cached figure is within tolerance of its ledger
/// sum and no settled payment is missing its breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub verdict: AuditVerdict,
    pub generated_at: DateTime<Utc>,
    pub total_payments: i64,
    pub entities_checked: usize,
    /// Ledger sum of platform commission over settled, delivered payments.
    pub platform_commission: Money,
    pub discrepancies: Vec<Discrepancy>,
    /// Internal ids of completed customer payments with no commission breakdown.
    pub missing_breakdowns: Vec<i64>,
}

impl AuditReport {
    pub fn is_healthy(&self) -> bool {
        self.verdict == AuditVerdict::Healthy
    }
}

/// What a repair pass actually fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    pub breakdowns_restored: usize,
    pub caches_rewritten: usize,
    pub completed_at: DateTime<Utc>,
}
