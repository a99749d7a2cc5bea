use kpg_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One entity's ledger-derived earnings total.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ShareTotal {
    pub user_id: String,
    pub total: Money,
}

/// The read phase of the audit: per-entity sums over completed customer payments for delivered orders.
#[derive(Debug, Clone, Default)]
pub struct LedgerTotals {
    pub vendors: Vec<ShareTotal>,
    pub riders: Vec<ShareTotal>,
    pub platform_commission: Money,
}
