use std::{collections::HashMap, fmt::Debug};

use chrono::Utc;
use kpg_common::Money;
use log::*;

use crate::{
    db_types::EarningsRole,
    helpers::commission,
    kpe_api::audit_objects::{AuditReport, AuditVerdict, Discrepancy, RepairReport},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// Cached figures may lag the ledger by a cent from independent rounding. Anything further out is a discrepancy.
pub const CACHE_TOLERANCE_CENTS: i64 = 1;

/// `AuditApi` verifies the denormalized earnings caches against the ledger and repairs drift.
///
/// The ledger is the source of truth: completed customer payments joined to orders that reached `delivered` or
/// `completed`. The audit never mutates anything; the repair pass restores missing breakdowns and rewrites the
/// caches from the ledger sums.
pub struct AuditApi<B> {
    db: B,
}

impl<B> Debug for AuditApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AuditApi")
    }
}

impl<B> AuditApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> AuditApi<B>
where B: PaymentGatewayDatabase
{
    /// Run the audit. Read-only: compares every cached earnings figure against its ledger sum (within
    /// [`CACHE_TOLERANCE_CENTS`]) and lists settled payments that are missing their breakdown.
    ///
    /// An entity present on one side but absent on the other is a discrepancy too, with the missing side at zero.
    pub async fn run_audit(&self) -> Result<AuditReport, PaymentGatewayError> {
        let ledger = self.db.settled_share_totals().await?;
        let cached = self.db.all_cached_earnings().await?;
        let missing = self.db.transactions_missing_breakdown().await?;
        let total_payments = self.db.count_customer_payments().await?;

        let mut expected: HashMap<(String, EarningsRole), Money> = HashMap::new();
        for share in &ledger.vendors {
            expected.insert((share.user_id.clone(), EarningsRole::Vendor), share.total);
        }
        for share in &ledger.riders {
            expected.insert((share.user_id.clone(), EarningsRole::Rider), share.total);
        }

        let mut discrepancies = Vec::new();
        let mut entities_checked = 0usize;
        for row in &cached {
            entities_checked += 1;
            let key = (row.user_id.clone(), row.role);
            let ledger_total = expected.remove(&key).unwrap_or_default();
            if !row.total_earnings.is_within(ledger_total, CACHE_TOLERANCE_CENTS) {
                discrepancies.push(Discrepancy {
                    user_id: row.user_id.clone(),
                    role: row.role,
                    cached: row.total_earnings,
                    ledger: ledger_total,
                    difference: row.total_earnings - ledger_total,
                });
            }
        }
        // Whatever remains has ledger earnings but no cache row at all.
        for ((user_id, role), ledger_total) in expected {
            entities_checked += 1;
            if !ledger_total.is_within(Money::default(), CACHE_TOLERANCE_CENTS) {
                discrepancies.push(Discrepancy {
                    user_id,
                    role,
                    cached: Money::default(),
                    ledger: ledger_total,
                    difference: -ledger_total,
                });
            }
        }

        let verdict = if discrepancies.is_empty() && missing.is_empty() {
            AuditVerdict::Healthy
        } else {
            AuditVerdict::NeedsAttention
        };
        match verdict {
            AuditVerdict::Healthy => info!("🧾️ Audit complete. {entities_checked} entities checked. All healthy."),
            AuditVerdict::NeedsAttention => warn!(
                "🧾️ Audit complete. {} discrepancies and {} missing breakdowns across {entities_checked} entities.",
                discrepancies.len(),
                missing.len()
            ),
        }
        Ok(AuditReport {
            verdict,
            generated_at: Utc::now(),
            total_payments,
            entities_checked,
            platform_commission: ledger.platform_commission,
            discrepancies,
            missing_breakdowns: missing.iter().map(|t| t.id).collect(),
        })
    }

    /// Repair everything the audit flags.
    ///
    /// Two passes, in order: [`Self::repair_missing_breakdowns`], then [`Self::regenerate_cached_earnings`]. A fresh
    /// audit run immediately after a repair reports healthy.
    pub async fn repair(&self) -> Result<RepairReport, PaymentGatewayError> {
        let breakdowns_restored = self.repair_missing_breakdowns().await?;
        let caches_rewritten = self.regenerate_cached_earnings().await?;
        info!("🧾️ Repair complete. {breakdowns_restored} breakdowns restored, {caches_rewritten} caches rewritten.");
        Ok(RepairReport { breakdowns_restored, caches_rewritten, completed_at: Utc::now() })
    }

    /// Restore missing breakdowns on settled payments, at the rate snapshotted on the transaction (falling back to
    /// the live rate). Never touches the earnings caches.
    pub async fn repair_missing_breakdowns(&self) -> Result<usize, PaymentGatewayError> {
        let missing = self.db.transactions_missing_breakdown().await?;
        let mut breakdowns_restored = 0usize;
        for txn in missing {
            let Some(order_id) = txn.order_id.as_ref() else {
                warn!("🧾️ Transaction {} has no breakdown and no order. It cannot be repaired.", txn.id);
                continue;
            };
            let Some(order) = self.db.fetch_order_by_order_id(order_id).await? else {
                warn!("🧾️ Transaction {} points at order {order_id}, which no longer exists.", txn.id);
                continue;
            };
            let rate = match txn.commission_rate {
                Some(rate) => rate,
                None => self.db.commission_rate().await?,
            };
            let split = commission::split(order.subtotal, order.delivery_fee, rate);
            self.db.set_transaction_breakdown(txn.id, &split, rate).await?;
            debug!("🧾️ Restored the breakdown on transaction {} at {rate}%", txn.id);
            breakdowns_restored += 1;
        }
        Ok(breakdowns_restored)
    }

    /// Reset every earnings cache to its ledger-derived sum. Stale rows for entities with no settled earnings are
    /// zeroed rather than deleted.
    pub async fn regenerate_cached_earnings(&self) -> Result<usize, PaymentGatewayError> {
        let ledger = self.db.settled_share_totals().await?;
        let mut expected: HashMap<(String, EarningsRole), Money> = HashMap::new();
        for share in &ledger.vendors {
            expected.insert((share.user_id.clone(), EarningsRole::Vendor), share.total);
        }
        for share in &ledger.riders {
            expected.insert((share.user_id.clone(), EarningsRole::Rider), share.total);
        }
        for row in self.db.all_cached_earnings().await? {
            expected.entry((row.user_id, row.role)).or_insert_with(Money::default);
        }
        let mut written = 0usize;
        for ((user_id, role), total) in expected {
            self.db.set_cached_earnings(&user_id, role, total).await?;
            written += 1;
        }
        Ok(written)
    }
}
