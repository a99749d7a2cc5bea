//! Background sweep that deletes orders stuck in `pending_payment` past their TTL.
use std::time::Duration as StdDuration;

use chrono::Duration;
use kula_payment_engine::{OrderFlowApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

pub fn start_reaper_worker(db: SqliteDatabase, ttl: Duration, interval_secs: u64) -> JoinHandle<()> {
    info!("🕰️ Starting the stale order reaper. Unpaid orders older than {} seconds are swept every {interval_secs} seconds.", ttl.num_seconds());
    tokio::spawn(async move {
        let api = OrderFlowApi::new(db);
        let mut interval = tokio::time::interval(StdDuration::from_secs(interval_secs));
        // The first tick fires immediately, which is what we want after a restart.
        loop {
            interval.tick().await;
            trace!("🕰️ Reaper sweep starting");
            match api.reap_stale_orders(ttl, None).await {
                Ok(reaped) if reaped.is_empty() => trace!("🕰️ Reaper sweep found nothing to do"),
                Ok(reaped) => {
                    info!("🕰️ Reaper removed {} stale unpaid order(s)", reaped.len());
                    for order in &reaped {
                        debug!("🕰️ Reaped order {} for customer {}", order.order_id, order.customer_id);
                    }
                },
                Err(e) => error!("🕰️ Reaper sweep failed. {e}"),
            }
        }
    })
}
