//! Background reconciliation loop, the timer-driven half of `Reconciler`,
//! run the same way the sibling server runs its outbox dispatcher: an
//! infinite loop that never panics and sleeps between passes.

use std::sync::Arc;
use std::time::Duration;

use opslog_core::reconciler::Reconciler;

const RECONCILE_WINDOW_HOURS: i64 = 1;

pub struct ReconcileLoop {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl ReconcileLoop {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self { reconciler, interval }
    }

    /// Never returns under normal operation. Spawn via `tokio::spawn`.
    pub async fn run(&self) {
        tracing::info!("reconcile loop started (interval={:?})", self.interval);
        loop {
            tokio::time::sleep(self.interval).await;
            let summary = self.reconciler.run(RECONCILE_WINDOW_HOURS, false).await;
            tracing::info!(
                analyzed = summary.analyzed,
                backfilled = summary.backfilled,
                consistency = ?summary.consistency,
                "reconcile pass complete"
            );
        }
    }
}
