use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::evaluator::DealEvaluator;
use super::state::AppState;
use crate::market::MarketSource;
use crate::storage::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckTrigger {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub total: usize,
    pub checked: usize,
    pub cancelled: bool,
}

/// Runs check cycles over the watchlist: sequentially, paced, never more
/// than one cycle at a time. Automatic cycles poll a cooperative stop flag
/// between items; `cancel` also wakes an auto loop sleeping between cycles.
pub struct WatchlistScheduler {
    evaluator: DealEvaluator,
    store: Arc<dyn Store>,
    state: Arc<AppState>,
    user_id: String,
    platform: String,
    pace: Duration,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl WatchlistScheduler {
    pub fn new(
        market: Arc<dyn MarketSource>,
        store: Arc<dyn Store>,
        state: Arc<AppState>,
        user_id: String,
        platform: String,
        pace: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);

        Self {
            evaluator: DealEvaluator::new(market, store.clone()),
            store,
            state,
            user_id,
            platform,
            pace,
            running: AtomicBool::new(false),
            stop_tx,
            stop_rx,
        }
    }

    /// Requests cancellation: the current automatic cycle stops before its
    /// next item, and a sleeping auto loop wakes up and exits.
    pub fn cancel(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Evaluates every watched item in a snapshot taken at cycle start.
    /// Per-item failures become status strings; the cycle never aborts
    /// because one item failed.
    pub async fn run_check_cycle(&self, trigger: CheckTrigger) -> CycleSummary {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Check cycle already in progress, skipping {:?} trigger", trigger);
            return CycleSummary {
                total: 0,
                checked: 0,
                cancelled: false,
            };
        }

        let summary = self.check_all(trigger).await;
        self.running.store(false, Ordering::SeqCst);
        summary
    }

    async fn check_all(&self, trigger: CheckTrigger) -> CycleSummary {
        let keys = self.state.watchlist.read().await.item_keys();
        if keys.is_empty() {
            tracing::info!("Watchlist is empty, nothing to check");
            return CycleSummary {
                total: 0,
                checked: 0,
                cancelled: false,
            };
        }

        let total = keys.len();
        tracing::info!("Starting {:?} watchlist check of {} items", trigger, total);

        let mut checked = 0;
        let mut cancelled = false;

        for (i, key) in keys.iter().enumerate() {
            // Polled before the item is touched, so cancelled items keep
            // their previous status and last_checked.
            if trigger == CheckTrigger::Automatic && *self.stop_rx.borrow() {
                tracing::info!("Stop requested, leaving {} items unchecked", total - i);
                cancelled = true;
                break;
            }

            {
                let mut list = self.state.watchlist.write().await;
                match list.get_mut(key) {
                    Some(item) => {
                        item.status = "Checking...".to_string();
                        item.last_checked = Some(Utc::now());
                    }
                    // Removed by the user since the snapshot was taken
                    None => continue,
                }
            }

            let verdict = self.evaluator.evaluate(key, &self.platform).await;

            {
                let mut list = self.state.watchlist.write().await;
                if let Some(item) = list.get_mut(key) {
                    item.status = verdict.to_string();
                    item.last_checked = Some(Utc::now());
                }
            }
            checked += 1;

            // Pace upstream calls between items
            if i + 1 < total {
                tokio::time::sleep(self.pace).await;
            }
        }

        let snapshot = self.state.watchlist.read().await.clone();
        if let Err(e) = self.store.save_watchlist(&self.user_id, &snapshot).await {
            tracing::error!("Failed to persist watchlist after check cycle: {}", e);
        }

        tracing::info!(
            "Watchlist check finished: {}/{} items checked{}",
            checked,
            total,
            if cancelled { " (cancelled)" } else { "" }
        );

        CycleSummary {
            total,
            checked,
            cancelled,
        }
    }

    /// Spawns the automatic check loop: wake every `interval`, run one
    /// automatic cycle unless stopped. `cancel` interrupts the sleep and the
    /// loop exits; a cycle already in flight finishes first.
    pub fn spawn_auto(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        // A fresh enable clears any stop request from a previous toggle
        let _ = self.stop_tx.send(false);

        let mut stop_rx = self.stop_rx.clone();
        let scheduler = self;

        tokio::spawn(async move {
            tracing::info!("Auto-check loop started (every {:?})", interval);

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        let summary = scheduler.run_check_cycle(CheckTrigger::Automatic).await;
                        tracing::debug!(
                            "Auto cycle done: {}/{} checked",
                            summary.checked,
                            summary.total
                        );
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        // Flag was reset, keep waiting for the next tick
                    }
                }
            }

            tracing::info!("Auto-check loop stopped");
        })
    }
}
