use tokio::sync::RwLock;

use crate::market::Order;
use crate::storage::Watchlist;

/// Shared mutable state behind the presentation layer. The two fields have
/// deliberately independent locks: background checkers mutate the watchlist
/// while fetch completions replace the current order list, and neither may
/// block the other.
#[derive(Default)]
pub struct AppState {
    pub watchlist: RwLock<Watchlist>,
    pub current_orders: RwLock<Vec<Order>>,
}

impl AppState {
    pub fn new(watchlist: Watchlist) -> Self {
        Self {
            watchlist: RwLock::new(watchlist),
            current_orders: RwLock::new(Vec::new()),
        }
    }
}
