use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::Watchlist;
use crate::market::OrderSide;

/// The whole persistence contract: an append-only price-point series plus a
/// single watchlist blob per user. Concrete backends (embedded SQLite,
/// hosted Postgres) are interchangeable behind this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// Appends one price point. A `None` price performs no write; duplicate
    /// points are acceptable.
    async fn insert_price_point(
        &self,
        item_key: &str,
        platform: &str,
        side: OrderSide,
        price: Option<i64>,
        observed_at: DateTime<Utc>,
    ) -> Result<()>;

    /// All persisted prices for the item/platform/side observed within the
    /// last `days` days (boundary inclusive), in arbitrary order.
    async fn historical_prices(
        &self,
        item_key: &str,
        platform: &str,
        side: OrderSide,
        days: i64,
    ) -> Result<Vec<i64>>;

    /// Loads the user's watchlist; an empty collection when none was ever
    /// saved.
    async fn load_watchlist(&self, user_id: &str) -> Result<Watchlist>;

    /// Atomically replaces the user's stored watchlist.
    async fn save_watchlist(&self, user_id: &str, watchlist: &Watchlist) -> Result<()>;
}
