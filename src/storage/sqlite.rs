use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

use super::models::Watchlist;
use super::store::Store;
use crate::market::OrderSide;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create the parent directory for file-backed databases
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_key TEXT NOT NULL,
                platform TEXT NOT NULL,
                side TEXT NOT NULL,
                price INTEGER NOT NULL,
                observed_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_market_data_lookup
            ON market_data(item_key, platform, side, observed_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_settings (
                user_id TEXT PRIMARY KEY,
                watchlist TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Market database schema initialized");

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_price_point(
        &self,
        item_key: &str,
        platform: &str,
        side: OrderSide,
        price: Option<i64>,
        observed_at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(price) = price else {
            tracing::debug!("No {} price for {}, skipping insert", side.as_str(), item_key);
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO market_data (item_key, platform, side, price, observed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(item_key)
        .bind(platform)
        .bind(side.as_str())
        .bind(price)
        .bind(observed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn historical_prices(
        &self,
        item_key: &str,
        platform: &str,
        side: OrderSide,
        days: i64,
    ) -> Result<Vec<i64>> {
        let cutoff = Utc::now() - Duration::days(days);

        let prices: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT price FROM market_data
            WHERE item_key = ? AND platform = ? AND side = ? AND observed_at >= ?
            "#,
        )
        .bind(item_key)
        .bind(platform)
        .bind(side.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(
            "Found {} historical {} prices for {} over {} days",
            prices.len(),
            side.as_str(),
            item_key,
            days
        );

        Ok(prices)
    }

    async fn load_watchlist(&self, user_id: &str) -> Result<Watchlist> {
        let blob: Option<String> = sqlx::query_scalar(
            r#"
            SELECT watchlist FROM user_settings WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match blob {
            Some(json) => match serde_json::from_str(&json) {
                Ok(watchlist) => Ok(watchlist),
                Err(e) => {
                    tracing::warn!(
                        "Stored watchlist for '{}' is unreadable ({}), starting empty",
                        user_id,
                        e
                    );
                    Ok(Watchlist::default())
                }
            },
            None => {
                tracing::debug!("No watchlist found for user '{}'", user_id);
                Ok(Watchlist::default())
            }
        }
    }

    async fn save_watchlist(&self, user_id: &str, watchlist: &Watchlist) -> Result<()> {
        let json = serde_json::to_string(watchlist)?;

        sqlx::query(
            r#"
            INSERT INTO user_settings (user_id, watchlist)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET watchlist = excluded.watchlist
            "#,
        )
        .bind(user_id)
        .bind(json)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved watchlist for user '{}' ({} items)", user_id, watchlist.len());

        Ok(())
    }
}
