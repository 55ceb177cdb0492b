use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use super::types::{BestPrices, Order, OrderSide, OrdersEnvelope, RawOrder};
use crate::core::config::MarketConfig;

/// Failures talking to the upstream market API. "No relevant orders found"
/// is not a failure; callers get an empty Ok for that.
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("market API request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("unexpected response shape from market API")]
    Malformed,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Fetches an item's order book and filters it to relevant orders:
    /// trader online-equivalent, order visible, trader platform matching.
    async fn fetch_orders(&self, item_key: &str, platform: &str)
        -> Result<Vec<Order>, MarketError>;

    /// Minimum sell / maximum buy among the currently relevant orders.
    async fn best_prices(&self, item_key: &str, platform: &str)
        -> Result<BestPrices, MarketError>;
}

pub struct MarketClient {
    client: Client,
    base_url: String,
}

impl MarketClient {
    pub fn new(config: &MarketConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl MarketSource for MarketClient {
    async fn fetch_orders(
        &self,
        item_key: &str,
        platform: &str,
    ) -> Result<Vec<Order>, MarketError> {
        let url = format!("{}/items/{}/orders", self.base_url, item_key);

        tracing::debug!("Fetching orders for {} ({})", item_key, platform);

        let response = self
            .client
            .get(&url)
            .query(&[("include", "item")])
            .header("accept", "application/json")
            .header("Platform", platform)
            .header("Language", "en")
            .send()
            .await?
            .error_for_status()?;

        let envelope: OrdersEnvelope = response
            .json()
            .await
            .map_err(|_| MarketError::Malformed)?;

        let raw = envelope
            .payload
            .and_then(|p| p.orders)
            .ok_or(MarketError::Malformed)?;

        let orders = relevant_orders(item_key, platform, raw);
        tracing::debug!("Found {} relevant orders for {}", orders.len(), item_key);

        Ok(orders)
    }

    async fn best_prices(
        &self,
        item_key: &str,
        platform: &str,
    ) -> Result<BestPrices, MarketError> {
        let orders = self.fetch_orders(item_key, platform).await?;
        Ok(BestPrices::from_orders(&orders))
    }
}

/// Keeps only orders from visible listings of online/in-game traders on the
/// requested platform. Orders missing a price or a recognizable side are
/// dropped as unusable.
pub fn relevant_orders(item_key: &str, platform: &str, raw: Vec<RawOrder>) -> Vec<Order> {
    raw.into_iter()
        .filter_map(|r| {
            let user = r.user?;
            let trader_platform = user.platform.as_deref()?;
            let status = user.status.as_deref().unwrap_or("").to_lowercase();

            if trader_platform != platform
                || !matches!(status.as_str(), "ingame" | "online")
                || !r.visible
            {
                return None;
            }

            let side = OrderSide::parse(r.order_type.as_deref()?)?;
            let price = r.platinum?;

            Some(Order {
                item_key: item_key.to_string(),
                side,
                price,
                quantity: r.quantity,
                trader: user.ingame_name.unwrap_or_else(|| "?".to_string()),
                trader_status: status,
                visible: r.visible,
            })
        })
        .collect()
}
