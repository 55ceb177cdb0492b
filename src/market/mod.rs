pub mod client;
pub mod types;

pub use client::{MarketClient, MarketError, MarketSource};
pub use types::{BestPrices, Order, OrderSide};

#[cfg(test)]
pub use client::MockMarketSource;
