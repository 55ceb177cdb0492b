mod core;
mod market;
mod server;
mod storage;
mod watchlist;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Config, HealthChecker};
use crate::market::{MarketClient, MarketSource};
use crate::storage::{SqliteStore, Store};
use crate::watchlist::{AppState, WatchlistScheduler};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    crate::core::logging::init_logging(&config.server.log_level);

    tracing::info!("Warframe Market Tracker starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Platform: {}", config.market.platform);

    // No storage means no history and no watchlist; refuse to start.
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::new(&config.database.url)
            .await
            .context("failed to open the market database")?,
    );

    let market: Arc<dyn MarketSource> = Arc::new(
        MarketClient::new(&config.market).context("failed to build the market API client")?,
    );

    let watchlist = store.load_watchlist(&config.watchlist.user_id).await?;
    tracing::info!("Loaded watchlist with {} items", watchlist.len());
    let state = Arc::new(AppState::new(watchlist));

    let health = Arc::new(HealthChecker::new());
    health.update_component("database", true).await;

    let scheduler = Arc::new(WatchlistScheduler::new(
        market.clone(),
        store.clone(),
        state.clone(),
        config.watchlist.user_id.clone(),
        config.market.platform.clone(),
        Duration::from_millis(config.watchlist.check_delay_ms),
    ));

    if config.watchlist.auto_check {
        let interval = Duration::from_secs(config.watchlist.auto_check_interval_mins * 60);
        scheduler.clone().spawn_auto(interval);
        tracing::info!(
            "Auto-check enabled (every {} minutes)",
            config.watchlist.auto_check_interval_mins
        );
    }

    let ctx = server::ServerContext {
        market,
        store,
        state,
        scheduler,
        health,
        user_id: config.watchlist.user_id.clone(),
        platform: config.market.platform.clone(),
    };

    let port = config.server.port;
    tracing::info!("HTTP server listening on port {}", port);
    warp::serve(server::routes(ctx)).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
