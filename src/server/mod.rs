use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Reply};

use crate::core::HealthChecker;
use crate::market::types::normalize_item_key;
use crate::market::{BestPrices, MarketSource, Order, OrderSide};
use crate::storage::{AddOutcome, Store, Watchlist};
use crate::watchlist::{AppState, CheckTrigger, WatchlistScheduler};

/// Everything the HTTP handlers need, cloned into each filter chain.
#[derive(Clone)]
pub struct ServerContext {
    pub market: Arc<dyn MarketSource>,
    pub store: Arc<dyn Store>,
    pub state: Arc<AppState>,
    pub scheduler: Arc<WatchlistScheduler>,
    pub health: Arc<HealthChecker>,
    pub user_id: String,
    pub platform: String,
}

#[derive(Debug, Deserialize)]
struct AddItemRequest {
    name: String,
}

#[derive(Debug, Serialize)]
struct OrderView {
    #[serde(flatten)]
    order: Order,
    whisper: String,
}

impl OrderView {
    fn from_order(order: Order) -> Self {
        let whisper = order.whisper_message();
        Self { order, whisper }
    }
}

pub fn routes(
    ctx: ServerContext,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let fetch_item = warp::path!("fetch_item")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_fetch_item);

    let get_watchlist = warp::path!("watchlist")
        .and(warp::get())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_get_watchlist);

    let post_watchlist = warp::path!("watchlist")
        .and(warp::post())
        .and(warp::body::json::<serde_json::Value>())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_post_watchlist);

    let add_item = warp::path!("watchlist" / "items")
        .and(warp::post())
        .and(warp::body::json::<AddItemRequest>())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_add_item);

    let remove_item = warp::path!("watchlist" / "items" / String)
        .and(warp::delete())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_remove_item);

    let check_watchlist = warp::path!("check_watchlist")
        .and(warp::post())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_check_watchlist);

    let get_orders = warp::path!("orders")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_ctx(ctx.clone()))
        .and_then(handle_get_orders);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_ctx(ctx))
        .and_then(handle_health);

    fetch_item
        .or(get_watchlist)
        .or(post_watchlist)
        .or(add_item)
        .or(remove_item)
        .or(check_watchlist)
        .or(get_orders)
        .or(health)
}

fn with_ctx(
    ctx: ServerContext,
) -> impl Filter<Extract = (ServerContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_error(message: &str, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "error": message })),
        status,
    )
}

fn json_message(message: &str, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "message": message })),
        status,
    )
}

fn side_filter(params: &HashMap<String, String>) -> Result<Option<OrderSide>, ()> {
    match params.get("side").map(String::as_str) {
        None | Some("all") => Ok(None),
        Some(raw) => OrderSide::parse(raw).map(Some).ok_or(()),
    }
}

/// Fetches an item's live order book, records the best sell/buy price
/// points, caches the order list, and returns it.
async fn handle_fetch_item(
    params: HashMap<String, String>,
    ctx: ServerContext,
) -> Result<impl Reply, Infallible> {
    let Some(item_key) = params.get("name").and_then(|n| normalize_item_key(n)) else {
        return Ok(json_error("Missing 'name' parameter", StatusCode::BAD_REQUEST));
    };
    let platform = params
        .get("platform")
        .cloned()
        .unwrap_or_else(|| ctx.platform.clone());
    let Ok(side) = side_filter(&params) else {
        return Ok(json_error(
            "Invalid 'side' parameter, expected all/sell/buy",
            StatusCode::BAD_REQUEST,
        ));
    };

    let orders = match ctx.market.fetch_orders(&item_key, &platform).await {
        Ok(orders) => orders,
        Err(e) => {
            tracing::warn!("Upstream fetch failed for {}: {}", item_key, e);
            ctx.health.update_component("market_api", false).await;
            return Ok(json_error(
                "Failed to fetch data from external market API",
                StatusCode::BAD_GATEWAY,
            ));
        }
    };
    ctx.health.update_component("market_api", true).await;

    let best = BestPrices::from_orders(&orders);
    let now = Utc::now();
    let stored = async {
        ctx.store
            .insert_price_point(&item_key, &platform, OrderSide::Sell, best.min_sell, now)
            .await?;
        ctx.store
            .insert_price_point(&item_key, &platform, OrderSide::Buy, best.max_buy, now)
            .await
    }
    .await;

    if let Err(e) = stored {
        tracing::error!("Failed to store price points for {}: {}", item_key, e);
        ctx.health.update_component("database", false).await;
        return Ok(json_error(
            "Database operation failed",
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }
    ctx.health.update_component("database", true).await;

    *ctx.state.current_orders.write().await = orders.clone();

    let views: Vec<OrderView> = orders
        .into_iter()
        .filter(|o| side.map_or(true, |s| o.side == s))
        .map(OrderView::from_order)
        .collect();

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "orders": views })),
        StatusCode::OK,
    ))
}

async fn handle_get_watchlist(ctx: ServerContext) -> Result<impl Reply, Infallible> {
    let watchlist = ctx.state.watchlist.read().await.clone();
    Ok(warp::reply::with_status(
        warp::reply::json(&watchlist),
        StatusCode::OK,
    ))
}

/// Full replace of the stored watchlist with the request body.
async fn handle_post_watchlist(
    body: serde_json::Value,
    ctx: ServerContext,
) -> Result<impl Reply, Infallible> {
    if !body.is_object() {
        return Ok(json_error(
            "Invalid data format, expected JSON object",
            StatusCode::BAD_REQUEST,
        ));
    }

    let incoming: Watchlist = match serde_json::from_value(body) {
        Ok(watchlist) => watchlist,
        Err(e) => {
            tracing::debug!("Rejected watchlist payload: {}", e);
            return Ok(json_error(
                "Invalid data format, expected JSON object",
                StatusCode::BAD_REQUEST,
            ));
        }
    };

    // Hold the write lock across the store call so concurrent writers
    // cannot interleave between the memory and storage updates.
    let mut watchlist = ctx.state.watchlist.write().await;
    if let Err(e) = ctx.store.save_watchlist(&ctx.user_id, &incoming).await {
        tracing::error!("Failed to save watchlist: {}", e);
        return Ok(json_error(
            "Failed to save watchlist",
            StatusCode::INTERNAL_SERVER_ERROR,
        ));
    }
    *watchlist = incoming;

    Ok(json_message("Watchlist saved successfully", StatusCode::OK))
}

async fn handle_add_item(
    body: AddItemRequest,
    ctx: ServerContext,
) -> Result<impl Reply, Infallible> {
    let Some(item_key) = normalize_item_key(&body.name) else {
        return Ok(json_error("Item name cannot be empty", StatusCode::BAD_REQUEST));
    };
    let display_name = body.name.trim().to_string();

    let mut watchlist = ctx.state.watchlist.write().await;
    match watchlist.add(&item_key, &display_name) {
        AddOutcome::AlreadyPresent => Ok(json_message(
            &format!("'{}' is already on the watchlist", display_name),
            StatusCode::OK,
        )),
        AddOutcome::Added => {
            if let Err(e) = ctx.store.save_watchlist(&ctx.user_id, &watchlist).await {
                tracing::error!("Failed to save watchlist: {}", e);
                watchlist.remove(&item_key);
                return Ok(json_error(
                    "Failed to save watchlist",
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
            Ok(json_message(
                &format!("Added '{}' to the watchlist", display_name),
                StatusCode::OK,
            ))
        }
    }
}

async fn handle_remove_item(
    item_key: String,
    ctx: ServerContext,
) -> Result<impl Reply, Infallible> {
    let item_key = normalize_item_key(&item_key).unwrap_or(item_key);

    let mut watchlist = ctx.state.watchlist.write().await;
    let removed = watchlist.remove(&item_key);
    if removed {
        if let Err(e) = ctx.store.save_watchlist(&ctx.user_id, &watchlist).await {
            tracing::error!("Failed to save watchlist: {}", e);
            return Ok(json_error(
                "Failed to save watchlist",
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "message": if removed { "Item removed" } else { "Item was not on the watchlist" },
            "removed": removed,
        })),
        StatusCode::OK,
    ))
}

/// Fire-and-forget: the cycle runs in the background and progress shows up
/// in GET /watchlist as the scheduler updates item statuses.
async fn handle_check_watchlist(ctx: ServerContext) -> Result<impl Reply, Infallible> {
    let scheduler = ctx.scheduler.clone();
    tokio::spawn(async move {
        scheduler.run_check_cycle(CheckTrigger::Manual).await;
    });

    Ok(json_message("Watchlist check started", StatusCode::ACCEPTED))
}

async fn handle_get_orders(
    params: HashMap<String, String>,
    ctx: ServerContext,
) -> Result<impl Reply, Infallible> {
    let Ok(side) = side_filter(&params) else {
        return Ok(json_error(
            "Invalid 'side' parameter, expected all/sell/buy",
            StatusCode::BAD_REQUEST,
        ));
    };

    let orders = ctx.state.current_orders.read().await.clone();
    let views: Vec<OrderView> = orders
        .into_iter()
        .filter(|o| side.map_or(true, |s| o.side == s))
        .map(OrderView::from_order)
        .collect();

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "orders": views })),
        StatusCode::OK,
    ))
}

async fn handle_health(ctx: ServerContext) -> Result<impl Reply, Infallible> {
    let status = ctx.health.get_status().await;
    Ok(warp::reply::with_status(
        warp::reply::json(&status),
        StatusCode::OK,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::client::MockMarketSource;
    use crate::market::MarketError;
    use crate::storage::store::MockStore;
    use crate::storage::WatchedItem;
    use std::time::Duration;

    fn test_ctx(
        market: MockMarketSource,
        store: MockStore,
        watchlist: Watchlist,
    ) -> ServerContext {
        let market: Arc<dyn MarketSource> = Arc::new(market);
        let store: Arc<dyn Store> = Arc::new(store);
        let state = Arc::new(AppState::new(watchlist));
        let scheduler = Arc::new(WatchlistScheduler::new(
            market.clone(),
            store.clone(),
            state.clone(),
            "default_user".to_string(),
            "pc".to_string(),
            Duration::ZERO,
        ));

        ServerContext {
            market,
            store,
            state,
            scheduler,
            health: Arc::new(HealthChecker::new()),
            user_id: "default_user".to_string(),
            platform: "pc".to_string(),
        }
    }

    fn sample_order(side: OrderSide, price: i64) -> Order {
        Order {
            item_key: "ash_prime_set".to_string(),
            side,
            price,
            quantity: 1,
            trader: "SomeTenno".to_string(),
            trader_status: "ingame".to_string(),
            visible: true,
        }
    }

    fn body_json(body: &[u8]) -> serde_json::Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_item_requires_name() {
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), Watchlist::default());
        let resp = warp::test::request()
            .method("GET")
            .path("/fetch_item")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = serde_json::from_slice::<serde_json::Value>(resp.body()).unwrap();
        assert_eq!(body["error"], "Missing 'name' parameter");
    }

    #[tokio::test]
    async fn test_fetch_item_records_prices_and_returns_orders() {
        let mut market = MockMarketSource::new();
        market.expect_fetch_orders().returning(|_, _| {
            Ok(vec![
                sample_order(OrderSide::Sell, 90),
                sample_order(OrderSide::Sell, 75),
                sample_order(OrderSide::Buy, 60),
            ])
        });

        let mut store = MockStore::new();
        store
            .expect_insert_price_point()
            .withf(|_, _, side, price, _| *side == OrderSide::Sell && *price == Some(75))
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));
        store
            .expect_insert_price_point()
            .withf(|_, _, side, price, _| *side == OrderSide::Buy && *price == Some(60))
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let ctx = test_ctx(market, store, Watchlist::default());
        let state = ctx.state.clone();

        let resp = warp::test::request()
            .method("GET")
            .path("/fetch_item?name=Ash%20Prime%20Set")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp.body());
        let orders = body["orders"].as_array().unwrap();
        assert_eq!(orders.len(), 3);
        assert!(orders[0]["whisper"].as_str().unwrap().starts_with("/w "));

        // The full set is cached for GET /orders
        assert_eq!(state.current_orders.read().await.len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_item_side_filter() {
        let mut market = MockMarketSource::new();
        market.expect_fetch_orders().returning(|_, _| {
            Ok(vec![
                sample_order(OrderSide::Sell, 90),
                sample_order(OrderSide::Buy, 60),
            ])
        });
        let mut store = MockStore::new();
        store
            .expect_insert_price_point()
            .returning(|_, _, _, _, _| Ok(()));

        let ctx = test_ctx(market, store, Watchlist::default());
        let resp = warp::test::request()
            .method("GET")
            .path("/fetch_item?name=ash_prime_set&side=sell")
            .reply(&routes(ctx))
            .await;

        let body = body_json(resp.body());
        let orders = body["orders"].as_array().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["side"], "sell");
    }

    #[tokio::test]
    async fn test_fetch_item_upstream_failure_is_502() {
        let mut market = MockMarketSource::new();
        market
            .expect_fetch_orders()
            .returning(|_, _| Err(MarketError::Malformed));

        let ctx = test_ctx(market, MockStore::new(), Watchlist::default());
        let resp = warp::test::request()
            .method("GET")
            .path("/fetch_item?name=ash_prime_set")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_fetch_item_storage_failure_is_500() {
        let mut market = MockMarketSource::new();
        market
            .expect_fetch_orders()
            .returning(|_, _| Ok(vec![sample_order(OrderSide::Sell, 90)]));
        let mut store = MockStore::new();
        store
            .expect_insert_price_point()
            .returning(|_, _, _, _, _| Err(anyhow::anyhow!("no disk")));

        let ctx = test_ctx(market, store, Watchlist::default());
        let resp = warp::test::request()
            .method("GET")
            .path("/fetch_item?name=ash_prime_set")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_get_watchlist_empty_object() {
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), Watchlist::default());
        let resp = warp::test::request()
            .method("GET")
            .path("/watchlist")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp.body()), serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_post_watchlist_replaces_and_saves() {
        let mut store = MockStore::new();
        store
            .expect_save_watchlist()
            .times(1)
            .withf(|user_id, wl| user_id == "default_user" && wl.len() == 1)
            .returning(|_, _| Ok(()));

        let ctx = test_ctx(MockMarketSource::new(), store, Watchlist::default());
        let state = ctx.state.clone();

        let resp = warp::test::request()
            .method("POST")
            .path("/watchlist")
            .json(&serde_json::json!({
                "ash_prime_set": {
                    "display_name": "Ash Prime Set",
                    "status": "Not Checked",
                    "last_checked": null,
                }
            }))
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.watchlist.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_post_watchlist_rejects_non_object() {
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), Watchlist::default());
        let resp = warp::test::request()
            .method("POST")
            .path("/watchlist")
            .json(&serde_json::json!(["not", "an", "object"]))
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_item_normalizes_and_reports_duplicates() {
        let mut store = MockStore::new();
        store
            .expect_save_watchlist()
            .times(1)
            .returning(|_, _| Ok(()));

        let ctx = test_ctx(MockMarketSource::new(), store, Watchlist::default());
        let routes = routes(ctx.clone());

        let resp = warp::test::request()
            .method("POST")
            .path("/watchlist/items")
            .json(&serde_json::json!({"name": " Ash Prime Set "}))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(ctx.state.watchlist.read().await.get("ash_prime_set").is_some());

        // Adding again saves nothing and reports it
        let resp = warp::test::request()
            .method("POST")
            .path("/watchlist/items")
            .json(&serde_json::json!({"name": "ash prime set"}))
            .reply(&routes)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp.body());
        assert!(body["message"].as_str().unwrap().contains("already"));
    }

    #[tokio::test]
    async fn test_remove_item_missing_key_is_noop() {
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), Watchlist::default());
        let resp = warp::test::request()
            .method("DELETE")
            .path("/watchlist/items/nope")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp.body())["removed"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_check_watchlist_is_accepted() {
        let mut list = Watchlist::default();
        list.add("ash_prime_set", "Ash Prime Set");
        // The spawned cycle may or may not run before the test ends, so the
        // mocks accept any number of calls.
        let mut market = MockMarketSource::new();
        market.expect_best_prices().returning(|_, _| {
            Ok(BestPrices {
                min_sell: Some(80),
                max_buy: None,
            })
        });
        let mut store = MockStore::new();
        store
            .expect_historical_prices()
            .returning(|_, _, _, _| Ok(vec![100, 100, 100, 100, 100]));
        store.expect_save_watchlist().returning(|_, _| Ok(()));

        let ctx = test_ctx(market, store, list);
        let resp = warp::test::request()
            .method("POST")
            .path("/check_watchlist")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_get_orders_serves_cached_list() {
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), Watchlist::default());
        *ctx.state.current_orders.write().await = vec![
            sample_order(OrderSide::Sell, 90),
            sample_order(OrderSide::Buy, 60),
        ];

        let resp = warp::test::request()
            .method("GET")
            .path("/orders?side=buy")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp.body());
        assert_eq!(body["orders"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_route() {
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), Watchlist::default());
        let resp = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(ctx))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp.body())["status"], "degraded");
    }

    #[tokio::test]
    async fn test_watchlist_roundtrip_shape() {
        let mut list = Watchlist::default();
        list.add("ash_prime_set", "Ash Prime Set");
        let ctx = test_ctx(MockMarketSource::new(), MockStore::new(), list.clone());

        let resp = warp::test::request()
            .method("GET")
            .path("/watchlist")
            .reply(&routes(ctx))
            .await;
        let body = body_json(resp.body());
        let parsed: Watchlist = serde_json::from_value(body).unwrap();
        assert_eq!(
            parsed.get("ash_prime_set"),
            Some(&WatchedItem::new("Ash Prime Set"))
        );
    }
}
