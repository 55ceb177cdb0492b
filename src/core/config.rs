use anyhow::Result;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub market: MarketConfig,
    pub database: DatabaseConfig,
    pub watchlist: WatchlistConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub base_url: String,
    pub platform: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    pub user_id: String,
    pub check_delay_ms: u64,
    pub auto_check_interval_mins: u64,
    pub auto_check: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            market: MarketConfig {
                base_url: env::var("MARKET_BASE_URL")
                    .unwrap_or_else(|_| "https://api.warframe.market/v1".to_string()),
                platform: env::var("MARKET_PLATFORM").unwrap_or_else(|_| "pc".to_string()),
                request_timeout_secs: env::var("MARKET_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "15".to_string())
                    .parse()
                    .unwrap_or(15),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/market_data.db?mode=rwc".to_string()),
            },
            watchlist: WatchlistConfig {
                user_id: env::var("WATCHLIST_USER_ID")
                    .unwrap_or_else(|_| "default_user".to_string()),
                check_delay_ms: env::var("WATCHLIST_CHECK_DELAY_MS")
                    .unwrap_or_else(|_| "1500".to_string())
                    .parse()
                    .unwrap_or(1500),
                auto_check_interval_mins: env::var("AUTO_CHECK_INTERVAL_MINUTES")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                auto_check: env::var("AUTO_CHECK_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
            },
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
        })
    }
}
