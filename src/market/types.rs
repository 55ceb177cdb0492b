use serde::{Deserialize, Serialize};

/// Buy/sell direction of a market order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(OrderSide::Buy),
            "sell" => Some(OrderSide::Sell),
            _ => None,
        }
    }
}

// Wire format of warframe.market /items/{item}/orders. Fields the upstream
// sometimes omits are Options/defaults so one odd order does not sink the
// whole response.
#[derive(Debug, Clone, Deserialize)]
pub struct OrdersEnvelope {
    pub payload: Option<OrdersPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersPayload {
    pub orders: Option<Vec<RawOrder>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrder {
    pub order_type: Option<String>,
    pub platinum: Option<i64>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub visible: bool,
    pub user: Option<RawOrderUser>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderUser {
    pub ingame_name: Option<String>,
    pub status: Option<String>,
    pub platform: Option<String>,
}

/// A filtered, relevant market order as exposed to callers. Transient, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub item_key: String,
    pub side: OrderSide,
    pub price: i64,
    pub quantity: i64,
    pub trader: String,
    pub trader_status: String,
    pub visible: bool,
}

impl Order {
    /// In-game whisper text for contacting the trader about this order.
    pub fn whisper_message(&self) -> String {
        let friendly = friendly_item_name(&self.item_key);
        match self.side {
            OrderSide::Sell => format!(
                "/w {} Hi! I want to buy: \"{}\" for {} platinum.",
                self.trader, friendly, self.price
            ),
            OrderSide::Buy => format!(
                "/w {} Hi! I want to sell: \"{}\" for {} platinum.",
                self.trader, friendly, self.price
            ),
        }
    }
}

/// Best current prices extracted from a filtered order set.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestPrices {
    pub min_sell: Option<i64>,
    pub max_buy: Option<i64>,
}

impl BestPrices {
    pub fn from_orders(orders: &[Order]) -> Self {
        let min_sell = orders
            .iter()
            .filter(|o| o.side == OrderSide::Sell)
            .map(|o| o.price)
            .min();
        let max_buy = orders
            .iter()
            .filter(|o| o.side == OrderSide::Buy)
            .map(|o| o.price)
            .max();

        Self { min_sell, max_buy }
    }
}

/// Normalizes user input to the API-stable item key: lowercase, trimmed,
/// internal spaces replaced with underscores. None for blank input.
pub fn normalize_item_key(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_lowercase().replace(' ', "_"))
}

/// "secura_dual_cestra" -> "Secura Dual Cestra"
pub fn friendly_item_name(item_key: &str) -> String {
    item_key
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
