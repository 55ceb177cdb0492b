use std::fmt;
use std::sync::Arc;

use crate::market::{MarketSource, OrderSide};
use crate::storage::Store;

/// Minimum historical sample before an item can be classified.
pub const MIN_HISTORY_POINTS: usize = 5;
/// An item is a good buy when its current cheapest sell offer is below this
/// fraction of the 7-day median.
pub const BUY_THRESHOLD: f64 = 0.85;
/// Historical window for the median, in days.
pub const HISTORY_WINDOW_DAYS: i64 = 7;

/// The evaluator's verdict for one item at one point in time. Display
/// formatting is a presentation concern applied after the fact.
#[derive(Debug, Clone, PartialEq)]
pub enum DealVerdict {
    GoodDeal { current_sell: i64, threshold: f64 },
    Normal { current_sell: i64, median: f64 },
    InsufficientHistory { have: usize, need: usize },
    ApiFetchFailed,
    CalculationFailed,
}

impl fmt::Display for DealVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DealVerdict::GoodDeal {
                current_sell,
                threshold,
            } => write!(f, "Good Buy! ({}p < {:.0}p)", current_sell, threshold),
            DealVerdict::Normal {
                current_sell,
                median,
            } => write!(f, "Normal ({}p vs {:.0}p)", current_sell, median),
            DealVerdict::InsufficientHistory { need, .. } => {
                write!(f, "Not Enough Data (<{})", need)
            }
            DealVerdict::ApiFetchFailed => write!(f, "Error: API Fetch Failed"),
            DealVerdict::CalculationFailed => write!(f, "Error: Calculation Failed"),
        }
    }
}

/// Moving-median mean-reversion check: an item is worth buying when its
/// current cheapest sell offer sits meaningfully below its typical 7-day
/// cheapest-sell level.
pub struct DealEvaluator {
    market: Arc<dyn MarketSource>,
    store: Arc<dyn Store>,
}

impl DealEvaluator {
    pub fn new(market: Arc<dyn MarketSource>, store: Arc<dyn Store>) -> Self {
        Self { market, store }
    }

    /// Never fails: upstream and storage problems are folded into the
    /// verdict so one bad item cannot abort a whole check cycle.
    pub async fn evaluate(&self, item_key: &str, platform: &str) -> DealVerdict {
        let best = match self.market.best_prices(item_key, platform).await {
            Ok(best) => best,
            Err(e) => {
                tracing::warn!("Price fetch failed for {}: {}", item_key, e);
                return DealVerdict::ApiFetchFailed;
            }
        };

        let Some(current_sell) = best.min_sell else {
            return DealVerdict::ApiFetchFailed;
        };

        let history = match self
            .store
            .historical_prices(item_key, platform, OrderSide::Sell, HISTORY_WINDOW_DAYS)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("History lookup failed for {}: {}", item_key, e);
                return DealVerdict::CalculationFailed;
            }
        };

        if history.len() < MIN_HISTORY_POINTS {
            return DealVerdict::InsufficientHistory {
                have: history.len(),
                need: MIN_HISTORY_POINTS,
            };
        }

        let Some(median) = median(&history) else {
            return DealVerdict::CalculationFailed;
        };

        let threshold = median * BUY_THRESHOLD;
        tracing::debug!(
            "Check '{}': current sell={}, median(7d)={:.1}, threshold={:.1}",
            item_key,
            current_sell,
            median,
            threshold
        );

        if (current_sell as f64) < threshold {
            DealVerdict::GoodDeal {
                current_sell,
                threshold,
            }
        } else {
            DealVerdict::Normal {
                current_sell,
                median,
            }
        }
    }
}

/// Standard median of a sorted sequence, averaging the two middle values for
/// even counts. None only for an empty slice.
pub fn median(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_unstable();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) as f64 / 2.0)
    } else {
        Some(sorted[mid] as f64)
    }
}
