pub mod evaluator;
pub mod scheduler;
pub mod state;

pub use evaluator::{DealEvaluator, DealVerdict};
pub use scheduler::{CheckTrigger, CycleSummary, WatchlistScheduler};
pub use state::AppState;
