pub mod models;
pub mod sqlite;
pub mod store;

pub use models::{AddOutcome, WatchedItem, Watchlist};
pub use sqlite::SqliteStore;
pub use store::Store;

#[cfg(test)]
pub use store::MockStore;
