pub mod db;
pub mod pool;

pub use db::{with_store, HistoryError, Store};
pub use pool::{PoolError, SqlitePool};
