pub mod report;
pub mod runner;
pub mod state;

pub use report::{AssetError, AssetOutcome, RunReport};
pub use runner::Scheduler;
pub use state::{AssetState, RunState, RunStatus};
