pub use medallion_core as core;
pub use medallion_utils as utils;

// Convenience re-exports for common usage
pub use medallion_core::asset::{AdapterRef, AssetKey, Layer, Materialization, WarehouseTarget};
pub use medallion_core::builder::AssetBuilder;
pub use medallion_core::dag::AssetRegistry;
pub use medallion_core::engine::{Adapters, Engine, EngineError};
pub use medallion_core::scheduler::{AssetState, RunReport, RunStatus, Scheduler};
pub use medallion_core::transforms::{AssetInputs, AssetTransform, FnTransform, Passthrough};
pub use medallion_utils::{ErrorKind, MedallionResult, Table};
