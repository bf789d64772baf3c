pub mod definition;
pub mod key;
pub mod materialization;

pub use definition::{AdapterKind, AdapterRef, AssetDefinition, WarehouseColumn, WarehouseTarget};
pub use key::{AssetKey, Layer};
pub use materialization::Materialization;
