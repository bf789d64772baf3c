pub mod relational;
pub mod traits;

pub use relational::{Aggregate, AggFunc, Fill};
pub use traits::{AssetInputs, AssetTransform, FnTransform, Passthrough};
