pub mod registry;
pub mod resolver;

pub use registry::AssetRegistry;
pub use resolver::{AssetGraph, DagError, TopologicalOrder};
