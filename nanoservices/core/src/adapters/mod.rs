pub mod object;
pub mod source;
pub mod sqlite;
pub mod traits;
pub mod warehouse;

pub use object::{FileObjectStore, MemoryObjectStore};
pub use source::SqliteExtractor;
pub use traits::{LoadResult, Metadata, ObjectMaterializer, SourceExtractor, WarehouseLoader};
pub use warehouse::SqliteWarehouse;
