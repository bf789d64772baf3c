pub mod error;
pub mod table;

use error::Error;

pub use error::ErrorKind;
pub use table::Table;

pub type MedallionResult<T> = Result<T, Error>;
