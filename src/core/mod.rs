pub mod error;
pub mod types;

pub use error::{DbError, DriverError, Result};
pub use types::{DatabaseNaming, Location, Mode, ShardId, Side, Target};
