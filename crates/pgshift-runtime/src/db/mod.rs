mod cursor;
mod pool;

pub use cursor::{Cursor, SavepointResult};
pub use pool::Database;
