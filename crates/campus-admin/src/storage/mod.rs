//! Storage backends implementing the billing repository traits.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, WindowedTable};
pub use sqlite::SqliteStore;
