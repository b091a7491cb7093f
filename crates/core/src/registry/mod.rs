//! Durable registry of issued tickets.

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteRegistry;
pub use store::{Registry, RegistryError};
pub use types::{Ticket, ROW_SCHEMA_VERSION};
