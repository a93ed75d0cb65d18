//! Local cache layer for billfold

mod connection;
mod memory;
mod migrations;
pub(crate) mod store;

pub use connection::Database;
pub use memory::MemoryInvoiceStore;
pub use store::{LocalStore, SqliteInvoiceStore};
