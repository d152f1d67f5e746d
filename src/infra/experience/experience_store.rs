// Implementations of the experience ledger's storage port.
#![allow(unused_imports)]

#[path = "in_memory.rs"]
pub mod in_memory;
#[path = "sqlite_store.rs"]
pub mod sqlite_store;

// Re-export for convenience
pub use in_memory::InMemoryExpStore;
pub use sqlite_store::SqliteExpStore;
