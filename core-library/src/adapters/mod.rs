//! Storage adapter implementations
//!
//! Concrete implementations of the `KeyValueStore` bridge trait.

pub mod sqlite_native;

pub use sqlite_native::SqliteStore;
