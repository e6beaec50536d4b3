//! Storage backend implementations.
//!
//! Only the in-memory backend lives here; anything persistent implements
//! [`crate::Storage`] in its own crate.

pub mod memory;

pub use memory::InMemory;
