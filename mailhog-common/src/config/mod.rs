//! Configuration types shared across crates.

pub mod timeouts;

pub use timeouts::ServerTimeouts;
