pub mod backends;
pub mod config;
pub mod error;
pub mod search;
pub mod r#trait;

pub use backends::InMemory;
pub use config::StorageConfig;
pub use error::{Result, StorageError};
pub use search::SearchKind;
pub use r#trait::Storage;
