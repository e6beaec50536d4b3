use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{InMemory, Storage};

/// Configuration for the storage backend
///
/// Unlimited in-memory storage:
/// ```ron
/// MailHog (
///     storage: Memory(capacity: None),
/// )
/// ```
///
/// In-memory storage with a capacity limit:
/// ```ron
/// MailHog (
///     storage: Memory(
///         capacity: Some(1000),
///     ),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageConfig {
    Memory {
        /// Maximum number of messages to store (None = unlimited)
        #[serde(default)]
        capacity: Option<usize>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory { capacity: None }
    }
}

impl StorageConfig {
    /// Build the configured backend as a shareable trait object
    #[must_use]
    pub fn into_storage(self) -> Arc<dyn Storage> {
        match self {
            Self::Memory { capacity } => capacity.map_or_else(
                || Arc::new(InMemory::new()),
                |capacity| Arc::new(InMemory::with_capacity(capacity)),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_from_ron() {
        let config: StorageConfig = ron::from_str("Memory(capacity: Some(3))").unwrap();
        assert_eq!(config, StorageConfig::Memory { capacity: Some(3) });

        let config: StorageConfig = ron::from_str("Memory(capacity: None)").unwrap();
        assert_eq!(config, StorageConfig::default());
    }

    #[test]
    fn builds_an_empty_store() {
        let storage = StorageConfig::default().into_storage();
        assert_eq!(storage.count(), 0);
    }
}
