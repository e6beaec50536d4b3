use std::fmt::Debug;

use mailhog_common::{Message, MessageId, Messages};

use crate::SearchKind;

/// The capability every storage backend provides.
///
/// Backends are shared by all sessions at once, so every method takes
/// `&self` and implementations synchronise internally. An ID returned by
/// [`Storage::store`] must be visible to `load`, `list` and `search` from
/// any other session as soon as the call returns.
pub trait Storage: Send + Sync + Debug {
    /// Persists `message`, returning the ID it can be loaded by.
    fn store(&self, message: Message) -> crate::Result<MessageId>;

    /// Up to `limit` messages, newest first, skipping the first `start`.
    fn list(&self, start: usize, limit: usize) -> crate::Result<Messages>;

    /// Like [`Storage::list`] over only the matching messages. Also
    /// returns the total number of matches before pagination.
    ///
    /// Matching is a case-insensitive substring test, see [`SearchKind`].
    fn search(
        &self,
        kind: SearchKind,
        query: &str,
        start: usize,
        limit: usize,
    ) -> crate::Result<(Messages, usize)>;

    fn count(&self) -> usize;

    /// Fails with [`crate::StorageError::NotFound`] for unknown IDs.
    fn delete_one(&self, id: &MessageId) -> crate::Result<()>;

    fn delete_all(&self) -> crate::Result<()>;

    /// A missing message is `Ok(None)`, not an error.
    fn load(&self, id: &MessageId) -> crate::Result<Option<Message>>;
}
