use std::sync::{Arc, PoisonError, RwLock};

use ahash::AHashMap;
use mailhog_common::{Message, MessageId, Messages, internal};

use crate::{SearchKind, Storage, StorageError};

#[derive(Debug, Default)]
struct Inner {
    /// Oldest first, in arrival order.
    messages: Vec<Message>,
    index: AHashMap<MessageId, usize>,
}

/// In-memory storage backend
///
/// Messages live in a `Vec` in arrival order with an ID to position index
/// alongside, both behind a single `RwLock`. Cloning shares the same
/// underlying store.
///
/// # Capacity Management
/// The store can be configured with a maximum capacity. Once reached,
/// `store` fails with [`StorageError::CapacityExceeded`] until something is
/// deleted.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    inner: Arc<RwLock<Inner>>,
    /// Maximum number of messages to store (None = unlimited)
    capacity: Option<usize>,
}

/// Newest-first page of `messages`.
fn page<'a>(
    messages: impl DoubleEndedIterator<Item = &'a Message>,
    start: usize,
    limit: usize,
) -> Messages {
    messages.rev().skip(start).take(limit).cloned().collect()
}

impl InMemory {
    /// Create a new empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store holding at most `capacity` messages
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Get the configured capacity (None = unlimited)
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Storage for InMemory {
    fn store(&self, message: Message) -> crate::Result<MessageId> {
        let mut inner = self.inner.write()?;
        let id = message.id.clone();

        if let Some(&position) = inner.index.get(&id) {
            inner.messages[position] = message;
            return Ok(id);
        }

        if let Some(capacity) = self.capacity
            && inner.messages.len() >= capacity
        {
            return Err(StorageError::CapacityExceeded {
                stored: inner.messages.len(),
                capacity,
            });
        }

        inner.messages.push(message);
        let position = inner.messages.len() - 1;
        inner.index.insert(id.clone(), position);

        internal!("Stored message {} at position {}", id, position);
        Ok(id)
    }

    fn list(&self, start: usize, limit: usize) -> crate::Result<Messages> {
        Ok(page(self.inner.read()?.messages.iter(), start, limit))
    }

    fn search(
        &self,
        kind: SearchKind,
        query: &str,
        start: usize,
        limit: usize,
    ) -> crate::Result<(Messages, usize)> {
        let query = query.to_lowercase();
        let inner = self.inner.read()?;

        let matched = inner
            .messages
            .iter()
            .filter(|message| kind.matches(message, &query))
            .collect::<Vec<_>>();

        Ok((
            page(matched.iter().copied(), start, limit),
            matched.len(),
        ))
    }

    fn count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .messages
            .len()
    }

    fn delete_one(&self, id: &MessageId) -> crate::Result<()> {
        let mut inner = self.inner.write()?;

        let position = inner
            .index
            .remove(id)
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;

        inner.messages.remove(position);
        for index in inner.index.values_mut() {
            if *index > position {
                *index -= 1;
            }
        }

        Ok(())
    }

    fn delete_all(&self) -> crate::Result<()> {
        let mut inner = self.inner.write()?;
        inner.messages.clear();
        inner.index.clear();
        Ok(())
    }

    fn load(&self, id: &MessageId) -> crate::Result<Option<Message>> {
        let inner = self.inner.read()?;
        Ok(inner
            .index
            .get(id)
            .and_then(|&position| inner.messages.get(position))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use mailhog_common::SmtpMessage;
    use pretty_assertions::assert_eq;

    use super::*;

    fn message(from: &str, to: &str, data: &str) -> Message {
        SmtpMessage {
            from: from.to_string(),
            to: vec![to.to_string()],
            data: data.to_string(),
            helo: "localhost".to_string(),
        }
        .parse("mailhog.example")
    }

    fn numbered(n: usize) -> Message {
        message("a@b", "c@d", &format!("Subject: {n}\r\n\r\nmessage {n}"))
    }

    fn bodies(messages: &Messages) -> Vec<&str> {
        messages.iter().map(|m| m.content.body.as_str()).collect()
    }

    #[test]
    fn store_load_and_delete() {
        let store = InMemory::new();
        let msg = numbered(1);
        let id = store.store(msg.clone()).expect("Failed to store");

        assert_eq!(id, msg.id);
        assert_eq!(store.count(), 1);
        assert_eq!(store.load(&id).expect("Failed to load"), Some(msg));

        store.delete_one(&id).expect("Failed to delete");
        assert_eq!(store.count(), 0);
        assert_eq!(store.load(&id).expect("Failed to load"), None);
    }

    #[test]
    fn missing_messages() {
        let store = InMemory::new();
        let id = MessageId::from("nope@mailhog.example");

        assert_eq!(store.load(&id).expect("Failed to load"), None);
        assert!(matches!(
            store.delete_one(&id),
            Err(StorageError::NotFound(missing)) if missing == id
        ));
    }

    #[test]
    fn list_is_newest_first_and_paginated() {
        let store = InMemory::new();
        for n in 0..5 {
            store.store(numbered(n)).expect("Failed to store");
        }

        let all = store.list(0, 10).expect("Failed to list");
        assert_eq!(
            bodies(&all),
            vec!["message 4", "message 3", "message 2", "message 1", "message 0"]
        );

        let page = store.list(1, 2).expect("Failed to list");
        assert_eq!(bodies(&page), vec!["message 3", "message 2"]);

        assert!(store.list(10, 2).expect("Failed to list").is_empty());
    }

    #[test]
    fn delete_keeps_index_consistent() {
        let store = InMemory::new();
        let ids = (0..4)
            .map(|n| store.store(numbered(n)).expect("Failed to store"))
            .collect::<Vec<_>>();

        store.delete_one(&ids[1]).expect("Failed to delete");

        for (n, id) in ids.iter().enumerate().filter(|(n, _)| *n != 1) {
            let loaded = store.load(id).expect("Failed to load").expect("present");
            assert_eq!(loaded.content.body, format!("message {n}"));
        }
    }

    #[test]
    fn delete_all_empties_the_store() {
        let store = InMemory::new();
        let id = store.store(numbered(0)).expect("Failed to store");
        store.store(numbered(1)).expect("Failed to store");

        store.delete_all().expect("Failed to delete");
        assert_eq!(store.count(), 0);
        assert_eq!(store.load(&id).expect("Failed to load"), None);
    }

    #[test]
    fn search_by_kind() {
        let store = InMemory::new();
        store
            .store(message("Alice@Example.com", "bob@example.com", "Subject: hi\r\n\r\nlunch?"))
            .expect("Failed to store");
        store
            .store(message(
                "carol@example.com",
                "dave@example.com",
                "To: Bob Builder <builder@example.com>\r\n\r\nInvoice attached",
            ))
            .expect("Failed to store");

        let (found, total) = store.search(SearchKind::From, "alice", 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(bodies(&found), vec!["lunch?"]);

        // Recipient path or To header
        let (found, total) = store.search(SearchKind::To, "BOB", 0, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(bodies(&found), vec!["Invoice attached", "lunch?"]);

        let (found, total) = store.search(SearchKind::Containing, "invoice", 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(bodies(&found), vec!["Invoice attached"]);

        // Header values count for "containing"
        let (_, total) = store.search(SearchKind::Containing, "subject", 0, 10).unwrap();
        assert_eq!(total, 0);
        let (_, total) = store.search(SearchKind::Containing, "(mailhog)", 0, 10).unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn search_paginates_but_reports_full_count() {
        let store = InMemory::new();
        for n in 0..6 {
            store.store(numbered(n)).expect("Failed to store");
        }

        let (found, total) = store.search(SearchKind::Containing, "message", 2, 2).unwrap();
        assert_eq!(total, 6);
        assert_eq!(bodies(&found), vec!["message 3", "message 2"]);
    }

    #[test]
    fn capacity_limit() {
        let store = InMemory::with_capacity(2);
        assert_eq!(store.capacity(), Some(2));

        store.store(numbered(1)).expect("First store should succeed");
        let second = store.store(numbered(2)).expect("Second store should succeed");

        let result = store.store(numbered(3));
        assert!(matches!(
            result,
            Err(StorageError::CapacityExceeded { stored: 2, capacity: 2 })
        ));

        store.delete_one(&second).expect("Failed to delete");
        assert!(store.store(numbered(3)).is_ok());
    }

    #[test]
    fn concurrent_stores_get_unique_ids() {
        let store = InMemory::new();

        std::thread::scope(|scope| {
            for n in 0..8 {
                let store = store.clone();
                scope.spawn(move || {
                    for i in 0..25 {
                        store.store(numbered(n * 100 + i)).expect("Store failed");
                    }
                });
            }
        });

        assert_eq!(store.count(), 200);
        let ids = store
            .list(0, 200)
            .expect("Failed to list")
            .into_iter()
            .map(|m| m.id)
            .collect::<HashSet<_>>();
        assert_eq!(ids.len(), 200);
    }
}
