//! Cache change notifications.
//!
//! Views re-render from cache state; these events tell them when to re-read.

use aula_core::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// A response was applied to the entry.
    Updated,
    /// The latest request for the entry failed.
    Failed,
    /// The entry was marked stale by a mutation.
    Invalidated,
    /// The entry was evicted by garbage collection.
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Entry { key: QueryKey, kind: CacheEventKind },
    /// Every entry was dropped (sign-out).
    Cleared,
}

impl CacheEvent {
    pub fn entry(key: QueryKey, kind: CacheEventKind) -> Self {
        CacheEvent::Entry { key, kind }
    }

    /// True if this event concerns `key` (a clear concerns every key).
    pub fn affects(&self, key: &QueryKey) -> bool {
        match self {
            CacheEvent::Entry { key: event_key, .. } => event_key == key,
            CacheEvent::Cleared => true,
        }
    }
}
