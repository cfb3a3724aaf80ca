use crate::keys::CacheKey;

/// Change notifications broadcast by the query store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A fetch started, settled or was cancelled for the key.
    Updated(CacheKey),
    /// Entry dropped from memory by eviction.
    Removed(CacheKey),
    /// Store replaced wholesale from a snapshot.
    Restored { entries: usize },
    Cleared,
}

impl StoreEvent {
    pub fn key(&self) -> Option<&CacheKey> {
        match self {
            StoreEvent::Updated(key) | StoreEvent::Removed(key) => Some(key),
            StoreEvent::Restored { .. } | StoreEvent::Cleared => None,
        }
    }

    /// Whether the change can alter what `snapshot()` returns.
    pub fn affects_snapshot(&self) -> bool {
        !matches!(self, StoreEvent::Restored { .. })
    }
}
