mod memory_store;
mod persister;
mod sled_store;

pub use memory_store::MemoryStorage;
pub use persister::{
    CacheStats, DEFAULT_BUSTER, DEFAULT_THROTTLE, DiscardReason, MAX_SNAPSHOT_AGE, PersistOptions,
    PersistedState, Persister, RestoreOutcome, STORAGE_KEY, UNHEALTHY_SNAPSHOT_AGE,
};
pub use sled_store::SledStorage;
