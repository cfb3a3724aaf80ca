use crate::domain::Snapshot;
use crate::ports::SnapshotStorage;
use crate::query::QueryStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::Millis;
use shared::config::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const STORAGE_KEY: &str = "unsplash-gallery-cache";
pub const DEFAULT_BUSTER: &str = "v1";
/// Hard cap on the age of a snapshot accepted by `restore`.
pub const MAX_SNAPSHOT_AGE: Millis = Millis::from_hours(24);
/// Records older than this are treated as corrupt by the health check.
pub const UNHEALTHY_SNAPSHOT_AGE: Millis = Millis::from_days(7);
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// On-disk layout of a persisted store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState<V> {
    pub timestamp: i64,
    pub buster: String,
    pub client_state: Snapshot<V>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistOptions {
    pub key: String,
    pub buster: String,
    pub max_age: Millis,
    pub throttle: Duration,
}

impl PersistOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            buster: config.cache_buster.clone(),
            throttle: Duration::from_millis(config.persist_throttle_ms),
            ..Self::default()
        }
    }
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            key: STORAGE_KEY.to_string(),
            buster: DEFAULT_BUSTER.to_string(),
            max_age: MAX_SNAPSHOT_AGE,
            throttle: DEFAULT_THROTTLE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    Corrupt,
    BusterMismatch,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Nothing stored, or storage unreadable.
    Empty,
    Restored { entries: usize },
    /// A record existed but was unusable and has been removed.
    Discarded(DiscardReason),
}

/// Summary of the persisted record, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub timestamp: i64,
    pub queries: usize,
    pub size_bytes: usize,
}

impl CacheStats {
    pub fn age(&self, now: i64) -> Millis {
        Millis(now - self.timestamp)
    }
}

/// Loose view of a record used by the stats and health paths, which must
/// work without knowing the payload type.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordHeader {
    timestamp: i64,
    #[serde(default)]
    client_state: Option<QueriesHeader>,
}

#[derive(Deserialize)]
struct QueriesHeader {
    #[serde(default)]
    queries: Vec<serde_json::Value>,
}

/// Moves query-store snapshots in and out of durable storage.
///
/// Every storage failure is logged and absorbed: the cache is an
/// optimisation, so a broken record only ever costs a cold start.
pub struct Persister<V>
where
    V: Clone + Send + Sync + 'static,
{
    store: QueryStore<V>,
    storage: Arc<dyn SnapshotStorage>,
    options: PersistOptions,
}

impl<V> Clone for Persister<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            storage: self.storage.clone(),
            options: self.options.clone(),
        }
    }
}

impl<V> Persister<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    pub fn new(store: QueryStore<V>, storage: Arc<dyn SnapshotStorage>, options: PersistOptions) -> Self {
        Self {
            store,
            storage,
            options,
        }
    }

    pub fn options(&self) -> &PersistOptions {
        &self.options
    }

    /// Load the stored snapshot into the store, discarding anything stale,
    /// corrupt or written under another buster.
    pub fn restore(&self) -> RestoreOutcome {
        let bytes = match self.storage.read(&self.options.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("no persisted cache");
                return RestoreOutcome::Empty;
            }
            Err(e) => {
                warn!(error = %e, "failed to read persisted cache, starting empty");
                return RestoreOutcome::Empty;
            }
        };

        let state: PersistedState<V> = match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "persisted cache is unreadable, discarding");
                return self.discard(DiscardReason::Corrupt);
            }
        };

        if state.buster != self.options.buster {
            info!(stored = %state.buster, current = %self.options.buster, "cache buster changed, discarding");
            return self.discard(DiscardReason::BusterMismatch);
        }

        let age = self.store.now() - state.timestamp;
        if age > self.options.max_age.0 {
            info!(age_ms = age, "persisted cache expired, discarding");
            return self.discard(DiscardReason::Expired);
        }

        let entries = self.store.restore(state.client_state);
        info!(entries, "restored persisted cache");
        RestoreOutcome::Restored { entries }
    }

    fn discard(&self, reason: DiscardReason) -> RestoreOutcome {
        self.clear_persisted();
        RestoreOutcome::Discarded(reason)
    }

    /// Write the store's current snapshot. Returns whether the write landed.
    pub fn persist_now(&self) -> bool {
        let state = PersistedState {
            timestamp: self.store.now(),
            buster: self.options.buster.clone(),
            client_state: self.store.snapshot(),
        };
        let queries = state.client_state.len();

        let bytes = match serde_json::to_vec(&state) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to serialize cache snapshot");
                return false;
            }
        };

        match self.storage.write(&self.options.key, &bytes) {
            Ok(()) => {
                debug!(queries, size_bytes = bytes.len(), "persisted cache");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to persist cache");
                false
            }
        }
    }

    /// Persist on store changes, at most once per throttle interval, until
    /// `shutdown` fires. Pending changes are flushed before returning.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut events = self.store.subscribe();
        let mut ticker = interval(self.options.throttle);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut dirty = false;

        info!(throttle_ms = self.options.throttle.as_millis() as u64, "cache persister started");
        loop {
            tokio::select! {
                result = shutdown.recv() => {
                    match result {
                        Ok(()) | Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {}
                    }
                }

                event = events.recv() => {
                    match event {
                        Ok(event) => dirty |= event.affects_snapshot(),
                        Err(RecvError::Lagged(missed)) => {
                            debug!(missed, "persister lagged behind store events");
                            dirty = true;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }

                _ = ticker.tick() => {
                    if dirty {
                        self.persist_now();
                        dirty = false;
                    }
                }
            }
        }

        // Changes that raced the shutdown signal still belong in the flush.
        loop {
            match events.try_recv() {
                Ok(event) => dirty |= event.affects_snapshot(),
                Err(TryRecvError::Lagged(_)) => dirty = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        if dirty {
            self.persist_now();
        }
        info!("cache persister stopped");
    }

    /// Summary of the stored record, or `None` when absent or unreadable.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        let bytes = match self.storage.read(&self.options.key) {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(error = %e, "failed to read cache stats");
                return None;
            }
        };
        let header: RecordHeader = match serde_json::from_slice(&bytes) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "failed to parse cache stats");
                return None;
            }
        };
        Some(CacheStats {
            timestamp: header.timestamp,
            queries: header.client_state.map_or(0, |state| state.queries.len()),
            size_bytes: bytes.len(),
        })
    }

    /// A missing record is healthy. A record that cannot be read, or is older
    /// than [`UNHEALTHY_SNAPSHOT_AGE`], is removed and reported unhealthy.
    pub fn is_cache_healthy(&self, now: i64) -> bool {
        let bytes = match self.storage.read(&self.options.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return true,
            Err(e) => {
                warn!(error = %e, "cache health check failed");
                self.clear_persisted();
                return false;
            }
        };

        match serde_json::from_slice::<RecordHeader>(&bytes) {
            Ok(header) if now - header.timestamp > UNHEALTHY_SNAPSHOT_AGE.0 => {
                warn!(age_ms = now - header.timestamp, "persisted cache too old, clearing");
                self.clear_persisted();
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "persisted cache is corrupt, clearing");
                self.clear_persisted();
                false
            }
        }
    }

    pub fn clear_persisted(&self) {
        if let Err(e) = self.storage.remove(&self.options.key) {
            warn!(error = %e, "failed to clear persisted cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{DehydratedQuery, DehydratedState, QueryStatus};
    use crate::keys::{photo_key, search_key};
    use crate::persistence::MemoryStorage;
    use crate::query::QueryOptions;
    use shared::{Error, Result};

    const NOW: i64 = 1_700_000_000_000;

    struct BrokenStorage;

    impl SnapshotStorage for BrokenStorage {
        fn read(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::Storage("disk unavailable".into()))
        }

        fn write(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::Storage("disk unavailable".into()))
        }
    }

    fn setup() -> (Persister<String>, QueryStore<String>, Arc<MemoryStorage>) {
        let store = QueryStore::with_clock(Arc::new(ManualClock::new(NOW)));
        let storage = Arc::new(MemoryStorage::new());
        let persister = Persister::new(store.clone(), storage.clone(), PersistOptions::default());
        (persister, store, storage)
    }

    fn record(timestamp: i64, buster: &str, fetched_at: i64) -> Vec<u8> {
        let state = PersistedState {
            timestamp,
            buster: buster.to_string(),
            client_state: Snapshot {
                queries: vec![DehydratedQuery {
                    key: search_key("mountains", 1, 20),
                    state: DehydratedState {
                        status: QueryStatus::Success,
                        data: "peaks".to_string(),
                        fetched_at,
                        stale_after: Millis::from_mins(15).0,
                        evict_after: Millis::from_hours(1).0,
                    },
                }],
            },
        };
        serde_json::to_vec(&state).unwrap()
    }

    #[test]
    fn test_persisted_layout() {
        let bytes = record(NOW, "v1", NOW - 10);
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["timestamp"], NOW);
        assert_eq!(json["buster"], "v1");
        let query = &json["clientState"]["queries"][0];
        assert_eq!(query["key"], serde_json::json!(["search", "mountains", 1, 20]));
        assert_eq!(query["state"]["fetchedAt"], NOW - 10);
        assert_eq!(query["state"]["data"], "peaks");
    }

    #[test]
    fn test_restore_missing_record_is_empty() {
        let (persister, store, _storage) = setup();
        assert_eq!(persister.restore(), RestoreOutcome::Empty);
        assert!(store.is_empty());
    }

    #[test]
    fn test_restore_valid_record() {
        let (persister, store, storage) = setup();
        storage.write(STORAGE_KEY, &record(NOW - 1_000, "v1", NOW - 5_000)).unwrap();

        assert_eq!(persister.restore(), RestoreOutcome::Restored { entries: 1 });
        let entry = store.peek(&search_key("mountains", 1, 20)).unwrap();
        assert_eq!(entry.data.as_deref(), Some("peaks"));
        assert_eq!(entry.fetched_at, Some(NOW - 5_000));
    }

    #[test]
    fn test_restore_discards_old_snapshot() {
        let (persister, store, storage) = setup();
        let eight_days = Millis::from_days(8).0;
        storage.write(STORAGE_KEY, &record(NOW - eight_days, "v1", NOW - eight_days)).unwrap();

        assert_eq!(
            persister.restore(),
            RestoreOutcome::Discarded(DiscardReason::Expired)
        );
        assert!(store.is_empty());
        assert!(storage.read(STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_restore_age_boundary() {
        let (persister, store, storage) = setup();
        let max_age = MAX_SNAPSHOT_AGE.0;
        storage.write(STORAGE_KEY, &record(NOW - max_age, "v1", NOW - max_age)).unwrap();
        assert_eq!(persister.restore(), RestoreOutcome::Restored { entries: 1 });

        store.clear();
        storage.write(STORAGE_KEY, &record(NOW - max_age - 1, "v1", NOW - max_age)).unwrap();
        assert_eq!(
            persister.restore(),
            RestoreOutcome::Discarded(DiscardReason::Expired)
        );
    }

    #[test]
    fn test_restore_discards_other_buster() {
        let (persister, store, storage) = setup();
        storage.write(STORAGE_KEY, &record(NOW, "v0", NOW)).unwrap();

        assert_eq!(
            persister.restore(),
            RestoreOutcome::Discarded(DiscardReason::BusterMismatch)
        );
        assert!(store.is_empty());
        assert!(storage.read(STORAGE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_restore_discards_corrupt_record() {
        let (persister, store, storage) = setup();
        storage.write(STORAGE_KEY, b"{not json").unwrap();

        assert_eq!(
            persister.restore(),
            RestoreOutcome::Discarded(DiscardReason::Corrupt)
        );
        assert!(store.is_empty());
        assert!(storage.read(STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_now_writes_success_entries_only() {
        let (persister, store, storage) = setup();
        store
            .get(
                photo_key("ok"),
                || async { Ok::<_, Error>("photo".to_string()) },
                QueryOptions::default(),
            )
            .await;
        store
            .get(
                photo_key("bad"),
                || async { Err::<String, _>(Error::NotFound) },
                QueryOptions::default(),
            )
            .await;

        assert!(persister.persist_now());

        let bytes = storage.read(STORAGE_KEY).unwrap().unwrap();
        let state: PersistedState<String> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(state.timestamp, NOW);
        assert_eq!(state.buster, "v1");
        assert_eq!(state.client_state.len(), 1);
        assert_eq!(state.client_state.queries[0].key, photo_key("ok"));
    }

    #[test]
    fn test_storage_failures_are_absorbed() {
        let store: QueryStore<String> = QueryStore::with_clock(Arc::new(ManualClock::new(NOW)));
        let persister = Persister::new(store.clone(), Arc::new(BrokenStorage), PersistOptions::default());

        assert_eq!(persister.restore(), RestoreOutcome::Empty);
        assert!(!persister.persist_now());
        assert!(persister.cache_stats().is_none());
        assert!(!persister.is_cache_healthy(NOW));
        persister.clear_persisted();
    }

    #[test]
    fn test_cache_stats() {
        let (persister, _store, storage) = setup();
        assert!(persister.cache_stats().is_none());

        let bytes = record(NOW - 60_000, "v1", NOW - 60_000);
        storage.write(STORAGE_KEY, &bytes).unwrap();

        let stats = persister.cache_stats().unwrap();
        assert_eq!(stats.queries, 1);
        assert_eq!(stats.size_bytes, bytes.len());
        assert_eq!(stats.age(NOW), Millis::from_mins(1));
    }

    #[test]
    fn test_health_check() {
        let (persister, _store, storage) = setup();
        assert!(persister.is_cache_healthy(NOW));

        storage.write(STORAGE_KEY, &record(NOW - Millis::from_days(2).0, "v1", NOW)).unwrap();
        assert!(persister.is_cache_healthy(NOW));

        let eight_days = Millis::from_days(8).0;
        storage.write(STORAGE_KEY, &record(NOW - eight_days, "v1", NOW)).unwrap();
        assert!(!persister.is_cache_healthy(NOW));
        assert!(storage.read(STORAGE_KEY).unwrap().is_none());

        storage.write(STORAGE_KEY, b"garbage").unwrap();
        assert!(!persister.is_cache_healthy(NOW));
        assert!(storage.read(STORAGE_KEY).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_throttles_and_flushes_on_shutdown() {
        let (persister, store, storage) = setup();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let runner = persister.clone();
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });
        tokio::task::yield_now().await;

        store
            .get(
                photo_key("a"),
                || async { Ok::<_, Error>("a".to_string()) },
                QueryOptions::default(),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(persister.cache_stats().unwrap().queries, 1);

        store
            .get(
                photo_key("b"),
                || async { Ok::<_, Error>("b".to_string()) },
                QueryOptions::default(),
            )
            .await;
        tokio::task::yield_now().await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let bytes = storage.read(STORAGE_KEY).unwrap().unwrap();
        let state: PersistedState<String> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(state.client_state.len(), 2);
    }
}
