use super::options::QueryOptions;
use super::retry::RetryPolicy;
use crate::clock::{Clock, SystemClock};
use crate::domain::{CacheEntry, DehydratedQuery, DehydratedState, QueryStatus, Snapshot};
use crate::events::StoreEvent;
use crate::keys::CacheKey;
use dashmap::DashMap;
use shared::{Millis, Result};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The single fetch currently allowed to write a key.
struct InFlight {
    id: u64,
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

struct Slot<V> {
    entry: CacheEntry<V>,
    observers: usize,
    in_flight: Option<InFlight>,
    /// Last settle, restore or observer detach; eviction counts from here.
    idle_since: i64,
}

impl<V> Slot<V> {
    fn new(stale_after: Millis, evict_after: Millis, now: i64) -> Self {
        Self {
            entry: CacheEntry::pending(stale_after, evict_after),
            observers: 0,
            in_flight: None,
            idle_since: now,
        }
    }

    fn cancel_fetch(&mut self) -> bool {
        match self.in_flight.take() {
            Some(fetch) => {
                fetch.cancel.cancel();
                self.entry.is_fetching = false;
                true
            }
            None => false,
        }
    }
}

struct Inner<V> {
    slots: DashMap<CacheKey, Slot<V>>,
    clock: Arc<dyn Clock>,
    next_fetch_id: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

/// Keyed request cache with freshness windows, single-flight fetching and
/// observer-driven cancellation. Cloning yields another handle to the same
/// store.
///
/// Every mutation happens inside one map-entry lock that is never held across
/// an await, so checking and registering a fetch for a key is atomic.
pub struct QueryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Arc<Inner<V>>,
}

impl<V> Clone for QueryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Debug for QueryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryStore")
            .field("entries", &self.inner.slots.len())
            .finish()
    }
}

impl<V> Default for QueryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> QueryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                slots: DashMap::new(),
                clock,
                next_fetch_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn now(&self) -> i64 {
        self.inner.clock.now_ms()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    pub fn len(&self) -> usize {
        self.inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.slots.is_empty()
    }

    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        self.inner.slots.get(key).map(|slot| slot.entry.clone())
    }

    /// Return the entry for `key`, fetching it first when there is no data.
    ///
    /// Fresh data is returned without touching the provider. Stale data is
    /// returned immediately while one background refetch runs. Without data
    /// the call waits for the key's single in-flight fetch; concurrent callers
    /// share it. Dropping every waiting call cancels that fetch.
    pub async fn get<F, Fut>(&self, key: CacheKey, fetcher: F, options: QueryOptions) -> CacheEntry<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (entry, wait) = self.begin(&key, fetcher, &options, true);
        let Some((_waiter, mut done)) = wait else {
            return entry;
        };

        // Err only if the fetch task vanished; the entry tells the rest.
        let _ = done.wait_for(|settled| *settled).await;
        self.peek(&key).unwrap_or(entry)
    }

    /// Same decision as [`get`](Self::get) but never waits: a needed fetch is
    /// started and the current entry returned.
    pub fn ensure<F, Fut>(&self, key: CacheKey, fetcher: F, options: QueryOptions) -> CacheEntry<V>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        self.begin(&key, fetcher, &options, false).0
    }

    /// Wait for the in-flight fetch of `key`, if any, without observing it.
    pub async fn settled(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let done = self
            .inner
            .slots
            .get(key)
            .and_then(|slot| slot.in_flight.as_ref().map(|fetch| fetch.done.clone()));
        if let Some(mut done) = done {
            let _ = done.wait_for(|settled| *settled).await;
        }
        self.peek(key)
    }

    /// Register interest in `key`. While any observer is alive the entry is
    /// never evicted; when the last one drops, an in-flight fetch is cancelled.
    pub fn observe(&self, key: CacheKey) -> Observer<V> {
        let now = self.now();
        let (stale_after, evict_after) = default_windows(&key);
        self.inner
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(stale_after, evict_after, now))
            .observers += 1;
        Observer {
            store: self.clone(),
            key,
        }
    }

    pub fn observer_count(&self, key: &CacheKey) -> usize {
        self.inner.slots.get(key).map_or(0, |slot| slot.observers)
    }

    /// Force the next `get` to treat the key's data as stale.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let found = match self.inner.slots.get_mut(key) {
            Some(mut slot) => {
                slot.entry.is_invalidated = true;
                true
            }
            None => false,
        };
        if found {
            debug!(key = %key, "invalidated");
            self.emit(StoreEvent::Updated(key.clone()));
        }
        found
    }

    /// Cancel the key's in-flight fetch. Its completion, if it still arrives,
    /// is discarded.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        let now = self.now();
        let cancelled = match self.inner.slots.get_mut(key) {
            Some(mut slot) => {
                let cancelled = slot.cancel_fetch();
                if cancelled {
                    slot.idle_since = now;
                }
                cancelled
            }
            None => false,
        };
        if cancelled {
            debug!(key = %key, "fetch cancelled");
            self.emit(StoreEvent::Updated(key.clone()));
        }
        cancelled
    }

    /// Drop entries idle for longer than their eviction window that nobody
    /// observes and nothing is fetching. Returns how many were removed.
    pub fn evict_expired(&self, now: i64) -> usize {
        let mut removed = Vec::new();
        self.inner.slots.retain(|key, slot| {
            let expired = slot.observers == 0
                && slot.in_flight.is_none()
                && now - slot.idle_since > slot.entry.evict_after.0;
            if expired {
                removed.push(key.clone());
            }
            !expired
        });

        let count = removed.len();
        for key in removed {
            debug!(key = %key, "evicted");
            self.emit(StoreEvent::Removed(key));
        }
        count
    }

    /// Success entries only; pending and failed ones are not replayable.
    pub fn snapshot(&self) -> Snapshot<V> {
        let mut queries: Vec<DehydratedQuery<V>> = self
            .inner
            .slots
            .iter()
            .filter_map(|item| {
                DehydratedState::from_entry(&item.value().entry).map(|state| DehydratedQuery {
                    key: item.key().clone(),
                    state,
                })
            })
            .collect();
        queries.sort_by(|a, b| a.key.cmp(&b.key));
        Snapshot { queries }
    }

    /// Replace every entry with the snapshot's, keeping each entry's original
    /// fetch time. In-flight fetches are cancelled; observers stay attached.
    pub fn restore(&self, snapshot: Snapshot<V>) -> usize {
        let restored = self.replace_all(snapshot);
        self.emit(StoreEvent::Restored { entries: restored });
        restored
    }

    pub fn clear(&self) {
        self.replace_all(Snapshot::default());
        self.emit(StoreEvent::Cleared);
    }

    fn replace_all(&self, snapshot: Snapshot<V>) -> usize {
        let now = self.now();
        let mut observed: HashMap<CacheKey, usize> = HashMap::new();
        self.inner.slots.retain(|key, slot| {
            slot.cancel_fetch();
            if slot.observers > 0 {
                observed.insert(key.clone(), slot.observers);
            }
            false
        });

        let restored = snapshot.len();
        for query in snapshot.queries {
            let observers = observed.remove(&query.key).unwrap_or(0);
            let idle_since = query.state.fetched_at;
            self.inner.slots.insert(
                query.key,
                Slot {
                    entry: query.state.into_entry(),
                    observers,
                    in_flight: None,
                    idle_since,
                },
            );
        }
        for (key, observers) in observed {
            let (stale_after, evict_after) = default_windows(&key);
            let mut slot = Slot::new(stale_after, evict_after, now);
            slot.observers = observers;
            self.inner.slots.insert(key, slot);
        }
        restored
    }

    /// Decide whether `key` needs a fetch, start it, and optionally register
    /// the caller as a waiter. Runs under the key's map lock.
    fn begin<F, Fut>(
        &self,
        key: &CacheKey,
        fetcher: F,
        options: &QueryOptions,
        wait: bool,
    ) -> (CacheEntry<V>, Option<(Observer<V>, watch::Receiver<bool>)>)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        if !options.enabled {
            let entry = self
                .peek(key)
                .unwrap_or_else(|| CacheEntry::pending(options.stale_after, options.evict_after));
            return (entry, None);
        }

        let now = self.now();
        let mut started = false;
        let (entry, done) = {
            let mut slot = self
                .inner
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(options.stale_after, options.evict_after, now));
            slot.entry.stale_after = options.stale_after;
            slot.entry.evict_after = options.evict_after;

            let needs_fetch = !slot.entry.has_data() || slot.entry.is_stale(now);
            if needs_fetch && slot.in_flight.is_none() {
                slot.in_flight = Some(self.spawn_fetch(key.clone(), fetcher, options));
                slot.entry.is_fetching = true;
                started = true;
            } else if !needs_fetch {
                debug!(key = %key, "cache hit");
            } else {
                debug!(key = %key, "joining in-flight fetch");
            }

            let done = match &slot.in_flight {
                Some(fetch) if wait && !slot.entry.has_data() => Some(fetch.done.clone()),
                _ => None,
            };
            if done.is_some() {
                slot.observers += 1;
            }
            (slot.entry.clone(), done)
        };

        if started {
            self.emit(StoreEvent::Updated(key.clone()));
        }
        let waiter = done.map(|done| {
            (
                Observer {
                    store: self.clone(),
                    key: key.clone(),
                },
                done,
            )
        });
        (entry, waiter)
    }

    fn spawn_fetch<F, Fut>(&self, key: CacheKey, fetcher: F, options: &QueryOptions) -> InFlight
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        let policy = RetryPolicy::new(options.retry_count, options.retry_delay);
        let store = self.clone();
        let token = cancel.clone();

        debug!(key = %key, fetch_id = id, "fetch started");
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = token.cancelled() => None,
                result = policy.run(|_| fetcher()) => Some(result),
            };
            store.settle(&key, id, outcome);
            let _ = done_tx.send(true);
        });

        InFlight {
            id,
            cancel,
            done: done_rx,
        }
    }

    /// Apply a fetch outcome, but only if `id` is still the key's canonical
    /// fetch. `None` means the fetch observed its own cancellation.
    fn settle(&self, key: &CacheKey, id: u64, outcome: Option<Result<V>>) {
        let now = self.now();
        let applied = match self.inner.slots.get_mut(key) {
            Some(mut slot) => {
                let canonical = slot.in_flight.as_ref().is_some_and(|fetch| fetch.id == id);
                if canonical {
                    slot.in_flight = None;
                    slot.entry.is_fetching = false;
                    slot.idle_since = now;
                    match outcome {
                        Some(Ok(data)) => {
                            let entry = &mut slot.entry;
                            entry.status = QueryStatus::Success;
                            entry.data = Some(data);
                            entry.error = None;
                            entry.refetch_error = None;
                            entry.fetched_at = Some(now);
                            entry.is_invalidated = false;
                            debug!(key = %key, fetch_id = id, "fetch succeeded");
                        }
                        Some(Err(err)) if slot.entry.has_data() => {
                            debug!(key = %key, fetch_id = id, error = %err, "revalidation failed, keeping data");
                            slot.entry.refetch_error = Some(err);
                        }
                        Some(Err(err)) => {
                            debug!(key = %key, fetch_id = id, error = %err, "fetch failed");
                            slot.entry.status = QueryStatus::Error;
                            slot.entry.error = Some(err);
                        }
                        None => {}
                    }
                }
                canonical
            }
            None => false,
        };

        if applied {
            self.emit(StoreEvent::Updated(key.clone()));
        } else {
            debug!(key = %key, fetch_id = id, "discarding superseded fetch result");
        }
    }

    fn release(&self, key: &CacheKey) {
        let now = self.now();
        let cancelled = match self.inner.slots.get_mut(key) {
            Some(mut slot) => {
                slot.observers = slot.observers.saturating_sub(1);
                if slot.observers == 0 {
                    slot.idle_since = now;
                    slot.cancel_fetch()
                } else {
                    false
                }
            }
            None => false,
        };
        if cancelled {
            debug!(key = %key, "last observer left, fetch cancelled");
            self.emit(StoreEvent::Updated(key.clone()));
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }
}

fn default_windows(key: &CacheKey) -> (Millis, Millis) {
    match key.category() {
        Some(category) => (category.stale_after(), category.evict_after()),
        None => {
            let options = QueryOptions::default();
            (options.stale_after, options.evict_after)
        }
    }
}

/// Live interest in one key. Dropping it detaches from the store.
pub struct Observer<V>
where
    V: Clone + Send + Sync + 'static,
{
    store: QueryStore<V>,
    key: CacheKey,
}

impl<V> Observer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn entry(&self) -> Option<CacheEntry<V>> {
        self.store.peek(&self.key)
    }
}

impl<V> Debug for Observer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("key", &self.key).finish()
    }
}

impl<V> Drop for Observer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.store.release(&self.key);
    }
}
