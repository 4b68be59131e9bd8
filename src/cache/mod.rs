//! Query cache - de-duplicated, stale-while-revalidate storage of query results.
//!
//! Results are stored as shared JSON values keyed by [`QueryKey`]. A key has at
//! most one fetch in flight: later callers wait on the same fetch instead of
//! starting their own. Fetches run in their own task, so a caller that goes away
//! mid-fetch neither cancels it nor receives its result, while the result still
//! lands in the cache.
//!
//! A result becomes stale once it is older than the configured stale time or has
//! been invalidated. Stale data is returned immediately and a background fetch
//! refreshes it. Invalidating a key while its fetch is in flight marks the
//! incoming result stale as well, so it is refetched on the next read.

/// Which cached queries a write affects
pub mod invalidation;
/// Cache keys
pub mod key;

pub use key::{QueryKey, Scope};

use crate::config::settings::CacheSettings;
use crate::errors::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// A cached result, shared between every reader
pub type SharedValue = Arc<Value>;

type FetchOutcome = Option<Result<SharedValue>>;

/// Notification of a change to one cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// New data or a new error was stored
    Updated(QueryKey),
    /// The data is now stale
    Invalidated(QueryKey),
    /// The entry was dropped
    Removed(QueryKey),
}

/// How [`QueryCache::update_entries`] treats one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryUpdate {
    /// Leave as is
    Keep,
    /// Swap in new data
    Replace(Value),
    /// Drop the entry
    Remove,
}

/// Point-in-time view of one query.
#[derive(Debug, Clone, Default)]
pub struct CachedQuery {
    /// Last successful result
    pub data: Option<SharedValue>,
    /// Error of the last fetch, if it failed
    pub error: Option<Error>,
    /// Whether `data` is due for a refresh
    pub is_stale: bool,
    /// Whether a fetch is running
    pub is_fetching: bool,
}

/// Saved data of some entries, for rolling back an optimistic write.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, Option<SharedValue>)>,
}

impl CacheSnapshot {
    /// Number of entries captured.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct Entry {
    data: Option<SharedValue>,
    error: Option<Error>,
    fetched_at: Option<Instant>,
    invalidated: bool,
}

struct InFlight {
    id: u64,
    receiver: watch::Receiver<FetchOutcome>,
    superseded: bool,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, InFlight>,
    next_fetch: u64,
}

impl Inner {
    fn supersede(&mut self, resource: &str, owner: Uuid) {
        for (key, flight) in &mut self.in_flight {
            if key.covers(resource, owner) {
                flight.superseded = true;
            }
        }
    }
}

async fn wait_for_outcome(receiver: &mut watch::Receiver<FetchOutcome>) -> Result<SharedValue> {
    let outcome = receiver
        .wait_for(Option::is_some)
        .await
        .map_err(|_| Error::transport("fetch ended without a result"))?
        .clone();
    outcome.unwrap_or_else(|| Err(Error::transport("fetch ended without a result")))
}

/// Query results shared by every consumer of a [`crate::hooks::DataContext`].
pub struct QueryCache {
    inner: Mutex<Inner>,
    stale_time: Duration,
    events: broadcast::Sender<CacheEvent>,
}

impl QueryCache {
    /// An empty cache whose results go stale after `stale_time`.
    #[must_use]
    pub fn new(stale_time: Duration) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Mutex::new(Inner::default()),
            stale_time,
            events,
        }
    }

    /// An empty cache configured from settings.
    #[must_use]
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.stale_time())
    }

    /// Receives every [`CacheEvent`] from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: CacheEvent) {
        trace!("Cache event {:?}", event);
        let _ = self.events.send(event);
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        entry.invalidated
            || entry
                .fetched_at
                .is_none_or(|at| at.elapsed() >= self.stale_time)
    }

    /// Cached data for `key`, fetching it when absent.
    ///
    /// Fresh data is returned as is. Stale data is returned as is while
    /// `fetcher` refreshes it in the background. Without data the caller waits
    /// for the fetch, joining one already in flight rather than starting another.
    pub async fn fetch<F, Fut>(self: &Arc<Self>, key: QueryKey, fetcher: F) -> Result<SharedValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut receiver = {
            let mut inner = self.inner.lock().await;
            let cached = inner
                .entries
                .get(&key)
                .and_then(|entry| entry.data.as_ref().map(|d| (Arc::clone(d), self.is_stale(entry))));

            match cached {
                Some((data, false)) => {
                    trace!("Cache hit for {}", key);
                    return Ok(data);
                }
                Some((data, true)) => {
                    if !inner.in_flight.contains_key(&key) {
                        debug!("Serving stale {} while revalidating", key);
                        self.start_fetch(&mut inner, key, fetcher());
                    }
                    return Ok(data);
                }
                None => {
                    let joined = inner.in_flight.get(&key).map(|f| f.receiver.clone());
                    if let Some(receiver) = joined {
                        trace!("Joining in-flight fetch of {}", key);
                        receiver
                    } else {
                        self.start_fetch(&mut inner, key, fetcher())
                    }
                }
            }
        };

        wait_for_outcome(&mut receiver).await
    }

    /// Fetches `key` again even if the cached data is fresh.
    pub async fn refetch<F, Fut>(self: &Arc<Self>, key: QueryKey, fetcher: F) -> Result<SharedValue>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut receiver = {
            let mut inner = self.inner.lock().await;
            let joined = inner.in_flight.get(&key).map(|f| f.receiver.clone());
            match joined {
                Some(receiver) => receiver,
                None => self.start_fetch(&mut inner, key, fetcher()),
            }
        };
        wait_for_outcome(&mut receiver).await
    }

    fn start_fetch<Fut>(
        self: &Arc<Self>,
        inner: &mut Inner,
        key: QueryKey,
        fetch: Fut,
    ) -> watch::Receiver<FetchOutcome>
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(None);
        let id = inner.next_fetch;
        inner.next_fetch += 1;
        inner.in_flight.insert(
            key.clone(),
            InFlight {
                id,
                receiver: receiver.clone(),
                superseded: false,
            },
        );
        debug!("Fetching {}", key);

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = fetch.await.map(Arc::new);
            cache.complete(key, id, &outcome).await;
            let _ = sender.send(Some(outcome));
        });
        receiver
    }

    async fn complete(&self, key: QueryKey, id: u64, outcome: &Result<SharedValue>) {
        let mut inner = self.inner.lock().await;
        let superseded = match inner.in_flight.get(&key) {
            Some(flight) if flight.id == id => flight.superseded,
            _ => {
                debug!("Discarding result of cancelled fetch for {}", key);
                return;
            }
        };
        inner.in_flight.remove(&key);

        let entry = inner.entries.entry(key.clone()).or_default();
        match outcome {
            Ok(data) => {
                entry.data = Some(Arc::clone(data));
                entry.error = None;
                entry.fetched_at = Some(Instant::now());
                entry.invalidated = superseded;
            }
            Err(e) => {
                warn!("Fetch of {} failed: {}", key, e);
                entry.error = Some(e.clone());
            }
        }
        drop(inner);
        self.notify(CacheEvent::Updated(key));
    }

    /// Current state of `key` without fetching.
    pub async fn peek(&self, key: &QueryKey) -> CachedQuery {
        let inner = self.inner.lock().await;
        let is_fetching = inner.in_flight.contains_key(key);
        inner
            .entries
            .get(key)
            .map_or_else(
                || CachedQuery {
                    is_fetching,
                    ..CachedQuery::default()
                },
                |entry| CachedQuery {
                    data: entry.data.clone(),
                    error: entry.error.clone(),
                    is_stale: entry.data.is_some() && self.is_stale(entry),
                    is_fetching,
                },
            )
    }

    /// Cached data for `key`, fresh or stale.
    pub async fn data(&self, key: &QueryKey) -> Option<SharedValue> {
        self.inner
            .lock()
            .await
            .entries
            .get(key)
            .and_then(|entry| entry.data.clone())
    }

    /// Stores `value` as fresh data for `key`.
    pub async fn set(&self, key: QueryKey, value: Value) {
        let mut inner = self.inner.lock().await;
        if let Some(flight) = inner.in_flight.get_mut(&key) {
            flight.superseded = true;
        }
        let entry = inner.entries.entry(key.clone()).or_default();
        entry.data = Some(Arc::new(value));
        entry.error = None;
        entry.fetched_at = Some(Instant::now());
        entry.invalidated = false;
        drop(inner);
        self.notify(CacheEvent::Updated(key));
    }

    /// Marks every entry of `resource` for `owner` stale; returns how many there were.
    pub async fn invalidate(&self, resource: &str, owner: Uuid) -> usize {
        let mut inner = self.inner.lock().await;
        inner.supersede(resource, owner);
        let keys: Vec<QueryKey> = inner
            .entries
            .iter_mut()
            .filter(|(key, _)| key.covers(resource, owner))
            .map(|(key, entry)| {
                entry.invalidated = true;
                key.clone()
            })
            .collect();
        drop(inner);

        let count = keys.len();
        for key in keys {
            self.notify(CacheEvent::Invalidated(key));
        }
        count
    }

    /// Invalidates everything that depends on a write to `table`.
    pub async fn invalidate_after_write(&self, table: &str, owner: Uuid) {
        let mut resources = invalidation::dependents(table);
        if resources.is_empty() {
            warn!("No invalidation edges for table {}", table);
        }
        resources.retain(|r| *r != table);
        let mut count = self.invalidate(table, owner).await;
        for resource in resources {
            count += self.invalidate(resource, owner).await;
        }
        debug!("Write to {} invalidated {} cached queries", table, count);
    }

    /// Rewrites or drops cached entries of `resource` for `owner`.
    ///
    /// `update` sees every entry holding data. Fetches in flight for the
    /// resource are marked stale since they may predate the change.
    pub async fn update_entries<F>(&self, resource: &str, owner: Uuid, mut update: F)
    where
        F: FnMut(&QueryKey, &Value) -> EntryUpdate,
    {
        let mut inner = self.inner.lock().await;
        inner.supersede(resource, owner);

        let mut events = Vec::new();
        inner.entries.retain(|key, entry| {
            if !key.covers(resource, owner) {
                return true;
            }
            let Some(data) = &entry.data else {
                return true;
            };
            match update(key, data) {
                EntryUpdate::Keep => true,
                EntryUpdate::Replace(value) => {
                    entry.data = Some(Arc::new(value));
                    events.push(CacheEvent::Updated(key.clone()));
                    true
                }
                EntryUpdate::Remove => {
                    events.push(CacheEvent::Removed(key.clone()));
                    false
                }
            }
        });
        drop(inner);

        for event in events {
            self.notify(event);
        }
    }

    /// Captures the data of every entry of `resource` for `owner`.
    pub async fn snapshot(&self, resource: &str, owner: Uuid) -> CacheSnapshot {
        let inner = self.inner.lock().await;
        CacheSnapshot {
            entries: inner
                .entries
                .iter()
                .filter(|(key, _)| key.covers(resource, owner))
                .map(|(key, entry)| (key.clone(), entry.data.clone()))
                .collect(),
        }
    }

    /// Puts captured data back exactly as it was.
    pub async fn restore(&self, snapshot: CacheSnapshot) {
        let mut inner = self.inner.lock().await;
        let mut events = Vec::with_capacity(snapshot.entries.len());
        for (key, data) in snapshot.entries {
            inner.entries.entry(key.clone()).or_default().data = data;
            events.push(CacheEvent::Updated(key));
        }
        drop(inner);
        for event in events {
            self.notify(event);
        }
    }

    /// Drops every entry and in-flight fetch of `owner`; returns how many entries went.
    pub async fn clear_owner(&self, owner: Uuid) -> usize {
        let mut inner = self.inner.lock().await;
        inner.in_flight.retain(|key, _| key.owner != owner);
        let removed: Vec<QueryKey> = inner
            .entries
            .keys()
            .filter(|key| key.owner == owner)
            .cloned()
            .collect();
        for key in &removed {
            inner.entries.remove(key);
        }
        drop(inner);

        debug!("Cleared {} cached queries for {}", removed.len(), owner);
        let count = removed.len();
        for key in removed {
            self.notify(CacheEvent::Removed(key));
        }
        count
    }

    /// Number of entries held.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether no entries are held.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
