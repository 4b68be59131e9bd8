//! One upstream feed per table and owner, fanned out to every subscriber.
//!
//! The first subscription to a table opens a platform change feed and spawns a
//! task that applies each event to the query cache, then broadcasts it. Later
//! subscriptions to the same table share that task. Each subscription keeps the
//! topic alive; when the last one is dropped the task is aborted, which drops the
//! feed and leaves the platform channel. A topic whose feed has ended is replaced
//! by a fresh one on the next subscription.

use super::{ChangeEvent, apply::apply_change};
use crate::cache::QueryCache;
use crate::client::BackendClient;
use crate::client::platform::{ChangeFeed, RawChange};
use crate::config::settings::RealtimeSettings;
use crate::core::{Resource, SortKey};
use crate::errors::Result;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

type TopicKey = (&'static str, Uuid);

struct Topic {
    key: TopicKey,
    events: broadcast::Receiver<RawChange>,
    upstream: JoinHandle<()>,
}

impl Drop for Topic {
    fn drop(&mut self) {
        debug!("Releasing realtime topic {} for {}", self.key.0, self.key.1);
        self.upstream.abort();
    }
}

async fn forward(
    mut feed: ChangeFeed,
    cache: Arc<QueryCache>,
    sender: broadcast::Sender<RawChange>,
    table: &'static str,
    sort: SortKey,
    owner: Uuid,
) {
    while let Some(change) = feed.recv().await {
        apply_change(&cache, table, sort, owner, &change).await;
        let _ = sender.send(change);
    }
    warn!("Realtime feed for {} ended", table);
}

/// Shares realtime feeds between subscribers and keeps the cache in step with them.
pub struct RealtimeBridge {
    client: Arc<BackendClient>,
    cache: Arc<QueryCache>,
    capacity: usize,
    topics: Mutex<HashMap<TopicKey, Weak<Topic>>>,
}

impl RealtimeBridge {
    /// A bridge with no open topics.
    #[must_use]
    pub fn new(
        client: Arc<BackendClient>,
        cache: Arc<QueryCache>,
        settings: &RealtimeSettings,
    ) -> Self {
        Self {
            client,
            cache,
            capacity: settings.channel_capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to changes of the caller's `R` rows.
    pub async fn subscribe<R: Resource>(&self) -> Result<LiveSubscription<R::Row>> {
        let owner = self.client.require_session().await?.owner();
        let key = (R::TABLE, owner);

        let mut topics = self.topics.lock().await;
        topics.retain(|_, topic| topic.strong_count() > 0);
        let live = topics
            .get(&key)
            .and_then(Weak::upgrade)
            .filter(|topic| !topic.upstream.is_finished());
        if let Some(topic) = live {
            debug!("Joining realtime topic {} for {}", R::TABLE, owner);
            return Ok(LiveSubscription::new(topic));
        }

        let feed = self.client.listen(R::TABLE).await?;
        let (sender, events) = broadcast::channel(self.capacity);
        let upstream = tokio::spawn(forward(
            feed,
            Arc::clone(&self.cache),
            sender,
            R::TABLE,
            R::SORT,
            owner,
        ));
        let topic = Arc::new(Topic {
            key,
            events,
            upstream,
        });
        topics.insert(key, Arc::downgrade(&topic));
        info!("Opened realtime topic {} for {}", R::TABLE, owner);
        Ok(LiveSubscription::new(topic))
    }

    /// Number of topics with at least one subscriber.
    pub async fn active_topics(&self) -> usize {
        self.topics
            .lock()
            .await
            .values()
            .filter(|topic| topic.strong_count() > 0)
            .count()
    }
}

/// A consumer's view of a shared topic. Dropping it unsubscribes.
pub struct LiveSubscription<T> {
    topic: Arc<Topic>,
    events: broadcast::Receiver<RawChange>,
    row: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LiveSubscription<T> {
    fn new(topic: Arc<Topic>) -> Self {
        let events = topic.events.resubscribe();
        Self {
            topic,
            events,
            row: PhantomData,
        }
    }

    /// Table the subscription follows.
    #[must_use]
    pub fn table(&self) -> &'static str {
        self.topic.key.0
    }

    /// Next event, already applied to the cache; `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ChangeEvent<T>> {
        loop {
            match self.events.recv().await {
                Ok(raw) => match ChangeEvent::from_raw(&raw) {
                    Ok(event) => return Some(event),
                    Err(e) => warn!("Skipping change event on {}: {}", self.table(), e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Subscription to {} skipped {} events", self.table(), skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::cache::QueryKey;
    use crate::client::platform::EventType;
    use crate::core::{ResourceApi, goals::Goals};
    use crate::client::memory::MemoryPlatform;
    use crate::test_utils::{new_goal, signed_in_client};
    use serde_json::json;
    use std::time::Duration;

    async fn bridge() -> Result<(RealtimeBridge, Arc<QueryCache>, Arc<BackendClient>, Uuid)> {
        let (bridge, cache, client, owner, _platform) = bridge_with_platform().await?;
        Ok((bridge, cache, client, owner))
    }

    async fn bridge_with_platform()
    -> Result<(RealtimeBridge, Arc<QueryCache>, Arc<BackendClient>, Uuid, Arc<MemoryPlatform>)> {
        let (client, platform, owner) = signed_in_client().await?;
        let cache = Arc::new(QueryCache::new(Duration::from_secs(30)));
        let bridge = RealtimeBridge::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            &RealtimeSettings::default(),
        );
        Ok((bridge, cache, client, owner, platform))
    }

    #[tokio::test]
    async fn test_subscribers_share_one_topic() -> Result<()> {
        let (bridge, _cache, client, _owner) = bridge().await?;
        let mut first = bridge.subscribe::<Goals>().await?;
        let mut second = bridge.subscribe::<Goals>().await?;
        assert_eq!(bridge.active_topics().await, 1);

        ResourceApi::<Goals>::new(client).create(new_goal("Boat", 2033)).await?;
        assert_eq!(first.recv().await.unwrap().event_type, EventType::Insert);
        assert_eq!(second.recv().await.unwrap().new.unwrap().title, "Boat");
        Ok(())
    }

    #[tokio::test]
    async fn test_last_drop_releases_topic() -> Result<()> {
        let (bridge, _cache, _client, _owner) = bridge().await?;
        let first = bridge.subscribe::<Goals>().await?;
        let second = bridge.subscribe::<Goals>().await?;

        drop(first);
        assert_eq!(bridge.active_topics().await, 1);
        drop(second);
        assert_eq!(bridge.active_topics().await, 0);

        let _again = bridge.subscribe::<Goals>().await?;
        assert_eq!(bridge.active_topics().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_events_reach_cache_before_subscribers() -> Result<()> {
        let (bridge, cache, client, owner) = bridge().await?;
        let key = QueryKey::list(Goals::TABLE, owner);
        cache.set(key.clone(), json!([])).await;
        let mut live = bridge.subscribe::<Goals>().await?;

        let goal = ResourceApi::<Goals>::new(client).create(new_goal("Gap year", 2028)).await?;
        let event = live.recv().await.unwrap();
        assert_eq!(event.id, goal.id);

        let cached = cache.data(&key).await.unwrap();
        assert_eq!(cached.as_array().unwrap().len(), 1);
        assert_eq!(cached[0]["title"], "Gap year");
        Ok(())
    }

    #[tokio::test]
    async fn test_ended_feed_is_reopened_for_new_subscribers() -> Result<()> {
        let (bridge, _cache, client, _owner, platform) = bridge_with_platform().await?;
        let mut stale = bridge.subscribe::<Goals>().await?;

        platform.disconnect_feeds();
        assert!(stale.recv().await.is_none());

        let mut fresh = bridge.subscribe::<Goals>().await?;
        ResourceApi::<Goals>::new(client).create(new_goal("Retire", 2040)).await?;
        let event = fresh.recv().await.unwrap();
        assert_eq!(event.new.unwrap().title, "Retire");
        Ok(())
    }
}
