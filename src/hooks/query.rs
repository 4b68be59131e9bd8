//! Query handles.
//!
//! A [`Query`] names one cached query and knows how to fetch it. The owner part
//! of its key comes from the session at call time, so a handle keeps working
//! across sign-ins.

use crate::cache::{CachedQuery, QueryCache, QueryKey, Scope};
use crate::client::BackendClient;
use crate::errors::{Error, Result};
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Produces the JSON value of a query for the client's current session.
pub(crate) type Fetcher =
    Arc<dyn Fn(Arc<BackendClient>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Lifecycle of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Never fetched
    Idle,
    /// A fetch is running; earlier data, if any, is kept
    Loading,
    /// Data is available
    Success,
    /// The last fetch failed; earlier data, if any, is kept
    Error,
}

/// What a consumer renders from.
#[derive(Debug, Clone)]
pub struct QuerySnapshot<T> {
    /// Lifecycle of the query
    pub status: QueryStatus,
    /// Last successful result
    pub data: Option<T>,
    /// Error of the last fetch, if it failed
    pub error: Option<Error>,
    /// Data is due for a refresh
    pub is_stale: bool,
    /// A fetch is in flight
    pub is_fetching: bool,
}

impl<T> QuerySnapshot<T> {
    fn failed(error: Error) -> Self {
        Self {
            status: QueryStatus::Error,
            data: None,
            error: Some(error),
            is_stale: false,
            is_fetching: false,
        }
    }
}

impl<T: DeserializeOwned> QuerySnapshot<T> {
    fn from_cached(cached: CachedQuery) -> Self {
        let mut error = cached.error;
        let data = match cached
            .data
            .map(|value| serde_json::from_value::<T>(Value::clone(&value)))
        {
            Some(Ok(data)) => Some(data),
            Some(Err(e)) => {
                error = Some(Error::transport(format!("unreadable cached data: {e}")));
                None
            }
            None => None,
        };

        let status = if cached.is_fetching {
            QueryStatus::Loading
        } else if error.is_some() {
            QueryStatus::Error
        } else if data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Idle
        };

        Self {
            status,
            data,
            error,
            is_stale: cached.is_stale,
            is_fetching: cached.is_fetching,
        }
    }
}

/// A cached query of type `T`.
pub struct Query<T> {
    client: Arc<BackendClient>,
    cache: Arc<QueryCache>,
    resource: &'static str,
    scope: Scope,
    fetcher: Fetcher,
    output: PhantomData<fn() -> T>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            cache: Arc::clone(&self.cache),
            resource: self.resource,
            scope: self.scope.clone(),
            fetcher: Arc::clone(&self.fetcher),
            output: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Query<T> {
    pub(crate) fn new(
        client: Arc<BackendClient>,
        cache: Arc<QueryCache>,
        resource: &'static str,
        scope: Scope,
        fetcher: Fetcher,
    ) -> Self {
        Self {
            client,
            cache,
            resource,
            scope,
            fetcher,
            output: PhantomData,
        }
    }

    /// Key of this query for the current session.
    pub async fn key(&self) -> Result<QueryKey> {
        let owner = self.client.require_session().await?.owner();
        Ok(QueryKey {
            resource: self.resource,
            owner,
            scope: self.scope.clone(),
        })
    }

    fn bound_fetcher(&self) -> impl FnOnce() -> BoxFuture<'static, Result<Value>> {
        let client = Arc::clone(&self.client);
        let fetcher = Arc::clone(&self.fetcher);
        move || fetcher(client)
    }

    /// Serves cached data, fetching or revalidating as needed.
    pub async fn fetch(&self) -> QuerySnapshot<T> {
        let key = match self.key().await {
            Ok(key) => key,
            Err(e) => return QuerySnapshot::failed(e),
        };
        let result = self.cache.fetch(key.clone(), self.bound_fetcher()).await;
        self.settle(&key, result).await
    }

    /// Fetches again regardless of freshness.
    pub async fn refetch(&self) -> QuerySnapshot<T> {
        let key = match self.key().await {
            Ok(key) => key,
            Err(e) => return QuerySnapshot::failed(e),
        };
        let result = self.cache.refetch(key.clone(), self.bound_fetcher()).await;
        self.settle(&key, result).await
    }

    async fn settle(&self, key: &QueryKey, result: Result<Arc<Value>>) -> QuerySnapshot<T> {
        let mut snapshot = QuerySnapshot::from_cached(self.cache.peek(key).await);
        if let Err(e) = result {
            if snapshot.error.is_none() {
                snapshot.error = Some(e);
            }
            if !snapshot.is_fetching {
                snapshot.status = QueryStatus::Error;
            }
        }
        snapshot
    }

    /// Current state without fetching.
    pub async fn snapshot(&self) -> QuerySnapshot<T> {
        match self.key().await {
            Ok(key) => QuerySnapshot::from_cached(self.cache.peek(&key).await),
            Err(e) => QuerySnapshot::failed(e),
        }
    }

    /// The query's data, fetched if needed.
    pub async fn data(&self) -> Result<T> {
        let key = self.key().await?;
        let value = self.cache.fetch(key, self.bound_fetcher()).await?;
        serde_json::from_value(Value::clone(&value))
            .map_err(|e| Error::transport(format!("unreadable {} data: {e}", self.resource)))
    }

    /// Marks the query's resource stale for the current session.
    pub async fn invalidate(&self) -> Result<()> {
        let key = self.key().await?;
        self.cache.invalidate(key.resource, key.owner).await;
        Ok(())
    }
}
