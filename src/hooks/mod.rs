//! Data hooks - what a UI layer binds to.
//!
//! A [`DataContext`] owns the client, the query cache and the realtime bridge
//! for one application. It hands out [`Query`] handles for lists, single rows
//! and aggregates, [`Mutation`] handles that keep the cache consistent after
//! writes, and live subscriptions that patch the cache as changes arrive.

/// Mutation handles
pub mod mutation;
/// Query handles
pub mod query;

pub use mutation::{Mutation, MutationState, MutationStatus};
pub use query::{Query, QuerySnapshot, QueryStatus};

use crate::cache::{QueryCache, Scope};
use crate::client::BackendClient;
use crate::client::platform::Filter;
use crate::config::settings::Settings;
use crate::core::summary::{self, NET_WORTH, NetWorth, PORTFOLIO_SUMMARY, PortfolioSummary};
use crate::core::{Resource, ResourceApi, to_json};
use crate::errors::Result;
use crate::realtime::{LiveSubscription, RealtimeBridge};
use futures_util::FutureExt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Client, cache and realtime bridge shared by every hook.
#[derive(Clone)]
pub struct DataContext {
    client: Arc<BackendClient>,
    cache: Arc<QueryCache>,
    bridge: Arc<RealtimeBridge>,
}

impl DataContext {
    /// A context with an empty cache and no open topics.
    #[must_use]
    pub fn new(client: Arc<BackendClient>, settings: &Settings) -> Self {
        let cache = Arc::new(QueryCache::from_settings(&settings.cache));
        let bridge = Arc::new(RealtimeBridge::new(
            Arc::clone(&client),
            Arc::clone(&cache),
            &settings.realtime,
        ));
        Self {
            client,
            cache,
            bridge,
        }
    }

    /// The backend client.
    #[must_use]
    pub const fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    /// The query cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Uncached access to one resource.
    #[must_use]
    pub fn api<R: Resource>(&self) -> ResourceApi<R> {
        ResourceApi::new(Arc::clone(&self.client))
    }

    fn query<T: serde::de::DeserializeOwned>(
        &self,
        resource: &'static str,
        scope: Scope,
        fetcher: query::Fetcher,
    ) -> Query<T> {
        Query::new(
            Arc::clone(&self.client),
            Arc::clone(&self.cache),
            resource,
            scope,
            fetcher,
        )
    }

    /// All of the caller's `R` rows.
    #[must_use]
    pub fn query_list<R: Resource>(&self) -> Query<Vec<R::Row>> {
        self.query_filtered::<R>(Vec::new())
    }

    /// The caller's `R` rows matching every filter.
    #[must_use]
    pub fn query_filtered<R: Resource>(&self, mut filters: Vec<Filter>) -> Query<Vec<R::Row>> {
        filters.sort();
        filters.dedup();
        let scope = Scope::List(filters.clone());
        let filters = Arc::new(filters);
        self.query(
            R::TABLE,
            scope,
            Arc::new(move |client: Arc<BackendClient>| {
                let filters = Arc::clone(&filters);
                async move {
                    let rows = ResourceApi::<R>::new(client).list_filtered(&filters).await?;
                    to_json(&rows)
                }
                .boxed()
            }),
        )
    }

    /// One of the caller's `R` rows; `None` when absent.
    #[must_use]
    pub fn query_detail<R: Resource>(&self, id: Uuid) -> Query<Option<R::Row>> {
        self.query(
            R::TABLE,
            Scope::Detail(id),
            Arc::new(move |client: Arc<BackendClient>| {
                async move {
                    let row = ResourceApi::<R>::new(client).get_by_id(id).await?;
                    to_json(&row)
                }
                .boxed()
            }),
        )
    }

    /// Portfolio summary of the signed-in user.
    #[must_use]
    pub fn query_portfolio_summary(&self) -> Query<PortfolioSummary> {
        self.query(
            PORTFOLIO_SUMMARY,
            Scope::Aggregate,
            Arc::new(|client: Arc<BackendClient>| {
                async move { to_json(&summary::portfolio_summary(&client).await?) }.boxed()
            }),
        )
    }

    /// Net worth of the signed-in user.
    #[must_use]
    pub fn query_net_worth(&self) -> Query<NetWorth> {
        self.query(
            NET_WORTH,
            Scope::Aggregate,
            Arc::new(|client: Arc<BackendClient>| {
                async move { to_json(&summary::net_worth(&client).await?) }.boxed()
            }),
        )
    }

    /// Writes to `R` that invalidate dependent queries.
    #[must_use]
    pub fn mutation<R: Resource>(&self) -> Mutation<R> {
        Mutation::new(self.api(), Arc::clone(&self.cache))
    }

    /// Live changes of the caller's `R` rows, applied to the cache as they arrive.
    pub async fn live<R: Resource>(&self) -> Result<LiveSubscription<R::Row>> {
        self.bridge.subscribe::<R>().await
    }

    /// Signs out and forgets every cached query of the signed-out user.
    ///
    /// The cache is cleared even when the platform rejects the sign-out.
    pub async fn sign_out(&self) -> Result<()> {
        let owner = self.client.session().await.map(|s| s.owner());
        let result = self.client.sign_out().await;
        if let Err(e) = &result {
            warn!("Platform sign-out failed: {}", e);
        }
        if let Some(owner) = owner {
            let removed = self.cache.clear_owner(owner).await;
            info!("Cleared {} cached queries for {}", removed, owner);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::{
        documents::Documents,
        goals::{Goals, GoalPatch},
        stocks::{StockPatch, Stocks},
    };
    use crate::entities::document;
    use crate::errors::ErrorKind;
    use crate::test_utils::{new_goal, new_stock, sample_upload, signed_in_client};
    use std::time::Duration;

    async fn context() -> Result<(DataContext, Arc<crate::client::memory::MemoryPlatform>, Uuid)> {
        let (client, platform, owner) = signed_in_client().await?;
        Ok((DataContext::new(client, &Settings::default()), platform, owner))
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_one_request() -> Result<()> {
        let (ctx, platform, _owner) = context().await?;
        platform.set_latency(Duration::from_millis(20));
        let before = platform.table_calls();

        let first = ctx.query_list::<Goals>();
        let second = ctx.query_list::<Goals>();
        let (a, b) = tokio::join!(first.fetch(), second.fetch());

        assert_eq!(a.status, QueryStatus::Success);
        assert_eq!(b.data.unwrap().len(), 0);
        assert_eq!(platform.table_calls() - before, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_filter_order_does_not_split_cache() -> Result<()> {
        let (ctx, platform, _owner) = context().await?;
        let year = Filter {
            column: "target_year".to_string(),
            value: "2030".to_string(),
        };
        let done = Filter {
            column: "is_completed".to_string(),
            value: "false".to_string(),
        };
        ctx.mutation::<Goals>().create(new_goal("House", 2030)).await?;

        let first = ctx.query_filtered::<Goals>(vec![year.clone(), done.clone()]);
        assert_eq!(first.data().await?.len(), 1);
        let before = platform.table_calls();
        let second = ctx.query_filtered::<Goals>(vec![done, year]);
        assert_eq!(second.data().await?.len(), 1);
        assert_eq!(platform.table_calls(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_mutation_invalidates_lists_and_aggregates() -> Result<()> {
        let (ctx, _platform, _owner) = context().await?;
        let stocks = ctx.query_list::<Stocks>();
        let summary = ctx.query_portfolio_summary();
        assert!(stocks.data().await?.is_empty());
        assert_eq!(summary.data().await?.total_current_value, 0.0);

        let mutation = ctx.mutation::<Stocks>();
        mutation.create(new_stock("TCS", 10.0, 100.0, 150.0)).await?;
        assert_eq!(mutation.state().status, MutationStatus::Success);
        assert!(stocks.snapshot().await.is_stale);
        assert!(summary.snapshot().await.is_stale);

        assert_eq!(stocks.refetch().await.data.unwrap().len(), 1);
        assert_eq!(summary.refetch().await.data.unwrap().total_current_value, 1500.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_mutation_reports_and_keeps_cache() -> Result<()> {
        let (ctx, platform, _owner) = context().await?;
        let goals = ctx.query_list::<Goals>();
        assert!(goals.data().await?.is_empty());

        platform.set_offline(true);
        let mutation = ctx.mutation::<Goals>();
        let err = mutation.create(new_goal("Boat", 2031)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);

        let state = mutation.state();
        assert_eq!(state.status, MutationStatus::Error);
        assert_eq!(state.error.unwrap().kind(), ErrorKind::Transport);
        assert!(!goals.snapshot().await.is_stale);

        mutation.reset();
        assert_eq!(mutation.state().status, MutationStatus::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_optimistic_update_shows_immediately() -> Result<()> {
        let (ctx, _platform, _owner) = context().await?;
        let stock = ctx.api::<Stocks>().create(new_stock("TCS", 100.0, 120.0, 125.50)).await?;
        let list = ctx.query_list::<Stocks>();
        let detail = ctx.query_detail::<Stocks>(stock.id);
        list.data().await?;
        detail.data().await?;

        let patch = StockPatch {
            current_price: Some(130.75),
            ..StockPatch::default()
        };
        let updated = ctx.mutation::<Stocks>().update_optimistic(stock.id, patch).await?;
        assert_eq!(updated.current_value, 13075.0);

        let cached = list.snapshot().await.data.unwrap();
        assert_eq!(cached[0].current_price, 130.75);
        assert_eq!(cached[0].current_value, 13075.0);
        let cached = detail.snapshot().await.data.unwrap().unwrap();
        assert_eq!(cached.current_value, 13075.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_optimistic_update_rolls_back_on_failure() -> Result<()> {
        let (ctx, platform, _owner) = context().await?;
        let goal = ctx.api::<Goals>().create(new_goal("House", 2030)).await?;
        let list = ctx.query_list::<Goals>();
        let before = list.data().await?;

        platform.set_offline(true);
        let patch = GoalPatch {
            title: Some("Bigger house".to_string()),
            ..GoalPatch::default()
        };
        let mutation = ctx.mutation::<Goals>();
        assert!(mutation.update_optimistic(goal.id, patch).await.is_err());
        assert_eq!(mutation.state().status, MutationStatus::Error);

        let after = list.snapshot().await.data.unwrap();
        assert_eq!(after.len(), before.len());
        assert_eq!(after[0].title, "House");
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_evicts_row_from_cached_queries() -> Result<()> {
        let (ctx, _platform, _owner) = context().await?;
        let api = ctx.api::<Goals>();
        let goal = api.create(new_goal("House", 2030)).await?;
        api.create(new_goal("Boat", 2031)).await?;
        let list = ctx.query_list::<Goals>();
        let detail = ctx.query_detail::<Goals>(goal.id);
        assert_eq!(list.data().await?.len(), 2);
        assert!(detail.data().await?.is_some());

        ctx.mutation::<Goals>().delete(goal.id).await?;

        let rows = list.fetch().await.data.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.iter().all(|row| row.id != goal.id));
        assert!(detail.fetch().await.data.unwrap().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_document_upload_and_remove_keep_cache_and_storage_in_step() -> Result<()> {
        let (ctx, platform, _owner) = context().await?;
        let documents = ctx.query_list::<Documents>();
        assert!(documents.data().await?.is_empty());

        let mutation = ctx.mutation::<Documents>();
        let doc = mutation.upload(sample_upload("will.pdf", b"%PDF-1.7")).await?;
        assert_eq!(mutation.state().status, MutationStatus::Success);
        assert!(documents.snapshot().await.is_stale);
        assert_eq!(documents.refetch().await.data.unwrap().len(), 1);

        mutation.remove(doc.id).await?;
        assert!(platform.object_paths(document::BUCKET).await.is_empty());
        assert!(documents.fetch().await.data.unwrap().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_detail_of_missing_row_is_none() -> Result<()> {
        let (ctx, _platform, _owner) = context().await?;
        let detail = ctx.query_detail::<Goals>(Uuid::new_v4());
        let snapshot = detail.fetch().await;
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert!(snapshot.data.unwrap().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_sign_out_clears_cache() -> Result<()> {
        let (ctx, _platform, _owner) = context().await?;
        let goals = ctx.query_list::<Goals>();
        goals.data().await?;
        assert!(!ctx.cache().is_empty().await);

        ctx.sign_out().await?;
        assert!(ctx.cache().is_empty().await);
        let snapshot = goals.fetch().await;
        assert_eq!(snapshot.status, QueryStatus::Error);
        assert_eq!(snapshot.error.unwrap().kind(), ErrorKind::Unauthenticated);
        Ok(())
    }

    #[tokio::test]
    async fn test_live_subscription_updates_cached_list() -> Result<()> {
        let (ctx, _platform, _owner) = context().await?;
        let goals = ctx.query_list::<Goals>();
        goals.data().await?;
        let mut live = ctx.live::<Goals>().await?;

        ctx.api::<Goals>().create(new_goal("Sabbatical", 2029)).await?;
        let event = live.recv().await.unwrap();
        assert_eq!(event.new.unwrap().title, "Sabbatical");

        let cached = goals.snapshot().await.data.unwrap();
        assert_eq!(cached.len(), 1);
        Ok(())
    }
}
