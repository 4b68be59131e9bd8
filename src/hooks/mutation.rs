//! Mutation handles.
//!
//! Writes go straight to the platform. On success every cached query that
//! depends on the written table is invalidated; on failure the cache is left as
//! it was and the error is both recorded in the handle's state and returned.
//! [`Mutation::update_optimistic`] additionally patches cached rows before the
//! write and restores them exactly if the write fails. A successful delete
//! evicts the row from cached lists and drops its detail entry before
//! invalidating, so a stale read never serves a deleted row.

use crate::cache::{EntryUpdate, QueryCache, QueryKey, Scope};
use crate::core::documents::{Documents, Upload};
use crate::core::{Resource, ResourceApi, apply_patch, to_json};
use crate::entities::{DocumentModel, Record};
use crate::errors::{Error, Result};
use crate::realtime::apply::{remove_by_id, replace_existing};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, warn};
use uuid::Uuid;

/// Lifecycle of the most recent mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationStatus {
    /// Nothing has run since creation or the last reset
    #[default]
    Idle,
    /// A write is in flight
    Pending,
    /// The last write succeeded
    Success,
    /// The last write failed
    Error,
}

/// State a consumer renders from.
#[derive(Debug, Clone, Default)]
pub struct MutationState {
    /// Where the most recent mutation is
    pub status: MutationStatus,
    /// Error of the most recent mutation, if it failed
    pub error: Option<Error>,
}

/// Create, update and delete for one resource, with cache side effects.
pub struct Mutation<R: Resource> {
    api: ResourceApi<R>,
    cache: Arc<QueryCache>,
    state: watch::Sender<MutationState>,
}

fn patched_entry<R: Resource>(key: &QueryKey, data: &Value, id: Uuid, changes: &Map<String, Value>) -> EntryUpdate {
    let patch = |row: &Value| apply_patch::<R>(row.clone(), changes).and_then(|row| to_json(&row));
    match &key.scope {
        Scope::List(_) => {
            let Some(rows) = data.as_array() else {
                return EntryUpdate::Keep;
            };
            let Some(current) = rows.iter().find(|row| row["id"].as_str() == Some(id.to_string().as_str())) else {
                return EntryUpdate::Keep;
            };
            match patch(current) {
                Ok(updated) => {
                    let mut rows = rows.clone();
                    replace_existing(&mut rows, updated, R::SORT);
                    EntryUpdate::Replace(Value::Array(rows))
                }
                Err(_) => EntryUpdate::Keep,
            }
        }
        Scope::Detail(detail) if *detail == id && !data.is_null() => {
            patch(data).map_or(EntryUpdate::Keep, EntryUpdate::Replace)
        }
        Scope::Detail(_) | Scope::Aggregate => EntryUpdate::Keep,
    }
}

fn evicted_entry(key: &QueryKey, data: &Value, id: Uuid) -> EntryUpdate {
    match &key.scope {
        Scope::List(_) => {
            let Some(rows) = data.as_array() else {
                return EntryUpdate::Keep;
            };
            let mut rows = rows.clone();
            if remove_by_id(&mut rows, id) {
                EntryUpdate::Replace(Value::Array(rows))
            } else {
                EntryUpdate::Keep
            }
        }
        Scope::Detail(detail) if *detail == id => EntryUpdate::Remove,
        Scope::Detail(_) | Scope::Aggregate => EntryUpdate::Keep,
    }
}

impl<R: Resource> Mutation<R> {
    pub(crate) fn new(api: ResourceApi<R>, cache: Arc<QueryCache>) -> Self {
        let (state, _) = watch::channel(MutationState::default());
        Self { api, cache, state }
    }

    /// State of the most recent mutation.
    #[must_use]
    pub fn state(&self) -> MutationState {
        self.state.borrow().clone()
    }

    /// Receives every state change from now on.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<MutationState> {
        self.state.subscribe()
    }

    /// Back to [`MutationStatus::Idle`].
    pub fn reset(&self) {
        self.state.send_replace(MutationState::default());
    }

    async fn run<T>(&self, action: &str, operation: impl Future<Output = Result<T>>) -> Result<T> {
        self.state.send_replace(MutationState {
            status: MutationStatus::Pending,
            error: None,
        });
        match operation.await {
            Ok(value) => {
                self.state.send_replace(MutationState {
                    status: MutationStatus::Success,
                    error: None,
                });
                Ok(value)
            }
            Err(e) => {
                error!("Failed to {} {}: {}", action, R::TABLE, e);
                self.state.send_replace(MutationState {
                    status: MutationStatus::Error,
                    error: Some(e.clone()),
                });
                Err(e)
            }
        }
    }

    /// Creates a row, then invalidates dependent queries.
    pub async fn create(&self, new: R::New) -> Result<R::Row> {
        self.run("create", async {
            let row = self.api.create(new).await?;
            self.cache.invalidate_after_write(R::TABLE, row.owner()).await;
            Ok(row)
        })
        .await
    }

    /// Updates a row, then invalidates dependent queries.
    pub async fn update(&self, id: Uuid, patch: R::Patch) -> Result<R::Row> {
        self.run("update", async {
            let row = self.api.update(id, patch).await?;
            self.cache.invalidate_after_write(R::TABLE, row.owner()).await;
            Ok(row)
        })
        .await
    }

    /// Deletes a row, evicts it from the cache, then invalidates dependent queries.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.run("delete", async {
            let owner = self.api.client().require_session().await?.owner();
            self.api.delete(id).await?;
            self.evict(owner, id).await;
            Ok(())
        })
        .await
    }

    async fn evict(&self, owner: Uuid, id: Uuid) {
        self.cache
            .update_entries(R::TABLE, owner, |key, data| evicted_entry(key, data, id))
            .await;
        self.cache.invalidate_after_write(R::TABLE, owner).await;
    }

    /// Updates cached copies of the row first, then writes.
    ///
    /// If the write fails the cached entries are restored to exactly what they
    /// held before.
    pub async fn update_optimistic(&self, id: Uuid, patch: R::Patch) -> Result<R::Row> {
        self.run("update", async {
            let owner = self.api.client().require_session().await?.owner();
            let changes = match to_json(&patch)? {
                Value::Object(changes) => changes,
                other => return Err(Error::validation(format!("patch must be an object, got {other}"))),
            };

            let snapshot = self.cache.snapshot(R::TABLE, owner).await;
            self.cache
                .update_entries(R::TABLE, owner, |key, data| {
                    patched_entry::<R>(key, data, id, &changes)
                })
                .await;

            match self.api.update(id, patch).await {
                Ok(row) => {
                    self.cache.invalidate_after_write(R::TABLE, owner).await;
                    Ok(row)
                }
                Err(e) => {
                    warn!("Rolling back optimistic update of {} {}", R::TABLE, id);
                    self.cache.restore(snapshot).await;
                    Err(e)
                }
            }
        })
        .await
    }
}

impl Mutation<Documents> {
    /// Stores a file and its row, then invalidates dependent queries.
    pub async fn upload(&self, upload: Upload) -> Result<DocumentModel> {
        self.run("upload", async {
            let row = self.api.upload(upload).await?;
            self.cache
                .invalidate_after_write(Documents::TABLE, row.owner())
                .await;
            Ok(row)
        })
        .await
    }

    /// Deletes a document row and its stored bytes, then evicts it from the cache.
    ///
    /// Use this rather than [`Mutation::delete`], which leaves the object in storage.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        self.run("remove", async {
            let owner = self.api.client().require_session().await?.owner();
            self.api.remove(id).await?;
            self.evict(owner, id).await;
            Ok(())
        })
        .await
    }
}
