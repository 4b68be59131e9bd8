//! Core business logic - owner-scoped CRUD over every family office table.
//!
//! Each table is described by a [`Resource`]: its row type, the shapes accepted
//! for creation and partial update, its list order, and the fields the client
//! derives from other columns. [`ResourceApi`] turns that description into the
//! typed operations every resource shares:
//!
//! - `list` / `list_filtered`: the caller's rows in the resource's sort order
//! - `get_by_id`: one row, or `None` when absent or owned by someone else
//! - `create`: inserts with the owner taken from the session, never from input
//! - `update`: patches only the supplied fields and recomputes derived ones
//! - `delete`: idempotent removal scoped to id and owner
//! - `subscribe`: a change stream of the caller's rows
//!
//! All of them fail with [`Error::Unauthenticated`] before any network call when
//! no session is held.

/// Physical and other non-market assets
pub mod assets;
/// Stored documents and their metadata
pub mod documents;
/// Family members
pub mod family_members;
/// Financial goals
pub mod goals;
/// Insurance policies
pub mod insurance_policies;
/// Loans and other liabilities
pub mod liabilities;
/// Mutual fund holdings
pub mod mutual_funds;
/// Stock holdings
pub mod stocks;
/// Portfolio and net worth aggregates
pub mod summary;
/// Buy, sell and cash transactions
pub mod transactions;
/// Profit and loss rules shared by holdings
pub mod valuation;

use crate::{
    client::{
        BackendClient,
        platform::{Filter, Order, TableQuery},
    },
    entities::{OWNER_COLUMN, Record},
    errors::{Error, Result},
    realtime::ChangeStream,
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Columns assigned by the platform; stripped from create and update payloads
const SERVER_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Column and direction a resource's lists are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Column name
    pub column: &'static str,
    /// Largest/newest first when true
    pub descending: bool,
}

impl SortKey {
    /// Newest rows first.
    pub const NEWEST_FIRST: Self = Self::desc("created_at");

    /// Descending order on `column`.
    #[must_use]
    pub const fn desc(column: &'static str) -> Self {
        Self {
            column,
            descending: true,
        }
    }

    /// Ascending order on `column`.
    #[must_use]
    pub const fn asc(column: &'static str) -> Self {
        Self {
            column,
            descending: false,
        }
    }

    /// The equivalent select ordering.
    #[must_use]
    pub fn to_order(self) -> Order {
        Order {
            column: self.column.to_string(),
            descending: self.descending,
        }
    }
}

/// Description of one owner-scoped table.
pub trait Resource: Send + Sync + 'static {
    /// Platform table name
    const TABLE: &'static str;
    /// List order
    const SORT: SortKey;
    /// Columns recomputed by [`Resource::derive`] whenever a row changes
    const DERIVED_FIELDS: &'static [&'static str] = &[];

    /// Stored row
    type Row: Record;
    /// Fields accepted on creation
    type New: Serialize + Send + Sync + 'static;
    /// Optional fields accepted on update; absent fields are left untouched
    type Patch: Serialize + Send + Sync + 'static;

    /// Client-side checks run before a create reaches the platform.
    fn validate(_new: &Self::New) -> Result<()> {
        Ok(())
    }

    /// Client-side checks run before an update reaches the platform.
    fn validate_patch(_patch: &Self::Patch) -> Result<()> {
        Ok(())
    }

    /// Insert payload for `new`, derived columns included.
    fn payload(new: &Self::New) -> Result<Value> {
        to_json(new)
    }

    /// Recomputes [`Resource::DERIVED_FIELDS`] from the row's inputs.
    fn derive(_row: &mut Self::Row) {}
}

/// Serializes a payload, reporting failure as a validation error.
pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::validation(format!("unserializable payload: {e}")))
}

/// Decodes one row returned by the platform.
pub(crate) fn decode_row<T: DeserializeOwned>(table: &str, row: Value) -> Result<T> {
    serde_json::from_value(row).map_err(|e| Error::transport(format!("malformed {table} row: {e}")))
}

fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter().map(|row| decode_row(table, row)).collect()
}

pub(crate) fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(Error::validation(format!(
            "payload must be a JSON object, got {other}"
        ))),
    }
}

/// Applies `changes` to a serialized row and recomputes its derived fields.
pub(crate) fn apply_patch<R: Resource>(mut row: Value, changes: &Map<String, Value>) -> Result<R::Row> {
    if let Value::Object(fields) = &mut row {
        for (column, value) in changes {
            fields.insert(column.clone(), value.clone());
        }
    }
    let mut row: R::Row = serde_json::from_value(row)
        .map_err(|e| Error::validation(format!("invalid {} update: {e}", R::TABLE)))?;
    R::derive(&mut row);
    Ok(row)
}

/// Query on `R`'s table restricted to `owner`'s rows.
pub(crate) fn owner_query<R: Resource>(owner: Uuid) -> TableQuery {
    TableQuery::new(R::TABLE).eq(OWNER_COLUMN, owner)
}

/// Typed operations on one resource, run with the client's current session.
pub struct ResourceApi<R: Resource> {
    client: Arc<BackendClient>,
    resource: PhantomData<fn() -> R>,
}

impl<R: Resource> Clone for ResourceApi<R> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.client))
    }
}

impl<R: Resource> ResourceApi<R> {
    /// Binds the resource to a client.
    #[must_use]
    pub const fn new(client: Arc<BackendClient>) -> Self {
        Self {
            client,
            resource: PhantomData,
        }
    }

    /// The client the operations run on.
    #[must_use]
    pub const fn client(&self) -> &Arc<BackendClient> {
        &self.client
    }

    async fn owner(&self) -> Result<Uuid> {
        Ok(self.client.require_session().await?.owner())
    }

    /// All of the caller's rows in the resource's sort order.
    ///
    /// An owner with no rows gets an empty list.
    pub async fn list(&self) -> Result<Vec<R::Row>> {
        self.list_filtered(&[]).await
    }

    /// The caller's rows matching every equality filter, in sort order.
    #[instrument(skip(self), fields(table = R::TABLE))]
    pub async fn list_filtered(&self, filters: &[Filter]) -> Result<Vec<R::Row>> {
        let owner = self.owner().await?;
        let mut query = owner_query::<R>(owner);
        query.filters.extend(filters.iter().cloned());
        query.order = Some(R::SORT.to_order());

        let rows = self.client.select(&query).await?;
        debug!("Fetched {} {} rows", rows.len(), R::TABLE);
        decode_rows(R::TABLE, rows)
    }

    /// One of the caller's rows, or `None` when it does not exist or is not theirs.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<R::Row>> {
        let owner = self.owner().await?;
        let query = owner_query::<R>(owner).eq("id", id);
        self.client
            .select(&query)
            .await?
            .into_iter()
            .next()
            .map(|row| decode_row(R::TABLE, row))
            .transpose()
    }

    /// Inserts a row owned by the caller and returns it as stored.
    ///
    /// Any owner, id or timestamp in the payload is replaced: the platform
    /// assigns identity and timestamps, the session decides the owner.
    #[instrument(skip(self, new), fields(table = R::TABLE))]
    pub async fn create(&self, new: R::New) -> Result<R::Row> {
        R::validate(&new)?;
        let owner = self.owner().await?;

        let mut fields = into_object(R::payload(&new)?)?;
        for column in SERVER_COLUMNS {
            fields.remove(*column);
        }
        fields.insert(OWNER_COLUMN.to_string(), Value::String(owner.to_string()));

        let stored: R::Row = decode_row(
            R::TABLE,
            self.client.insert(R::TABLE, Value::Object(fields)).await?,
        )?;
        info!("Created {} row {}", R::TABLE, stored.id());
        Ok(stored)
    }

    /// Changes only the supplied fields of one of the caller's rows.
    ///
    /// Derived fields are recomputed from the merged row and sent along.
    ///
    /// # Errors
    /// [`Error::NotFound`] when no row with `id` belongs to the caller.
    #[instrument(skip(self, patch), fields(table = R::TABLE))]
    pub async fn update(&self, id: Uuid, patch: R::Patch) -> Result<R::Row> {
        R::validate_patch(&patch)?;
        let owner = self.owner().await?;

        let mut changes = into_object(to_json(&patch)?)?;
        changes.remove(OWNER_COLUMN);
        for column in SERVER_COLUMNS {
            changes.remove(*column);
        }

        if !R::DERIVED_FIELDS.is_empty() {
            let current = self
                .get_by_id(id)
                .await?
                .ok_or_else(|| Error::not_found(R::TABLE, id))?;
            let merged = to_json(&apply_patch::<R>(to_json(&current)?, &changes)?)?;
            for column in R::DERIVED_FIELDS {
                if let Some(value) = merged.get(*column) {
                    changes.insert((*column).to_string(), value.clone());
                }
            }
        }

        if changes.is_empty() {
            return self
                .get_by_id(id)
                .await?
                .ok_or_else(|| Error::not_found(R::TABLE, id));
        }

        let query = owner_query::<R>(owner).eq("id", id);
        let row = self
            .client
            .update(&query, Value::Object(changes))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(R::TABLE, id))?;
        debug!("Updated {} row {}", R::TABLE, id);
        decode_row(R::TABLE, row)
    }

    /// Removes one of the caller's rows. Deleting an absent row succeeds.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let removed = self.delete_returning(id).await?;
        if removed.is_none() {
            debug!("{} row {} already absent", R::TABLE, id);
        }
        Ok(())
    }

    /// Removes one of the caller's rows and returns it, if it existed.
    #[instrument(skip(self), fields(table = R::TABLE))]
    pub async fn delete_returning(&self, id: Uuid) -> Result<Option<R::Row>> {
        let owner = self.owner().await?;
        let query = owner_query::<R>(owner).eq("id", id);
        let removed = self
            .client
            .delete(&query)
            .await?
            .into_iter()
            .next()
            .map(|row| decode_row::<R::Row>(R::TABLE, row))
            .transpose()?;
        if removed.is_some() {
            info!("Deleted {} row {}", R::TABLE, id);
        }
        Ok(removed)
    }

    /// Change events for the caller's rows until the stream is dropped.
    pub async fn subscribe(&self) -> Result<ChangeStream<R::Row>> {
        let feed = self.client.listen(R::TABLE).await?;
        Ok(ChangeStream::new(feed))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::client::platform::EventType;
    use crate::core::{goals::Goals, stocks::Stocks};
    use crate::errors::ErrorKind;
    use crate::test_utils::{new_goal, new_stock, second_user, signed_in_client};

    #[tokio::test]
    async fn test_list_is_empty_without_rows() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        assert!(ResourceApi::<Goals>::new(client).list().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_calls_without_session_never_reach_platform() -> Result<()> {
        let (client, platform, _owner) = signed_in_client().await?;
        client.sign_out().await?;
        let before = platform.table_calls();

        let api = ResourceApi::<Goals>::new(client);
        assert_eq!(api.list().await.unwrap_err().kind(), ErrorKind::Unauthenticated);
        assert_eq!(
            api.create(new_goal("House", 2030)).await.unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            api.delete(Uuid::new_v4()).await.unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(platform.table_calls(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_then_read_round_trip() -> Result<()> {
        let (client, _platform, owner) = signed_in_client().await?;
        let api = ResourceApi::<Goals>::new(client);

        let created = api.create(new_goal("Retirement", 2045)).await?;
        assert_eq!(created.user_id, owner);
        assert_eq!(created.title, "Retirement");

        let fetched = api.get_by_id(created.id).await?.unwrap();
        assert_eq!(fetched, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_by_id_of_unknown_row_is_none() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        let api = ResourceApi::<Goals>::new(client);
        assert!(api.get_by_id(Uuid::new_v4()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_of_other_owners_row_is_not_found() -> Result<()> {
        let (client, platform, _owner) = signed_in_client().await?;
        let other = second_user(&platform).await?;
        let theirs = ResourceApi::<Goals>::new(Arc::clone(&other))
            .create(new_goal("Theirs", 2030))
            .await?;
        let their_stock = ResourceApi::<Stocks>::new(other)
            .create(new_stock("INFY", 10.0, 1500.0, 1600.0))
            .await?;

        let goal_err = ResourceApi::<Goals>::new(Arc::clone(&client))
            .update(
                theirs.id,
                goals::GoalPatch {
                    title: Some("Mine now".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(goal_err.kind(), ErrorKind::NotFound);

        let stock_err = ResourceApi::<Stocks>::new(client)
            .update(
                their_stock.id,
                stocks::StockPatch {
                    current_price: Some(1.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(stock_err.kind(), ErrorKind::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_twice_is_idempotent() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        let api = ResourceApi::<Goals>::new(client);
        let goal = api.create(new_goal("Car", 2027)).await?;

        api.delete(goal.id).await?;
        api.delete(goal.id).await?;
        assert!(api.list().await?.iter().all(|g| g.id != goal.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_yields_typed_events() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        let api = ResourceApi::<Goals>::new(client);
        let mut stream = api.subscribe().await?;

        let goal = api.create(new_goal("Travel", 2026)).await?;
        api.delete(goal.id).await?;

        let inserted = stream.recv().await.unwrap();
        assert_eq!(inserted.event_type, EventType::Insert);
        assert_eq!(inserted.new.unwrap().title, "Travel");

        let deleted = stream.recv().await.unwrap();
        assert_eq!(deleted.event_type, EventType::Delete);
        assert_eq!(deleted.id, goal.id);
        assert!(deleted.new.is_none());
        Ok(())
    }
}
