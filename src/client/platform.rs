//! The platform seam.
//!
//! [`Platform`] is everything the data layer needs from the hosted backend: auth
//! sessions, owner-scoped table operations on JSON rows, object storage, and
//! row-level change feeds. [`super::rest::RestPlatform`] speaks the remote HTTP and
//! websocket protocols; [`super::memory::MemoryPlatform`] keeps everything
//! in-process with the same semantics.

use super::auth::Session;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Equality filter on one column, rendered as `column=eq.value` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Filter {
    /// Column name
    pub column: String,
    /// Expected value, in its text rendering
    pub value: String,
}

/// Sort order for a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    /// Column name
    pub column: String,
    /// Newest/largest first when true
    pub descending: bool,
}

/// A filtered, ordered request against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    /// Table name
    pub table: String,
    /// Conjunction of equality filters
    pub filters: Vec<Filter>,
    /// Optional ordering of the result
    pub order: Option<Order>,
}

impl TableQuery {
    /// Starts an unfiltered query on `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: None,
        }
    }

    /// Adds an equality filter.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            value: value.to_string(),
        });
        self
    }

    /// Sets the ordering.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            descending,
        });
        self
    }

    /// Query string pairs in the REST table protocol.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .filters
            .iter()
            .map(|f| (f.column.clone(), format!("eq.{}", f.value)))
            .collect();
        if let Some(order) = &self.order {
            let direction = if order.descending { "desc" } else { "asc" };
            pairs.push(("order".to_string(), format!("{}.{direction}", order.column)));
        }
        pairs
    }

    /// Whether a row satisfies every filter.
    #[must_use]
    pub fn matches(&self, row: &Value) -> bool {
        matches_filters(&self.filters, row)
    }

    /// Sorts rows in place according to [`Self::order`].
    pub fn sort(&self, rows: &mut [Value]) {
        if let Some(order) = &self.order {
            rows.sort_by(|a, b| compare_rows(a, b, order));
        }
    }
}

/// Whether `row` satisfies every equality filter.
#[must_use]
pub fn matches_filters(filters: &[Filter], row: &Value) -> bool {
    filters.iter().all(|f| {
        row.get(&f.column)
            .is_some_and(|v| render_value(v) == f.value)
    })
}

/// Text rendering of a JSON scalar, as used by equality filters.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Orders two JSON scalars: numbers numerically, everything else by text.
///
/// ISO-8601 dates and timestamps sort correctly as text.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => render_value(a).cmp(&render_value(b)),
    }
}

/// Orders two rows by one column.
#[must_use]
pub fn compare_rows(a: &Value, b: &Value, order: &Order) -> Ordering {
    let left = a.get(&order.column).unwrap_or(&Value::Null);
    let right = b.get(&order.column).unwrap_or(&Value::Null);
    let ordering = compare_values(left, right);
    if order.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

/// Row-level change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// A row was created
    Insert,
    /// A row was modified
    Update,
    /// A row was removed
    Delete,
}

/// A change notification as delivered by the platform, rows still untyped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChange {
    /// What happened
    pub event_type: EventType,
    /// Table the row lives in
    pub table: String,
    /// Row after the change (absent for deletes)
    pub new: Option<Value>,
    /// Row before the change; for deletes this may only carry the primary key
    pub old: Option<Value>,
    /// Commit time reported by the platform
    pub commit_timestamp: Option<DateTime<Utc>>,
}

impl RawChange {
    /// Identifier of the affected row, from `new` or else `old`.
    #[must_use]
    pub fn row_id(&self) -> Option<Uuid> {
        self.field_uuid("id")
    }

    /// Owner of the affected row, when the payload carries it.
    #[must_use]
    pub fn owner(&self) -> Option<Uuid> {
        self.field_uuid(crate::entities::OWNER_COLUMN)
    }

    fn field_uuid(&self, column: &str) -> Option<Uuid> {
        [self.new.as_ref(), self.old.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|row| row.get(column).and_then(Value::as_str))
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// A live change stream for one table and owner.
///
/// Dropping the feed signals the transport task to leave the channel and stop.
pub struct ChangeFeed {
    events: mpsc::Receiver<RawChange>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeFeed {
    /// Wraps a transport task that pushes into `events` until `shutdown` fires.
    #[must_use]
    pub const fn new(
        events: mpsc::Receiver<RawChange>,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Next change, or `None` once the transport has stopped.
    pub async fn recv(&mut self) -> Option<RawChange> {
        self.events.recv().await
    }

    /// Whether the transport task has exited.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.take();
    }
}

/// Capabilities of the hosted backend used by the data layer.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Exchanges credentials for a session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session>;

    /// Registers a user. Returns `None` when the platform requires email confirmation
    /// before issuing a session.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>>;

    /// Exchanges a refresh token for a fresh session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session>;

    /// Revokes the session's tokens.
    async fn sign_out(&self, session: &Session) -> Result<()>;

    /// Rows visible to the session matching `query`.
    async fn select(&self, session: &Session, query: &TableQuery) -> Result<Vec<Value>>;

    /// Inserts one row and returns it as stored.
    async fn insert(&self, session: &Session, table: &str, row: Value) -> Result<Value>;

    /// Applies `patch` to every visible row matching `query`; returns the updated rows.
    async fn update(&self, session: &Session, query: &TableQuery, patch: Value)
    -> Result<Vec<Value>>;

    /// Deletes every visible row matching `query`; returns the deleted rows.
    async fn delete(&self, session: &Session, query: &TableQuery) -> Result<Vec<Value>>;

    /// Stores an object and returns its path inside the bucket.
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;

    /// Removes objects; missing paths are ignored.
    async fn remove(&self, session: &Session, bucket: &str, paths: &[String]) -> Result<()>;

    /// Public URL of an object.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Opens a change stream for `table` restricted to rows owned by `owner`.
    async fn listen(&self, session: &Session, table: &str, owner: Uuid) -> Result<ChangeFeed>;
}
