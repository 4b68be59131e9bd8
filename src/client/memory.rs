//! In-process platform.
//!
//! Behaves like the hosted platform from the client's point of view: password
//! sign-in issuing bearer tokens, row-level security restricting every table
//! operation to the caller's own rows, server-assigned ids and timestamps, row
//! validation against the entity schema, owner-prefixed storage paths, and a
//! change event for every committed write. Used by the test suite and for offline
//! runs; it also counts table calls and can simulate an outage or latency.

use super::auth::{AuthUser, Session};
use super::platform::{ChangeFeed, EventType, Platform, RawChange, TableQuery};
use crate::entities::{self, OWNER_COLUMN};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tracing::{debug, trace, warn};
use uuid::Uuid;

type RowValidator = Box<dyn Fn(&Value) -> std::result::Result<(), String> + Send + Sync>;

struct MemoryTable {
    rows: Vec<Value>,
    validate: RowValidator,
}

struct MemoryUser {
    id: Uuid,
    password: String,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, MemoryUser>,
    access_tokens: HashMap<String, Uuid>,
    refresh_tokens: HashMap<String, Uuid>,
    tables: HashMap<String, MemoryTable>,
    objects: HashMap<(String, String), Vec<u8>>,
}

impl MemoryState {
    fn owner_for(&self, session: &Session) -> Result<Uuid> {
        self.access_tokens
            .get(&session.access_token)
            .copied()
            .ok_or_else(|| Error::unauthenticated("invalid or revoked access token"))
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| Error::validation(format!("relation \"{table}\" does not exist")))
    }

    fn issue_session(&mut self, id: Uuid, email: &str) -> Session {
        let access_token = Uuid::new_v4().to_string();
        let refresh_token = Uuid::new_v4().to_string();
        self.access_tokens.insert(access_token.clone(), id);
        self.refresh_tokens.insert(refresh_token.clone(), id);
        Session {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::hours(1),
            user: AuthUser {
                id,
                email: Some(email.to_string()),
            },
        }
    }
}

/// In-process implementation of [`Platform`].
pub struct MemoryPlatform {
    state: Mutex<MemoryState>,
    changes: broadcast::Sender<RawChange>,
    disconnects: watch::Sender<u64>,
    table_calls: AtomicU64,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    /// An empty platform with no tables and no users.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(256);
        let (disconnects, _) = watch::channel(0);
        Self {
            state: Mutex::new(MemoryState::default()),
            changes,
            disconnects,
            table_calls: AtomicU64::new(0),
            offline: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// A platform with every family office table registered.
    #[must_use]
    pub fn family_office() -> Self {
        Self::new()
            .with_table::<entities::TransactionModel>(entities::transaction::TABLE)
            .with_table::<entities::AssetModel>(entities::asset::TABLE)
            .with_table::<entities::StockModel>(entities::stock::TABLE)
            .with_table::<entities::MutualFundModel>(entities::mutual_fund::TABLE)
            .with_table::<entities::LiabilityModel>(entities::liability::TABLE)
            .with_table::<entities::GoalModel>(entities::goal::TABLE)
            .with_table::<entities::InsurancePolicyModel>(entities::insurance_policy::TABLE)
            .with_table::<entities::FamilyMemberModel>(entities::family_member::TABLE)
            .with_table::<entities::DocumentModel>(entities::document::TABLE)
    }

    /// Registers a table whose rows must deserialize into `T`.
    #[must_use]
    pub fn with_table<T: DeserializeOwned>(mut self, table: &str) -> Self {
        let validate: RowValidator = Box::new(|row: &Value| {
            serde_json::from_value::<T>(row.clone())
                .map(|_| ())
                .map_err(|e| e.to_string())
        });
        self.state.get_mut().tables.insert(
            table.to_string(),
            MemoryTable {
                rows: Vec::new(),
                validate,
            },
        );
        self
    }

    /// Creates a user that can sign in with `email` and `password`.
    pub async fn add_user(&self, email: &str, password: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().await.users.insert(
            email.to_string(),
            MemoryUser {
                id,
                password: password.to_string(),
            },
        );
        id
    }

    /// Number of table operations served so far.
    #[must_use]
    pub fn table_calls(&self) -> u64 {
        self.table_calls.load(Ordering::SeqCst)
    }

    /// Makes every subsequent table and storage call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Ends every open change feed, as a dropped connection would.
    pub fn disconnect_feeds(&self) {
        self.disconnects.send_modify(|generation| *generation += 1);
    }

    /// Delays every table call and session refresh.
    pub fn set_latency(&self, latency: std::time::Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// All rows of a table across owners, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Stored object bytes.
    pub async fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .await
            .objects
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    /// Paths of every object stored in `bucket`.
    pub async fn object_paths(&self, bucket: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state
            .lock()
            .await
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, path)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    /// Publishes a change as if the platform had committed it.
    pub fn emit(&self, change: RawChange) {
        trace!("Emitting {:?} on {}", change.event_type, change.table);
        let _ = self.changes.send(change);
    }

    async fn simulate_latency(&self) {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(latency)).await;
        }
    }

    async fn begin_call(&self) -> Result<()> {
        self.table_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::transport("platform unreachable"));
        }
        Ok(())
    }

    fn now_value() -> Value {
        Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

fn owned_by(row: &Value, owner: Uuid) -> bool {
    row.get(OWNER_COLUMN).and_then(Value::as_str) == Some(owner.to_string().as_str())
}

fn as_object(value: Value, what: &str) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::validation(format!(
            "{what} must be a JSON object, got {other}"
        ))),
    }
}

fn rls_violation() -> Error {
    Error::validation("new row violates row-level security policy")
}

#[async_trait]
impl Platform for MemoryPlatform {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.state.lock().await;
        let id = match state.users.get(email) {
            Some(user) if user.password == password => user.id,
            _ => return Err(Error::unauthenticated("Invalid login credentials")),
        };
        debug!("Signed in {}", email);
        Ok(state.issue_session(id, email))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        if password.len() < 6 {
            return Err(Error::validation("Password should be at least 6 characters"));
        }
        let mut state = self.state.lock().await;
        if state.users.contains_key(email) {
            return Err(Error::validation("User already registered"));
        }
        let id = Uuid::new_v4();
        state.users.insert(
            email.to_string(),
            MemoryUser {
                id,
                password: password.to_string(),
            },
        );
        Ok(Some(state.issue_session(id, email)))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        self.simulate_latency().await;
        let mut state = self.state.lock().await;
        let id = state
            .refresh_tokens
            .remove(refresh_token)
            .ok_or_else(|| Error::unauthenticated("Invalid refresh token"))?;
        let email = state
            .users
            .iter()
            .find(|(_, user)| user.id == id)
            .map(|(email, _)| email.clone())
            .unwrap_or_default();
        Ok(state.issue_session(id, &email))
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_tokens.remove(&session.access_token);
        state.refresh_tokens.remove(&session.refresh_token);
        Ok(())
    }

    async fn select(&self, session: &Session, query: &TableQuery) -> Result<Vec<Value>> {
        self.begin_call().await?;
        let mut state = self.state.lock().await;
        let owner = state.owner_for(session)?;
        let table = state.table_mut(&query.table)?;

        let mut rows: Vec<Value> = table
            .rows
            .iter()
            .filter(|row| owned_by(row, owner) && query.matches(row))
            .cloned()
            .collect();
        query.sort(&mut rows);
        Ok(rows)
    }

    async fn insert(&self, session: &Session, table_name: &str, row: Value) -> Result<Value> {
        self.begin_call().await?;
        let mut state = self.state.lock().await;
        let owner = state.owner_for(session)?;
        let table = state.table_mut(table_name)?;

        let mut row = as_object(row, "row")?;
        if !row
            .get(OWNER_COLUMN)
            .is_some_and(|v| v.as_str() == Some(owner.to_string().as_str()))
        {
            return Err(rls_violation());
        }
        if row.get("id").is_none_or(Value::is_null) {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        let now = Self::now_value();
        row.insert("created_at".to_string(), now.clone());
        row.insert("updated_at".to_string(), now);

        let row = Value::Object(row);
        (table.validate)(&row).map_err(Error::validation)?;
        if table.rows.iter().any(|r| r.get("id") == row.get("id")) {
            return Err(Error::validation(format!(
                "duplicate key value violates unique constraint \"{table_name}_pkey\""
            )));
        }
        table.rows.push(row.clone());
        drop(state);

        self.emit(RawChange {
            event_type: EventType::Insert,
            table: table_name.to_string(),
            new: Some(row.clone()),
            old: None,
            commit_timestamp: Some(Utc::now()),
        });
        Ok(row)
    }

    async fn update(
        &self,
        session: &Session,
        query: &TableQuery,
        patch: Value,
    ) -> Result<Vec<Value>> {
        self.begin_call().await?;
        let patch = as_object(patch, "patch")?;
        let mut state = self.state.lock().await;
        let owner = state.owner_for(session)?;
        let table = state.table_mut(&query.table)?;

        if patch.contains_key("id") {
            return Err(Error::validation("primary key cannot be updated"));
        }
        if patch
            .get(OWNER_COLUMN)
            .is_some_and(|v| v.as_str() != Some(owner.to_string().as_str()))
        {
            return Err(rls_violation());
        }

        // Validate every merged row before committing any of them
        let mut staged = Vec::new();
        for (index, row) in table.rows.iter().enumerate() {
            if !(owned_by(row, owner) && query.matches(row)) {
                continue;
            }
            let mut merged = row.clone();
            if let Value::Object(fields) = &mut merged {
                for (key, value) in &patch {
                    fields.insert(key.clone(), value.clone());
                }
                fields.insert("updated_at".to_string(), Self::now_value());
            }
            (table.validate)(&merged).map_err(Error::validation)?;
            staged.push((index, merged));
        }

        let mut changes = Vec::with_capacity(staged.len());
        let mut updated = Vec::with_capacity(staged.len());
        for (index, merged) in staged {
            let old = std::mem::replace(&mut table.rows[index], merged.clone());
            changes.push(RawChange {
                event_type: EventType::Update,
                table: query.table.clone(),
                new: Some(merged.clone()),
                old: Some(old),
                commit_timestamp: Some(Utc::now()),
            });
            updated.push(merged);
        }
        drop(state);

        for change in changes {
            self.emit(change);
        }
        Ok(updated)
    }

    async fn delete(&self, session: &Session, query: &TableQuery) -> Result<Vec<Value>> {
        self.begin_call().await?;
        let mut state = self.state.lock().await;
        let owner = state.owner_for(session)?;
        let table = state.table_mut(&query.table)?;

        let (removed, kept): (Vec<Value>, Vec<Value>) = std::mem::take(&mut table.rows)
            .into_iter()
            .partition(|row| owned_by(row, owner) && query.matches(row));
        table.rows = kept;
        drop(state);

        for row in &removed {
            self.emit(RawChange {
                event_type: EventType::Delete,
                table: query.table.clone(),
                new: None,
                old: Some(row.clone()),
                commit_timestamp: Some(Utc::now()),
            });
        }
        Ok(removed)
    }

    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String> {
        self.begin_call().await?;
        let mut state = self.state.lock().await;
        let owner = state.owner_for(session)?;
        if !path.starts_with(&format!("{owner}/")) {
            return Err(rls_violation());
        }
        let key = (bucket.to_string(), path.to_string());
        if state.objects.contains_key(&key) {
            return Err(Error::validation("The resource already exists"));
        }
        state.objects.insert(key, bytes);
        Ok(path.to_string())
    }

    async fn remove(&self, session: &Session, bucket: &str, paths: &[String]) -> Result<()> {
        self.begin_call().await?;
        let mut state = self.state.lock().await;
        let owner = state.owner_for(session)?;
        let prefix = format!("{owner}/");
        for path in paths.iter().filter(|p| p.starts_with(&prefix)) {
            state.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn listen(&self, session: &Session, table: &str, owner: Uuid) -> Result<ChangeFeed> {
        {
            let state = self.state.lock().await;
            let caller = state.owner_for(session)?;
            if caller != owner {
                return Err(rls_violation());
            }
            if !state.tables.contains_key(table) {
                return Err(Error::validation(format!(
                    "relation \"{table}\" does not exist"
                )));
            }
        }

        let mut upstream = self.changes.subscribe();
        let mut disconnect = self.disconnects.subscribe();
        let (events_tx, events_rx) = mpsc::channel(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let table = table.to_string();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = disconnect.changed() => break,
                    received = upstream.recv() => match received {
                        Ok(change) => {
                            if change.table != table || change.owner() != Some(owner) {
                                continue;
                            }
                            if events_tx.send(change).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Change feed for {} skipped {} events", table, skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            trace!("Change feed for {} stopped", table);
        });

        Ok(ChangeFeed::new(events_rx, shutdown_tx, task))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::ErrorKind;
    use serde_json::json;

    async fn signed_in(platform: &MemoryPlatform, email: &str) -> Result<Session> {
        platform.add_user(email, "password").await;
        platform.sign_in_with_password(email, "password").await
    }

    fn goal_row(owner: Uuid, title: &str) -> Value {
        json!({
            "user_id": owner,
            "title": title,
            "target_amount": 100.0,
            "current_amount": 0.0,
            "target_year": 2030,
            "priority": "medium",
            "is_completed": false
        })
    }

    #[tokio::test]
    async fn test_sign_in_rejects_wrong_password() {
        let platform = MemoryPlatform::family_office();
        platform.add_user("a@example.com", "right").await;
        let result = platform.sign_in_with_password("a@example.com", "wrong").await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_and_timestamps() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let session = signed_in(&platform, "a@example.com").await?;

        let row = platform
            .insert(&session, "goals", goal_row(session.owner(), "House"))
            .await?;
        assert!(row["id"].as_str().is_some());
        assert!(row["created_at"].as_str().is_some());
        assert_eq!(row["created_at"], row["updated_at"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_for_other_owner_violates_rls() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let session = signed_in(&platform, "a@example.com").await?;

        let result = platform
            .insert(&session, "goals", goal_row(Uuid::new_v4(), "Not mine"))
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_rejects_malformed_row() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let session = signed_in(&platform, "a@example.com").await?;

        let result = platform
            .insert(&session, "goals", json!({"user_id": session.owner(), "title": "x"}))
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
        assert!(platform.rows("goals").await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_rows_are_invisible_to_other_owners() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let alice = signed_in(&platform, "alice@example.com").await?;
        let bob = signed_in(&platform, "bob@example.com").await?;

        platform
            .insert(&alice, "goals", goal_row(alice.owner(), "Alice goal"))
            .await?;

        let bobs = platform.select(&bob, &TableQuery::new("goals")).await?;
        assert!(bobs.is_empty());

        let updated = platform
            .update(&bob, &TableQuery::new("goals"), json!({"title": "stolen"}))
            .await?;
        assert!(updated.is_empty());

        let deleted = platform.delete(&bob, &TableQuery::new("goals")).await?;
        assert!(deleted.is_empty());
        assert_eq!(platform.rows("goals").await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_fails_with_transport() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let session = signed_in(&platform, "a@example.com").await?;
        platform.set_offline(true);

        let result = platform.select(&session, &TableQuery::new("goals")).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Transport);
        Ok(())
    }

    #[tokio::test]
    async fn test_listen_forwards_only_owned_rows_of_table() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let alice = signed_in(&platform, "alice@example.com").await?;
        let bob = signed_in(&platform, "bob@example.com").await?;

        let mut feed = platform.listen(&alice, "goals", alice.owner()).await?;

        platform.insert(&bob, "goals", goal_row(bob.owner(), "Bob")).await?;
        platform
            .insert(&alice, "goals", goal_row(alice.owner(), "Alice"))
            .await?;

        let change = feed.recv().await.unwrap();
        assert_eq!(change.event_type, EventType::Insert);
        assert_eq!(change.new.unwrap()["title"], "Alice");
        Ok(())
    }

    #[tokio::test]
    async fn test_dropping_feed_stops_forwarder() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let session = signed_in(&platform, "a@example.com").await?;

        let feed = platform.listen(&session, "goals", session.owner()).await?;
        assert_eq!(platform.changes.receiver_count(), 1);
        drop(feed);

        for _ in 0..50 {
            if platform.changes.receiver_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(platform.changes.receiver_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_paths_are_owner_prefixed() -> Result<()> {
        let platform = MemoryPlatform::family_office();
        let session = signed_in(&platform, "a@example.com").await?;

        let own = format!("{}/will.pdf", session.owner());
        platform
            .upload(&session, "documents", &own, b"pdf".to_vec(), "application/pdf")
            .await?;
        assert_eq!(platform.object("documents", &own).await, Some(b"pdf".to_vec()));

        let foreign = platform
            .upload(&session, "documents", "someone/else.pdf", vec![], "application/pdf")
            .await;
        assert_eq!(foreign.unwrap_err().kind(), ErrorKind::Validation);
        Ok(())
    }
}
