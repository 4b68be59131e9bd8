//! The backend client handle.
//!
//! [`BackendClient`] is the one shared connection to the hosted platform. It is
//! built from two configuration values and never fails at construction: when the
//! configuration is missing, the error is remembered and returned by every call
//! at first use. The platform implementation itself is created lazily on the
//! first call. The handle also holds the current auth session, and every table,
//! storage and realtime call checks for that session before touching the network.

/// Session and token types
pub mod auth;
/// In-process platform with the hosted platform's semantics
pub mod memory;
/// The platform capability trait and its query/change types
pub mod platform;
/// HTTP implementation of the platform
pub mod rest;
mod socket;
/// Bucket-scoped object storage
pub mod storage;

use crate::config::platform::PlatformConfig;
use crate::config::settings::RealtimeSettings;
use crate::errors::{Error, Result};
use auth::Session;
use once_cell::sync::{Lazy, OnceCell};
use platform::{ChangeFeed, Platform, TableQuery};
use rest::RestPlatform;
use serde_json::Value;
use std::sync::Arc;
use storage::StorageBucket;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

static SHARED: Lazy<Arc<BackendClient>> = Lazy::new(|| Arc::new(BackendClient::from_env()));

/// Shared handle to the hosted platform.
pub struct BackendClient {
    config: Option<Result<PlatformConfig>>,
    realtime: RealtimeSettings,
    platform: OnceCell<Arc<dyn Platform>>,
    session: RwLock<Option<Session>>,
}

impl BackendClient {
    /// Builds a handle from `FAMILY_OFFICE_API_URL` and `FAMILY_OFFICE_ANON_KEY`.
    ///
    /// Missing variables are not reported here but by every later call.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_config(PlatformConfig::from_env(), RealtimeSettings::default())
    }

    /// Builds a handle from an already-read configuration outcome.
    #[must_use]
    pub fn from_config(config: Result<PlatformConfig>, realtime: RealtimeSettings) -> Self {
        if let Err(e) = &config {
            warn!("Platform configuration unavailable: {}", e);
        }
        Self {
            config: Some(config),
            realtime,
            platform: OnceCell::new(),
            session: RwLock::new(None),
        }
    }

    /// Builds a handle over an existing platform implementation.
    #[must_use]
    pub fn with_platform(platform: Arc<dyn Platform>) -> Self {
        Self {
            config: None,
            realtime: RealtimeSettings::default(),
            platform: OnceCell::with_value(platform),
            session: RwLock::new(None),
        }
    }

    /// The process-wide handle, built from the environment on first access.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(&SHARED)
    }

    pub(crate) fn platform(&self) -> Result<Arc<dyn Platform>> {
        self.platform
            .get_or_try_init(|| {
                let config = match &self.config {
                    Some(Ok(config)) => config.clone(),
                    Some(Err(e)) => return Err(e.clone()),
                    None => return Err(Error::config("no platform configured")),
                };
                info!("Connecting to platform at {}", config.url);
                let rest = RestPlatform::new(config, self.realtime.clone())?;
                Ok(Arc::new(rest) as Arc<dyn Platform>)
            })
            .cloned()
    }

    // --- Auth ---

    /// Signs in with email and password and keeps the session.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .platform()?
            .sign_in_with_password(email, password)
            .await?;
        info!("Signed in as {}", session.owner());
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Registers a user; keeps the session when the platform issues one immediately.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let session = self.platform()?.sign_up(email, password).await?;
        if let Some(session) = &session {
            *self.session.write().await = Some(session.clone());
        }
        Ok(session)
    }

    /// Drops the local session and revokes it on the platform.
    ///
    /// The local session is cleared even when revocation fails.
    pub async fn sign_out(&self) -> Result<()> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(());
        };
        info!("Signing out {}", session.owner());
        self.platform()?.sign_out(&session).await
    }

    /// Installs a previously obtained session.
    pub async fn set_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Current session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Current session, refreshed when close to expiry.
    ///
    /// # Errors
    /// [`Error::Unauthenticated`] when no session is held or the refresh is rejected.
    pub async fn require_session(&self) -> Result<Session> {
        let current = self
            .session
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::unauthenticated("no active session"))?;
        if !current.needs_refresh() {
            return Ok(current);
        }

        // Refresh tokens are single-use: hold the slot while refreshing and let
        // callers queued behind a completed refresh take its result.
        let mut slot = self.session.write().await;
        match slot.as_ref() {
            None => return Err(Error::unauthenticated("no active session")),
            Some(held) if held.refresh_token != current.refresh_token => {
                return Ok(held.clone());
            }
            Some(_) => {}
        }

        debug!("Refreshing session for {}", current.owner());
        match self
            .platform()?
            .refresh_session(&current.refresh_token)
            .await
        {
            Ok(session) => {
                *slot = Some(session.clone());
                Ok(session)
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                *slot = None;
                Err(Error::unauthenticated(format!("session expired: {e}")))
            }
        }
    }

    // --- Tables ---

    /// Rows visible to the session matching `query`.
    pub async fn select(&self, query: &TableQuery) -> Result<Vec<Value>> {
        let session = self.require_session().await?;
        self.platform()?.select(&session, query).await
    }

    /// Inserts one row.
    pub async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let session = self.require_session().await?;
        self.platform()?.insert(&session, table, row).await
    }

    /// Patches matching rows.
    pub async fn update(&self, query: &TableQuery, patch: Value) -> Result<Vec<Value>> {
        let session = self.require_session().await?;
        self.platform()?.update(&session, query, patch).await
    }

    /// Deletes matching rows.
    pub async fn delete(&self, query: &TableQuery) -> Result<Vec<Value>> {
        let session = self.require_session().await?;
        self.platform()?.delete(&session, query).await
    }

    // --- Storage & realtime ---

    /// Storage handle for `bucket`.
    #[must_use]
    pub fn storage(&self, bucket: &str) -> StorageBucket<'_> {
        StorageBucket::new(self, bucket)
    }

    /// Opens a change feed for the session owner's rows of `table`.
    pub async fn listen(&self, table: &str) -> Result<ChangeFeed> {
        let session = self.require_session().await?;
        self.platform()?
            .listen(&session, table, session.owner())
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::ErrorKind;
    use crate::test_utils::{PASSWORD, signed_in_client};
    use auth::AuthUser;
    use chrono::{Duration, Utc};
    use memory::MemoryPlatform;

    #[tokio::test]
    async fn test_missing_config_fails_at_first_use() {
        let client = BackendClient::from_config(
            Err(Error::config("FAMILY_OFFICE_API_URL not set")),
            RealtimeSettings::default(),
        );
        let err = client.sign_in("a@example.com", "pw").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(client.storage("documents").public_url("x").is_err());
    }

    #[tokio::test]
    async fn test_calls_without_session_fail_before_network() {
        let platform = Arc::new(MemoryPlatform::family_office());
        let client = BackendClient::with_platform(platform.clone());

        let err = client.select(&TableQuery::new("goals")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert_eq!(platform.table_calls(), 0);
    }

    #[tokio::test]
    async fn test_unauthenticated_takes_precedence_over_missing_config() {
        let client =
            BackendClient::from_config(Err(Error::config("missing")), RealtimeSettings::default());
        let err = client.delete(&TableQuery::new("goals")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() -> Result<()> {
        let (client, _platform, _owner) = signed_in_client().await?;
        assert!(client.session().await.is_some());

        client.sign_out().await?;
        assert!(client.session().await.is_none());
        assert_eq!(
            client.require_session().await.unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_expiring_session_is_refreshed() -> Result<()> {
        let (client, _platform, owner) = signed_in_client().await?;
        let mut session = client.session().await.unwrap();
        let old_token = session.access_token.clone();
        session.expires_at = Utc::now() + Duration::seconds(5);
        client.set_session(session).await;

        let refreshed = client.require_session().await?;
        assert_ne!(refreshed.access_token, old_token);
        assert_eq!(refreshed.owner(), owner);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_refresh() -> Result<()> {
        let (client, platform, owner) = signed_in_client().await?;
        let mut session = client.session().await.unwrap();
        let old_token = session.refresh_token.clone();
        session.expires_at = Utc::now() + Duration::seconds(5);
        client.set_session(session).await;
        platform.set_latency(std::time::Duration::from_millis(20));

        let worth = crate::core::summary::net_worth(&client).await?;
        assert!(worth.net_worth.abs() < f64::EPSILON);

        let kept = client.session().await.unwrap();
        assert_ne!(kept.refresh_token, old_token);
        assert_eq!(kept.owner(), owner);
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_refresh_drops_session() {
        let client = BackendClient::with_platform(Arc::new(MemoryPlatform::family_office()));
        client
            .set_session(Session {
                access_token: "stale".to_string(),
                refresh_token: "unknown".to_string(),
                expires_at: Utc::now() - Duration::minutes(1),
                user: AuthUser {
                    id: uuid::Uuid::new_v4(),
                    email: None,
                },
            })
            .await;

        let err = client.require_session().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert!(client.session().await.is_none());
    }

    #[tokio::test]
    async fn test_sign_up_keeps_issued_session() -> Result<()> {
        let client = BackendClient::with_platform(Arc::new(MemoryPlatform::family_office()));
        let session = client.sign_up("new@example.com", PASSWORD).await?.unwrap();
        assert_eq!(client.session().await.unwrap().owner(), session.owner());
        Ok(())
    }
}
