//! Auth sessions.
//!
//! A [`Session`] is what the platform hands back from a sign-in: bearer tokens plus
//! the authenticated user. The user's id is the owner every row is scoped to.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sessions closer than this to expiry are refreshed before use
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// The authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Owner id used for every row
    pub id: Uuid,
    /// Sign-in email, when known
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for table, storage and realtime requests
    pub access_token: String,
    /// Token exchanged for a new session near expiry
    pub refresh_token: String,
    /// When `access_token` stops being accepted
    pub expires_at: DateTime<Utc>,
    /// The signed-in user
    pub user: AuthUser,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Identity every owner-scoped row is filtered by.
    #[must_use]
    pub const fn owner(&self) -> Uuid {
        self.user.id
    }

    /// Whether the access token expires within `margin` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at <= now + margin
    }

    /// Whether the session should be refreshed before the next request.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.expires_within(Utc::now(), Duration::seconds(REFRESH_MARGIN_SECS))
    }
}

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl From<TokenResponse> for Session {
    fn from(value: TokenResponse) -> Self {
        let expires_at = value
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or_else(|| Utc::now() + Duration::seconds(value.expires_in.unwrap_or(3600)));

        Self {
            access_token: value.access_token,
            refresh_token: value.refresh_token,
            expires_at,
            user: value.user,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: DateTime<Utc>) -> Session {
        Session {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at,
            user: AuthUser {
                id: Uuid::new_v4(),
                email: None,
            },
        }
    }

    #[test]
    fn test_needs_refresh_near_expiry() {
        let fresh = session_expiring_at(Utc::now() + Duration::hours(1));
        assert!(!fresh.needs_refresh());

        let expiring = session_expiring_at(Utc::now() + Duration::seconds(30));
        assert!(expiring.needs_refresh());

        let expired = session_expiring_at(Utc::now() - Duration::minutes(5));
        assert!(expired.needs_refresh());
    }

    #[test]
    fn test_token_response_prefers_absolute_expiry() -> Result<(), serde_json::Error> {
        let body = serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1_900_000_000,
            "user": {"id": Uuid::nil(), "email": "owner@example.com"}
        });
        let session: Session = serde_json::from_value::<TokenResponse>(body)?.into();
        assert_eq!(session.expires_at.timestamp(), 1_900_000_000);
        assert_eq!(session.owner(), Uuid::nil());
        Ok(())
    }

    #[test]
    fn test_debug_hides_tokens() {
        let session = session_expiring_at(Utc::now());
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("access"));
        assert!(!rendered.contains("refresh"));
    }
}
