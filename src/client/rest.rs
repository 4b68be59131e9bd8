//! Remote platform over HTTP.
//!
//! Tables are served at `/rest/v1/{table}` with `col=eq.value` filters and
//! `order=col.desc`; auth at `/auth/v1`; storage at `/storage/v1/object`. Every
//! request carries the public key as `apikey`, and session-bound requests add the
//! access token as a bearer token. Realtime is delegated to [`super::socket`].

use super::auth::{Session, TokenResponse};
use super::platform::{ChangeFeed, Platform, TableQuery};
use super::socket;
use crate::config::platform::PlatformConfig;
use crate::config::settings::RealtimeSettings;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Error body shapes returned by the table, auth and storage endpoints.
#[derive(Debug, Default, Deserialize)]
struct PlatformErrorBody {
    code: Option<Value>,
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl PlatformErrorBody {
    fn code(&self) -> Option<String> {
        self.code.as_ref().map(crate::client::platform::render_value)
    }

    fn describe(&self) -> Option<String> {
        let headline = self
            .message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())?;
        let mut text = headline;
        if let Some(details) = &self.details {
            text.push_str(&format!(" ({details})"));
        }
        if let Some(hint) = &self.hint {
            text.push_str(&format!(" hint: {hint}"));
        }
        Some(text)
    }
}

/// Postgres error code for a row-level security violation
const RLS_VIOLATION: &str = "42501";

/// Maps a failed table or storage response to the error taxonomy.
pub(crate) fn classify_failure(status: u16, body: &str) -> Error {
    let parsed: PlatformErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .describe()
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));

    match status {
        // A rejected row under row-level security is a shape problem, not a missing session
        401 | 403 if parsed.code().as_deref() == Some(RLS_VIOLATION) => Error::validation(message),
        401 | 403 => Error::unauthenticated(message),
        400 | 409 | 413 | 415 | 422 => Error::validation(message),
        _ => Error::transport(message),
    }
}

/// Maps a failed auth response. Rejected credentials are an authentication failure.
pub(crate) fn classify_auth_failure(status: u16, body: &str) -> Error {
    match status {
        400 | 401 | 403 | 422 => match classify_failure(status, body) {
            Error::Validation { message } | Error::Transport { message } => {
                Error::unauthenticated(message)
            }
            other => other,
        },
        _ => classify_failure(status, body),
    }
}

/// HTTP implementation of [`Platform`].
pub struct RestPlatform {
    config: PlatformConfig,
    realtime: RealtimeSettings,
    http: reqwest::Client,
}

impl RestPlatform {
    /// Builds the HTTP client for one platform project.
    pub fn new(config: PlatformConfig, realtime: RealtimeSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("family-office/", env!("CARGO_PKG_VERSION")))
            .build()?;
        debug!("Created REST platform client for {}", config.url);
        Ok(Self {
            config,
            realtime,
            http,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.config.url)
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.config.url)
    }

    fn storage_url(&self, bucket: &str, path: Option<&str>) -> String {
        match path {
            Some(path) => format!("{}/storage/v1/object/{bucket}/{path}", self.config.url),
            None => format!("{}/storage/v1/object/{bucket}", self.config.url),
        }
    }

    fn public(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("apikey", &self.config.anon_key)
    }

    fn authorized(&self, builder: RequestBuilder, session: &Session) -> RequestBuilder {
        self.public(builder).bearer_auth(&session.access_token)
    }

    async fn rows(response: Response) -> Result<Vec<Value>> {
        let response = Self::check(response).await?;
        response
            .json::<Vec<Value>>()
            .await
            .map_err(|e| Error::transport(format!("unreadable table response: {e}")))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Platform request failed with {}: {}", status, body);
        Err(classify_failure(status.as_u16(), &body))
    }

    async fn session_from(response: Response) -> Result<Session> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_auth_failure(status.as_u16(), &body));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::transport(format!("unreadable token response: {e}")))?;
        Ok(token.into())
    }
}

#[async_trait]
impl Platform for RestPlatform {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session> {
        let response = self
            .public(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "password")])
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::session_from(response).await
    }

    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let response = self
            .public(self.http.post(self.auth_url("signup")))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| Error::transport(format!("unreadable signup response: {e}")))?;
        if value.get("access_token").is_none() {
            debug!("Sign-up for {} awaits email confirmation", email);
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(value)
            .map_err(|e| Error::transport(format!("unreadable signup response: {e}")))?;
        Ok(Some(token.into()))
    }

    #[instrument(skip_all)]
    async fn refresh_session(&self, refresh_token: &str) -> Result<Session> {
        let response = self
            .public(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        Self::session_from(response).await
    }

    #[instrument(skip_all, fields(user = %session.owner()))]
    async fn sign_out(&self, session: &Session) -> Result<()> {
        let response = self
            .authorized(self.http.post(self.auth_url("logout")), session)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(table = %query.table))]
    async fn select(&self, session: &Session, query: &TableQuery) -> Result<Vec<Value>> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(query.to_query_pairs());
        let response = self
            .authorized(self.http.get(self.table_url(&query.table)), session)
            .query(&pairs)
            .send()
            .await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, session, row))]
    async fn insert(&self, session: &Session, table: &str, row: Value) -> Result<Value> {
        let response = self
            .authorized(self.http.post(self.table_url(table)), session)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await?;
        Self::rows(response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::transport(format!("insert into {table} returned no row")))
    }

    #[instrument(skip(self, session, patch), fields(table = %query.table))]
    async fn update(
        &self,
        session: &Session,
        query: &TableQuery,
        patch: Value,
    ) -> Result<Vec<Value>> {
        let response = self
            .authorized(self.http.patch(self.table_url(&query.table)), session)
            .header("Prefer", "return=representation")
            .query(&query.to_query_pairs())
            .json(&patch)
            .send()
            .await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, session), fields(table = %query.table))]
    async fn delete(&self, session: &Session, query: &TableQuery) -> Result<Vec<Value>> {
        let response = self
            .authorized(self.http.delete(self.table_url(&query.table)), session)
            .header("Prefer", "return=representation")
            .query(&query.to_query_pairs())
            .send()
            .await?;
        Self::rows(response).await
    }

    #[instrument(skip(self, session, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        session: &Session,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let response = self
            .authorized(self.http.post(self.storage_url(bucket, Some(path))), session)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(path.to_string())
    }

    #[instrument(skip(self, session))]
    async fn remove(&self, session: &Session, bucket: &str, paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let response = self
            .authorized(self.http.delete(self.storage_url(bucket, None)), session)
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Objects already absent from {}", bucket);
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.config.url)
    }

    async fn listen(&self, session: &Session, table: &str, owner: Uuid) -> Result<ChangeFeed> {
        socket::open_channel(
            &self.config,
            &self.realtime,
            session.access_token.clone(),
            table,
            owner,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_classify_constraint_violation_as_validation() {
        let body = r#"{"code":"23502","message":"null value in column \"symbol\"","details":null,"hint":null}"#;
        let err = classify_failure(400, body);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("symbol"));
    }

    #[test]
    fn test_classify_rls_rejection_as_validation() {
        let body = r#"{"code":"42501","message":"new row violates row-level security policy"}"#;
        assert_eq!(classify_failure(403, body).kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_classify_expired_token_as_unauthenticated() {
        let body = r#"{"code":"PGRST301","message":"JWT expired"}"#;
        assert_eq!(classify_failure(401, body).kind(), ErrorKind::Unauthenticated);
    }

    #[test]
    fn test_classify_server_errors_as_transport() {
        assert_eq!(classify_failure(503, "upstream down").kind(), ErrorKind::Transport);
        assert_eq!(classify_failure(500, "").kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_classify_bad_credentials_as_unauthenticated() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        let err = classify_auth_failure(400, body);
        assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        assert!(err.to_string().contains("Invalid login credentials"));
    }

    #[test]
    fn test_urls() -> Result<()> {
        let platform = RestPlatform::new(
            PlatformConfig::new("https://demo.example.co", "key")?,
            RealtimeSettings::default(),
        )?;
        assert_eq!(platform.table_url("stocks"), "https://demo.example.co/rest/v1/stocks");
        assert_eq!(
            platform.public_url("documents", "u/file.pdf"),
            "https://demo.example.co/storage/v1/object/public/documents/u/file.pdf"
        );
        Ok(())
    }
}
