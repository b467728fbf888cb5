//! OAuth2 token introspection.
//!
//! # Responsibilities
//! - Define the introspection seam ([`TokenIntrospector`])
//! - Call the identity provider's introspection endpoint (RFC 7662 style,
//!   Keycloak realm layout)
//! - Decode the verdict into an [`IntrospectionResult`]
//!
//! # Design Decisions
//! - One form-encoded POST per call; no caching here (see `cache.rs`)
//! - Transport, status and decode failures are distinct errors so the
//!   authorizer can tell "IdP unreachable" from "token rejected"
//! - The client secret never appears in `Debug` output or logs

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::config::RealmConfig;

/// Verdict for one token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectionResult {
    pub active: bool,
    pub subject: String,
    /// Seconds since the Unix epoch.
    pub issued_at: Option<u64>,
    /// Seconds since the Unix epoch.
    pub expires_at: Option<u64>,
}

impl IntrospectionResult {
    pub fn inactive() -> Self {
        Self {
            active: false,
            subject: String::new(),
            issued_at: None,
            expires_at: None,
        }
    }

    /// Time left before `exp`, if the IdP reported one.
    pub fn remaining_lifetime(&self, now: SystemTime) -> Option<Duration> {
        let now = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        self.expires_at
            .map(|exp| Duration::from_secs(exp.saturating_sub(now)))
    }
}

/// Wire format of the introspection response. Inactive tokens carry only `active`.
#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    exp: Option<u64>,
}

impl From<IntrospectionResponse> for IntrospectionResult {
    fn from(wire: IntrospectionResponse) -> Self {
        Self {
            active: wire.active,
            subject: wire.sub.unwrap_or_default(),
            issued_at: wire.iat,
            expires_at: wire.exp,
        }
    }
}

#[derive(Debug, Error)]
pub enum IntrospectionError {
    #[error("introspection request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("introspection endpoint answered {0}")]
    Status(StatusCode),

    #[error("introspection response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("introspection timed out after {0:?}")]
    Timeout(Duration),

    #[error("active token has no subject")]
    MissingSubject,
}

/// Resolves a bearer token to a verdict.
pub trait TokenIntrospector: Send + Sync + 'static {
    fn introspect<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<IntrospectionResult, IntrospectionError>>;
}

/// Introspection against an OpenID Connect provider realm.
pub struct OidcIntrospector {
    endpoint: String,
    client_id: String,
    client_secret: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OidcIntrospector {
    pub fn new(realm: &RealmConfig, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            endpoint: introspection_endpoint(&realm.introspection_url, &realm.realm),
            client_id: realm.client_id.clone(),
            client_secret: realm.client_secret.clone(),
            timeout,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn call(&self, token: &str) -> Result<IntrospectionResult, IntrospectionError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("token", token),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntrospectionError::Status(status));
        }

        let wire: IntrospectionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                IntrospectionError::Timeout(self.timeout)
            } else {
                IntrospectionError::Decode(e)
            }
        })?;

        let result = IntrospectionResult::from(wire);
        if result.active && result.subject.is_empty() {
            return Err(IntrospectionError::MissingSubject);
        }
        Ok(result)
    }

    fn classify(&self, error: reqwest::Error) -> IntrospectionError {
        if error.is_timeout() {
            IntrospectionError::Timeout(self.timeout)
        } else {
            IntrospectionError::Transport(error)
        }
    }
}

impl TokenIntrospector for OidcIntrospector {
    fn introspect<'a>(
        &'a self,
        token: &'a str,
    ) -> BoxFuture<'a, Result<IntrospectionResult, IntrospectionError>> {
        self.call(token).boxed()
    }
}

impl fmt::Debug for OidcIntrospector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcIntrospector")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// `{base}/realms/{realm}/protocol/openid-connect/token/introspect`
pub fn introspection_endpoint(base: &str, realm: &str) -> String {
    format!(
        "{}/realms/{}/protocol/openid-connect/token/introspect",
        base.trim_end_matches('/'),
        realm
    )
}
