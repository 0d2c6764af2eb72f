use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The three external authorities consulted for every application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Government registry.
    Identity,
    /// Bank account verification.
    Financial,
    /// Credit bureau.
    Credit,
}

impl CheckKind {
    pub const fn ordered() -> [Self; 3] {
        [Self::Identity, Self::Financial, Self::Credit]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Identity => "Government validation",
            Self::Financial => "Bank validation",
            Self::Credit => "Credit validation",
        }
    }
}

/// Identity-relevant fields sent to every authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub identity_number: String,
    pub name: String,
    pub address: String,
    pub dependents: u32,
}

/// Answer returned by a single authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityVerdict {
    pub valid: bool,
    pub message: String,
    #[serde(default)]
    pub details: String,
}

impl AuthorityVerdict {
    pub fn passed(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
            details: details.into(),
        }
    }

    pub fn failed(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            details: details.into(),
        }
    }

    /// Outcome recorded when the authority could not be reached in time.
    pub fn unavailable(kind: CheckKind, reason: impl Into<String>) -> Self {
        Self::failed(format!("{} service unavailable", kind.label()), reason)
    }
}

/// Transport-level failure talking to an authority.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    #[error("authority request failed: {0}")]
    Transport(String),
    #[error("authority responded with HTTP {0}")]
    Status(u16),
    #[error("authority response could not be decoded: {0}")]
    Decode(String),
}

/// One external validation service.
#[async_trait]
pub trait Authority: Send + Sync {
    async fn verify(&self, request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError>;
}

#[derive(Serialize)]
struct AuthorityPayload<'a> {
    check: CheckKind,
    #[serde(flatten)]
    request: &'a ValidationRequest,
}

/// JSON-over-HTTP authority client.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    kind: CheckKind,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAuthority {
    pub fn new(
        kind: CheckKind,
        endpoint: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, AuthorityError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| AuthorityError::Transport(err.to_string()))?;

        Ok(Self {
            kind,
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl Authority for HttpAuthority {
    async fn verify(&self, request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&AuthorityPayload {
                check: self.kind,
                request,
            })
            .send()
            .await
            .map_err(|err| AuthorityError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::Status(status.as_u16()));
        }

        response
            .json::<AuthorityVerdict>()
            .await
            .map_err(|err| AuthorityError::Decode(err.to_string()))
    }
}

/// Stand-in used when no endpoint is configured; accepts every request.
#[derive(Debug, Clone, Copy)]
pub struct OfflineAuthority {
    kind: CheckKind,
}

impl OfflineAuthority {
    pub fn new(kind: CheckKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Authority for OfflineAuthority {
    async fn verify(&self, request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError> {
        let message = match self.kind {
            CheckKind::Identity => "Government records validated",
            CheckKind::Financial => "Bank account validated",
            CheckKind::Credit => "Credit data validated",
        };
        let prefix: String = request.identity_number.chars().take(3).collect();
        Ok(AuthorityVerdict::passed(
            message,
            format!("offline check accepted identity {prefix}..."),
        ))
    }
}
