//! Demo double that forces authority failures from marker substrings.
//!
//! Wraps a real authority. Financial and credit checks fail when the identity number contains
//! `911`; the identity check fails when the identity number, name, or address carries `DEMO`
//! (case-insensitive) or the identity number contains `911`. Anything else is forwarded.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::authority::{
    Authority, AuthorityError, AuthorityVerdict, CheckKind, ValidationRequest,
};

const NUMERIC_SENTINEL: &str = "911";
const TEXT_SENTINEL: &str = "DEMO";

pub struct SentinelFailureAuthority {
    kind: CheckKind,
    inner: Arc<dyn Authority>,
}

impl SentinelFailureAuthority {
    pub fn wrap(kind: CheckKind, inner: Arc<dyn Authority>) -> Self {
        Self { kind, inner }
    }

    fn triggered_by(&self, request: &ValidationRequest) -> Option<&'static str> {
        if request.identity_number.contains(NUMERIC_SENTINEL) {
            return Some("identity_number");
        }

        if self.kind != CheckKind::Identity {
            return None;
        }

        [
            ("identity_number", request.identity_number.as_str()),
            ("name", request.name.as_str()),
            ("address", request.address.as_str()),
        ]
        .into_iter()
        .find(|(_, value)| value.to_uppercase().contains(TEXT_SENTINEL))
        .map(|(field, _)| field)
    }
}

#[async_trait]
impl Authority for SentinelFailureAuthority {
    async fn verify(&self, request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError> {
        if let Some(field) = self.triggered_by(request) {
            warn!(check = ?self.kind, field, "demo failure triggered");
            return Ok(AuthorityVerdict::failed(
                format!("{} failed (DEMO)", self.kind.label()),
                format!("Demo failure triggered via {field} containing '{NUMERIC_SENTINEL}' or '{TEXT_SENTINEL}'"),
            ));
        }

        self.inner.verify(request).await
    }
}
