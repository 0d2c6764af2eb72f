mod authority;
mod sentinel;

pub use authority::{
    Authority, AuthorityError, AuthorityVerdict, CheckKind, HttpAuthority, OfflineAuthority,
    ValidationRequest,
};
pub use sentinel::SentinelFailureAuthority;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{info, warn};

/// Per-check deadline used when none is configured.
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Tri-state view of a single check on the application record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Unknown,
    Passed,
    Failed,
}

/// Aggregated result of the identity, financial, and credit checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub identity: AuthorityVerdict,
    pub financial: AuthorityVerdict,
    pub credit: AuthorityVerdict,
    pub all_valid: bool,
}

impl ValidationReport {
    pub fn new(
        identity: AuthorityVerdict,
        financial: AuthorityVerdict,
        credit: AuthorityVerdict,
    ) -> Self {
        let all_valid = identity.valid && financial.valid && credit.valid;
        Self {
            identity,
            financial,
            credit,
            all_valid,
        }
    }

    pub fn verdict(&self, kind: CheckKind) -> &AuthorityVerdict {
        match kind {
            CheckKind::Identity => &self.identity,
            CheckKind::Financial => &self.financial,
            CheckKind::Credit => &self.credit,
        }
    }

    pub fn failed_checks(&self) -> Vec<CheckKind> {
        CheckKind::ordered()
            .into_iter()
            .filter(|kind| !self.verdict(*kind).valid)
            .collect()
    }
}

/// Runs the three authority checks concurrently, each under its own deadline.
#[derive(Clone)]
pub struct ValidationCoordinator {
    identity: Arc<dyn Authority>,
    financial: Arc<dyn Authority>,
    credit: Arc<dyn Authority>,
    check_timeout: Duration,
}

impl ValidationCoordinator {
    pub fn new(
        identity: Arc<dyn Authority>,
        financial: Arc<dyn Authority>,
        credit: Arc<dyn Authority>,
        check_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            financial,
            credit,
            check_timeout,
        }
    }

    /// Coordinator backed by [`OfflineAuthority`] for all three checks.
    pub fn offline(check_timeout: Duration) -> Self {
        Self::new(
            Arc::new(OfflineAuthority::new(CheckKind::Identity)),
            Arc::new(OfflineAuthority::new(CheckKind::Financial)),
            Arc::new(OfflineAuthority::new(CheckKind::Credit)),
            check_timeout,
        )
    }

    /// Wrap every authority in the demo sentinel double.
    pub fn with_demo_sentinels(self) -> Self {
        Self {
            identity: Arc::new(SentinelFailureAuthority::wrap(
                CheckKind::Identity,
                self.identity,
            )),
            financial: Arc::new(SentinelFailureAuthority::wrap(
                CheckKind::Financial,
                self.financial,
            )),
            credit: Arc::new(SentinelFailureAuthority::wrap(CheckKind::Credit, self.credit)),
            check_timeout: self.check_timeout,
        }
    }

    pub async fn validate(&self, request: &ValidationRequest) -> ValidationReport {
        let (identity, financial, credit) = tokio::join!(
            self.run_check(CheckKind::Identity, self.identity.as_ref(), request),
            self.run_check(CheckKind::Financial, self.financial.as_ref(), request),
            self.run_check(CheckKind::Credit, self.credit.as_ref(), request),
        );

        let report = ValidationReport::new(identity, financial, credit);
        info!(
            all_valid = report.all_valid,
            failed = ?report.failed_checks(),
            "authority checks finished"
        );
        report
    }

    async fn run_check(
        &self,
        kind: CheckKind,
        authority: &dyn Authority,
        request: &ValidationRequest,
    ) -> AuthorityVerdict {
        match timeout(self.check_timeout, authority.verify(request)).await {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                warn!(check = ?kind, error = %err, "authority check failed");
                AuthorityVerdict::unavailable(kind, err.to_string())
            }
            Err(_) => {
                warn!(check = ?kind, timeout_ms = self.check_timeout.as_millis() as u64, "authority check timed out");
                AuthorityVerdict::unavailable(
                    kind,
                    format!("no response within {}ms", self.check_timeout.as_millis()),
                )
            }
        }
    }
}
