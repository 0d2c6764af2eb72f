//! Social-support application intake and the staged processing pipeline.
//!
//! A submission is extracted, reconciled against the declared form values, checked with the
//! external authorities, scored for eligibility, and finally matched with career suggestions.
//! Each stage writes its own fields on the [`ApplicationRecord`] and the orchestrator decides
//! the next stage from what was written.

pub mod audit;
pub mod domain;
pub mod eligibility;
pub mod extraction;
pub mod generation;
pub mod narrative;
pub mod orchestrator;
pub mod recommendation;
pub mod reconciliation;
pub mod record;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use audit::{AuditSink, RedactedRecord, SnapshotPhase, StageSnapshot, TracingAuditSink};
pub use domain::{
    ApplicationId, ApplicationStatus, ApplicationSubmission, DeclaredFields, DocumentHandle,
    ExtractedFields, MismatchField, PipelineStage, SubmissionError, SupportingDocuments,
};
pub use eligibility::{
    EligibilityAssessment, EligibilityFeature, EligibilityInput, EligibilityScore,
    EligibilityScorer, EligibilityScoring, ModelLoadError, ScoringError,
};
pub use extraction::{DocumentExtractor, ExtractionAdapter};
pub use generation::{
    DisabledTextGenerator, GenerationError, OllamaTextGenerator, TextGenerator,
};
pub use narrative::NarrativeAdapter;
pub use orchestrator::{
    submission_channel, PipelineError, PipelineFailure, PipelineOrchestrator, SubmissionControl,
    SubmissionHandle,
};
pub use reconciliation::{
    ComparisonOutcome, FieldComparison, ReconciliationEngine, ReconciliationPolicy,
};
pub use recommendation::{RecommendationAdapter, RecommendationOutcome, RecommendationStatus};
pub use record::{ApplicationRecord, RecordError};
pub use repository::{
    ApplicationLedger, ApplicationOutcomeView, ApplicationRepository, ApplicationStatusView,
    CsvApplicationLedger, LedgerRow, RepositoryError,
};
pub use router::{application_router, ApplicationRequest};
pub use service::{
    ApplicationServiceError, AssistanceApplicationService, PendingSubmission, SubmissionTicket,
};
pub use validation::{
    Authority, AuthorityVerdict, CheckKind, HttpAuthority, OfflineAuthority,
    SentinelFailureAuthority, ValidationCoordinator, ValidationReport,
};
