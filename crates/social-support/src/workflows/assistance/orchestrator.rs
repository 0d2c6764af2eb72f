//! Sequential state machine driving one application through every stage.
//!
//! ```text
//! Extracting -> Reconciling -> Terminated
//!                          \-> Validating -> Evaluating -> Recommending -> Done
//! ```
//!
//! Extraction, reconciliation, and validation faults abort the submission. Validation
//! failures do not stop the pipeline; the report is attached and evaluation continues.
//! Evaluation and recommendation faults degrade to an unavailable assessment or empty output.

use std::future::pending;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::audit::{self, AuditSink, SnapshotPhase, TracingAuditSink};
use super::domain::{ApplicationStatus, PipelineStage};
use super::eligibility::{EligibilityAssessment, EligibilityInput, EligibilityScoring};
use super::extraction::{DocumentExtractor, ExtractionAdapter};
use super::generation::{DisabledTextGenerator, TextGenerator};
use super::narrative::NarrativeAdapter;
use super::reconciliation::{ReconciliationEngine, ReconciliationPolicy};
use super::record::{ApplicationRecord, RecordError};
use super::recommendation::{FinancialFacts, RecommendationAdapter};
use super::validation::{ValidationCoordinator, ValidationRequest, DEFAULT_CHECK_TIMEOUT};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("processing cancelled during {}", .stage.label())]
    Cancelled { stage: PipelineStage },
    #[error("{} failed: {message}", .stage.label())]
    StageFault {
        stage: PipelineStage,
        message: String,
    },
}

/// Aborted run; carries the last consistent version of the record for persistence.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub record: Box<ApplicationRecord>,
    #[source]
    pub error: PipelineError,
}

/// Pipeline side of a submission: publishes stage changes and observes cancellation.
pub struct SubmissionHandle {
    status: watch::Sender<PipelineStage>,
    cancel: watch::Receiver<bool>,
}

/// Caller side of a submission: reads the live stage and requests cancellation.
#[derive(Debug, Clone)]
pub struct SubmissionControl {
    status: watch::Receiver<PipelineStage>,
    cancel: Arc<watch::Sender<bool>>,
}

pub fn submission_channel() -> (SubmissionHandle, SubmissionControl) {
    let (status_tx, status_rx) = watch::channel(PipelineStage::Received);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (
        SubmissionHandle {
            status: status_tx,
            cancel: cancel_rx,
        },
        SubmissionControl {
            status: status_rx,
            cancel: Arc::new(cancel_tx),
        },
    )
}

impl SubmissionControl {
    pub fn stage(&self) -> PipelineStage {
        *self.status.borrow()
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStage> {
        self.status.clone()
    }

    /// Wait until the pipeline publishes a terminal stage.
    pub async fn finished(&self) -> PipelineStage {
        let mut status = self.status.clone();
        loop {
            let stage = *status.borrow_and_update();
            if stage.is_terminal() {
                return stage;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }
}

/// Resolves once cancellation is requested; never resolves if the caller went away.
async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}

pub struct PipelineOrchestrator {
    extractor: Arc<dyn DocumentExtractor>,
    reconciliation: ReconciliationEngine,
    validation: ValidationCoordinator,
    scorer: Arc<dyn EligibilityScoring>,
    narrative: NarrativeAdapter,
    recommendations: RecommendationAdapter,
    audit: Arc<dyn AuditSink>,
}

impl PipelineOrchestrator {
    /// Orchestrator with offline authorities, text generation disabled, and tracing audit.
    pub fn new(scorer: Arc<dyn EligibilityScoring>) -> Self {
        let generator: Arc<dyn TextGenerator> = Arc::new(DisabledTextGenerator);
        Self {
            extractor: Arc::new(ExtractionAdapter::new()),
            reconciliation: ReconciliationEngine::default(),
            validation: ValidationCoordinator::offline(DEFAULT_CHECK_TIMEOUT),
            scorer,
            narrative: NarrativeAdapter::new(generator.clone()),
            recommendations: RecommendationAdapter::new(generator),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn DocumentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_reconciliation_policy(mut self, policy: ReconciliationPolicy) -> Self {
        self.reconciliation = ReconciliationEngine::new(policy);
        self
    }

    pub fn with_validation(mut self, validation: ValidationCoordinator) -> Self {
        self.validation = validation;
        self
    }

    /// Use one generator for both the narrative and the recommendations.
    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.narrative = NarrativeAdapter::new(generator.clone());
        self.recommendations = RecommendationAdapter::new(generator);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn reconciliation(&self) -> &ReconciliationEngine {
        &self.reconciliation
    }

    /// Run to completion without an external observer.
    pub async fn process(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, PipelineFailure> {
        let (handle, _control) = submission_channel();
        self.run(record, handle).await
    }

    pub async fn run(
        &self,
        record: ApplicationRecord,
        handle: SubmissionHandle,
    ) -> Result<ApplicationRecord, PipelineFailure> {
        let SubmissionHandle { status, mut cancel } = handle;
        let record = record.with_status(ApplicationStatus::InProgress);
        info!(application_id = %record.application_id, "pipeline started");

        let result = self.extract(&record, &status, &mut cancel).await;
        let record = self.settle(result, record, &status)?;

        let result = self.reconcile(&record, &status, &cancel);
        let record = self.settle(result, record, &status)?;

        let mismatches = record.mismatches().unwrap_or_default();
        if !mismatches.is_empty() {
            warn!(
                application_id = %record.application_id,
                fields = ?mismatches,
                "documents do not match the application; stopping"
            );
            return Ok(self.finish(
                record,
                PipelineStage::Terminated,
                ApplicationStatus::MismatchTerminated,
                &status,
            ));
        }

        let result = self.validate(&record, &status, &mut cancel).await;
        let record = self.settle(result, record, &status)?;

        let result = self.evaluate(&record, &status, &mut cancel).await;
        let record = self.settle(result, record, &status)?;

        let result = self.recommend(&record, &status, &mut cancel).await;
        let record = self.settle(result, record, &status)?;

        Ok(self.finish(
            record,
            PipelineStage::Done,
            ApplicationStatus::Completed,
            &status,
        ))
    }

    fn settle(
        &self,
        result: Result<ApplicationRecord, PipelineError>,
        previous: ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
    ) -> Result<ApplicationRecord, PipelineFailure> {
        result.map_err(|error| self.abort(previous, error, status))
    }

    fn enter(
        &self,
        stage: PipelineStage,
        record: &ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        if *cancel.borrow() {
            return Err(PipelineError::Cancelled { stage });
        }
        status.send_replace(stage);
        audit::emit(&self.audit, stage, SnapshotPhase::Before, record);
        info!(application_id = %record.application_id, stage = stage.label(), "stage started");
        Ok(())
    }

    fn leave(&self, stage: PipelineStage, record: &ApplicationRecord) {
        audit::emit(&self.audit, stage, SnapshotPhase::After, record);
    }

    async fn extract(
        &self,
        record: &ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<ApplicationRecord, PipelineError> {
        let stage = PipelineStage::Extracting;
        self.enter(stage, record, status, cancel)?;

        let extractor = Arc::clone(&self.extractor);
        let documents = record.documents.clone();
        let fallback = record.declared.identity_number.clone();
        let task = tokio::task::spawn_blocking(move || {
            extractor.extract(
                documents.identity_document.as_ref(),
                &fallback,
                documents.bank_statement.as_ref(),
            )
        });

        let extracted = tokio::select! {
            biased;
            _ = cancellation(cancel) => return Err(PipelineError::Cancelled { stage }),
            joined = task => joined.map_err(|err| PipelineError::StageFault {
                stage,
                message: err.to_string(),
            })?,
        };

        let next = record.with_extracted(extracted)?;
        self.leave(stage, &next);
        Ok(next)
    }

    fn reconcile(
        &self,
        record: &ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ApplicationRecord, PipelineError> {
        let stage = PipelineStage::Reconciling;
        self.enter(stage, record, status, cancel)?;

        let mismatches = self
            .reconciliation
            .reconcile(&record.declared, &record.extracted());
        let next = record.with_mismatches(mismatches)?;
        self.leave(stage, &next);
        Ok(next)
    }

    async fn validate(
        &self,
        record: &ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<ApplicationRecord, PipelineError> {
        let stage = PipelineStage::Validating;
        self.enter(stage, record, status, cancel)?;

        let request = ValidationRequest {
            identity_number: record.declared.identity_number.clone(),
            name: record.declared.name.clone(),
            address: record.declared.address.clone(),
            dependents: record.declared.dependents,
        };
        let report = tokio::select! {
            biased;
            _ = cancellation(cancel) => return Err(PipelineError::Cancelled { stage }),
            report = self.validation.validate(&request) => report,
        };

        if !report.all_valid {
            warn!(
                application_id = %record.application_id,
                failed = ?report.failed_checks(),
                "authority checks did not all pass; continuing to evaluation"
            );
        }

        let next = record.with_validation(report)?;
        self.leave(stage, &next);
        Ok(next)
    }

    async fn evaluate(
        &self,
        record: &ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<ApplicationRecord, PipelineError> {
        let stage = PipelineStage::Evaluating;
        self.enter(stage, record, status, cancel)?;

        let extracted = record.extracted();
        let input = EligibilityInput::new(
            extracted.monthly_income,
            extracted.monthly_debt_service,
            record.declared.dependents,
        );
        let assessment = match self.scorer.score(&input) {
            Ok(score) => {
                info!(
                    application_id = %record.application_id,
                    eligible = score.eligible,
                    confidence = score.confidence,
                    model_version = %score.model_version,
                    "eligibility scored"
                );
                EligibilityAssessment::Scored(score)
            }
            Err(err) => {
                error!(application_id = %record.application_id, error = %err, "eligibility scoring failed");
                EligibilityAssessment::Unavailable {
                    reason: err.to_string(),
                }
            }
        };

        let narrative = tokio::select! {
            biased;
            _ = cancellation(cancel) => return Err(PipelineError::Cancelled { stage }),
            narrative = self.narrative.narrate(&record.declared, &extracted, &assessment) => narrative,
        };
        let narrative = narrative.unwrap_or_else(|err| {
            warn!(application_id = %record.application_id, error = %err, "narrative unavailable");
            String::new()
        });

        let next = record
            .with_eligibility(assessment)?
            .with_narrative(narrative)?;
        self.leave(stage, &next);
        Ok(next)
    }

    async fn recommend(
        &self,
        record: &ApplicationRecord,
        status: &watch::Sender<PipelineStage>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<ApplicationRecord, PipelineError> {
        let stage = PipelineStage::Recommending;
        self.enter(stage, record, status, cancel)?;

        let eligible = record
            .eligibility()
            .is_some_and(EligibilityAssessment::eligible);
        let extracted = record.extracted();
        let facts = FinancialFacts {
            monthly_income: extracted.monthly_income,
            monthly_debt_service: extracted.monthly_debt_service,
            dependents: record.declared.dependents,
        };

        let outcome = tokio::select! {
            biased;
            _ = cancellation(cancel) => return Err(PipelineError::Cancelled { stage }),
            outcome = self.recommendations.recommend(
                eligible,
                record.documents.resume.as_ref(),
                &facts,
            ) => outcome,
        };

        let next = record.with_recommendations(outcome)?;
        self.leave(stage, &next);
        Ok(next)
    }

    fn finish(
        &self,
        record: ApplicationRecord,
        stage: PipelineStage,
        outcome: ApplicationStatus,
        status: &watch::Sender<PipelineStage>,
    ) -> ApplicationRecord {
        let record = record.with_status(outcome);
        audit::emit(&self.audit, stage, SnapshotPhase::After, &record);
        status.send_replace(stage);
        info!(
            application_id = %record.application_id,
            status = record.status.label(),
            "pipeline finished"
        );
        record
    }

    fn abort(
        &self,
        record: ApplicationRecord,
        error: PipelineError,
        status: &watch::Sender<PipelineStage>,
    ) -> PipelineFailure {
        let (stage, outcome) = match &error {
            PipelineError::Cancelled { stage } => {
                warn!(
                    application_id = %record.application_id,
                    stage = stage.label(),
                    "processing cancelled"
                );
                (PipelineStage::Cancelled, ApplicationStatus::Cancelled)
            }
            other => {
                error!(application_id = %record.application_id, error = %other, "pipeline aborted");
                (PipelineStage::Failed, ApplicationStatus::Failed)
            }
        };

        let record = record.with_status(outcome);
        audit::emit(&self.audit, stage, SnapshotPhase::After, &record);
        status.send_replace(stage);
        PipelineFailure {
            record: Box::new(record),
            error,
        }
    }
}
