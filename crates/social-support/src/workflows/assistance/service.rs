use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::domain::{ApplicationId, ApplicationStatus, ApplicationSubmission, SubmissionError};
use super::orchestrator::{
    submission_channel, PipelineFailure, PipelineOrchestrator, SubmissionControl,
    SubmissionHandle,
};
use super::record::ApplicationRecord;
use super::repository::{
    ApplicationLedger, ApplicationRepository, ApplicationStatusView, RepositoryError,
};

/// Service composing the orchestrator, repository, ledger, and in-flight registry.
pub struct AssistanceApplicationService<R> {
    orchestrator: Arc<PipelineOrchestrator>,
    repository: Arc<R>,
    ledger: Option<Arc<dyn ApplicationLedger>>,
    in_flight: Arc<Mutex<HashMap<ApplicationId, SubmissionControl>>>,
}

impl<R> Clone for AssistanceApplicationService<R> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            repository: Arc::clone(&self.repository),
            ledger: self.ledger.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Acknowledgement returned when a submission is accepted for background processing.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionTicket {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub stage: &'static str,
}

/// Background submission: the ticket, a control for the live stage, and the completion.
#[derive(Debug)]
pub struct PendingSubmission {
    pub ticket: SubmissionTicket,
    pub control: SubmissionControl,
    completion: JoinHandle<Result<ApplicationRecord, ApplicationServiceError>>,
}

impl PendingSubmission {
    /// Wait for the pipeline to exit and the record to be stored.
    pub async fn completion(self) -> Result<ApplicationRecord, ApplicationServiceError> {
        self.completion
            .await
            .map_err(|err| ApplicationServiceError::Background(err.to_string()))?
    }
}

impl<R> AssistanceApplicationService<R>
where
    R: ApplicationRepository + 'static,
{
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, repository: Arc<R>) -> Self {
        Self {
            orchestrator,
            repository,
            ledger: None,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn ApplicationLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn orchestrator(&self) -> &PipelineOrchestrator {
        &self.orchestrator
    }

    /// Accept a submission and run the pipeline on the runtime.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<PendingSubmission, ApplicationServiceError> {
        submission.declared.validate()?;
        let (record, handle, control) = self.register(submission);
        let ticket = SubmissionTicket {
            application_id: record.application_id.clone(),
            status: record.status.label(),
            stage: control.stage().label(),
        };

        let service = self.clone();
        let completion = tokio::spawn(async move { service.execute(record, handle).await });
        info!(application_id = %ticket.application_id, "submission accepted");

        Ok(PendingSubmission {
            ticket,
            control,
            completion,
        })
    }

    /// Run a submission inline to completion and store the result.
    pub async fn process(
        &self,
        submission: ApplicationSubmission,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        submission.declared.validate()?;
        let (record, handle, _control) = self.register(submission);
        self.execute(record, handle).await
    }

    /// Live stage for in-flight submissions, final status for stored ones. A submission whose
    /// pipeline has exited but which is still being stored reports the status of its final stage.
    pub fn status(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationStatusView, ApplicationServiceError> {
        if let Some(control) = self.registry().get(application_id) {
            let stage = control.stage();
            return Ok(ApplicationStatusView {
                application_id: application_id.clone(),
                status: stage.status().label(),
                stage: Some(stage.label()),
                message: stage.label().to_string(),
                eligible: None,
                confidence: None,
            });
        }

        Ok(self.get(application_id)?.status_view())
    }

    /// Request cancellation of an in-flight submission.
    pub fn cancel(&self, application_id: &ApplicationId) -> Result<(), ApplicationServiceError> {
        if let Some(control) = self.registry().get(application_id) {
            control.cancel();
            info!(%application_id, stage = control.stage().label(), "cancellation requested");
            return Ok(());
        }

        match self.repository.fetch(application_id)? {
            Some(_) => Err(ApplicationServiceError::AlreadyFinished(
                application_id.clone(),
            )),
            None => Err(RepositoryError::NotFound.into()),
        }
    }

    /// Fetch a stored application.
    pub fn get(
        &self,
        application_id: &ApplicationId,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let record = self
            .repository
            .fetch(application_id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(record)
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<ApplicationRecord>, ApplicationServiceError> {
        Ok(self.repository.list(limit)?)
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ApplicationId, SubmissionControl>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        submission: ApplicationSubmission,
    ) -> (ApplicationRecord, SubmissionHandle, SubmissionControl) {
        let record = ApplicationRecord::new(next_application_id(), submission);
        let (handle, control) = submission_channel();
        self.registry()
            .insert(record.application_id.clone(), control.clone());
        (record, handle, control)
    }

    async fn execute(
        &self,
        record: ApplicationRecord,
        handle: SubmissionHandle,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        let application_id = record.application_id.clone();
        let result = match self.orchestrator.run(record, handle).await {
            Ok(record) => self.persist(record),
            Err(failure) => {
                let PipelineFailure { record, error } = failure;
                match self.persist(*record) {
                    Ok(stored) => Err(ApplicationServiceError::Pipeline(PipelineFailure {
                        record: Box::new(stored),
                        error,
                    })),
                    Err(err) => Err(err),
                }
            }
        };

        self.registry().remove(&application_id);
        if let Err(err) = &result {
            warn!(%application_id, error = %err, "submission did not complete");
        }
        result
    }

    fn persist(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, ApplicationServiceError> {
        if let Some(ledger) = &self.ledger {
            if reached_outcome(&record) {
                if let Err(err) = ledger.append(&record.ledger_row()) {
                    error!(
                        application_id = %record.application_id,
                        error = %err,
                        "ledger append failed"
                    );
                }
            }
        }

        Ok(self.repository.insert(record)?)
    }
}

/// Only records with a business outcome are written to the ledger.
fn reached_outcome(record: &ApplicationRecord) -> bool {
    matches!(
        record.status,
        ApplicationStatus::Completed | ApplicationStatus::MismatchTerminated
    )
}

/// Error raised by the application service.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
    #[error(transparent)]
    InvalidSubmission(#[from] SubmissionError),
    #[error("application {0} has already finished processing")]
    AlreadyFinished(ApplicationId),
    #[error("background processing stopped unexpectedly: {0}")]
    Background(String),
}
