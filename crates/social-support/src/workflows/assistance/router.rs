use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ApplicationId, ApplicationSubmission, DeclaredFields, DocumentHandle, SupportingDocuments,
};
use super::orchestrator::PipelineError;
use super::record::ApplicationRecord;
use super::repository::{ApplicationRepository, RepositoryError};
use super::service::{ApplicationServiceError, AssistanceApplicationService};

const RECENT_LIMIT: usize = 50;

/// JSON intake payload. Documents travel inline as text.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRequest {
    #[serde(flatten)]
    pub declared: DeclaredFields,
    #[serde(default)]
    pub identity_document: Option<String>,
    #[serde(default)]
    pub bank_statement_csv: Option<String>,
    #[serde(default)]
    pub resume_text: Option<String>,
}

impl ApplicationRequest {
    pub fn into_submission(self) -> ApplicationSubmission {
        let attach = |name: &str, text: Option<String>| {
            text.filter(|value| !value.trim().is_empty())
                .map(|value| DocumentHandle::from_text(name, value))
        };

        ApplicationSubmission {
            declared: self.declared,
            documents: SupportingDocuments {
                identity_document: attach("identity_document.txt", self.identity_document),
                bank_statement: attach("bank_statement.csv", self.bank_statement_csv),
                resume: attach("resume.txt", self.resume_text),
            },
        }
    }
}

/// Router builder for intake, synchronous evaluation, listing, polling and cancellation.
pub fn application_router<R>(service: Arc<AssistanceApplicationService<R>>) -> Router
where
    R: ApplicationRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/applications",
            post(submit_handler::<R>).get(list_handler::<R>),
        )
        .route(
            "/api/v1/applications/evaluate",
            post(evaluate_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id",
            get(record_handler::<R>).delete(cancel_handler::<R>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            get(status_handler::<R>),
        )
        .with_state(service)
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<AssistanceApplicationService<R>>>,
    axum::Json(request): axum::Json<ApplicationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    match service.submit(request.into_submission()) {
        Ok(pending) => (StatusCode::ACCEPTED, axum::Json(pending.ticket)).into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn list_handler<R>(
    State(service): State<Arc<AssistanceApplicationService<R>>>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    match service.recent(RECENT_LIMIT) {
        Ok(records) => {
            let views: Vec<_> = records.iter().map(ApplicationRecord::status_view).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn evaluate_handler<R>(
    State(service): State<Arc<AssistanceApplicationService<R>>>,
    axum::Json(request): axum::Json<ApplicationRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    match service.process(request.into_submission()).await {
        Ok(record) => (StatusCode::OK, axum::Json(record.outcome_view())).into_response(),
        Err(ApplicationServiceError::Pipeline(failure)) => {
            let status = match failure.error {
                PipelineError::Cancelled { .. } => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let payload = json!({
                "error": failure.error.to_string(),
                "application": failure.record.status_view(),
            });
            (status, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(&other),
    }
}

pub(crate) async fn record_handler<R>(
    State(service): State<Arc<AssistanceApplicationService<R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    match service.get(&ApplicationId(application_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record.outcome_view())).into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn status_handler<R>(
    State(service): State<Arc<AssistanceApplicationService<R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    match service.status(&ApplicationId(application_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(&err),
    }
}

pub(crate) async fn cancel_handler<R>(
    State(service): State<Arc<AssistanceApplicationService<R>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
{
    let id = ApplicationId(application_id);
    match service.cancel(&id) {
        Ok(()) => {
            let payload = json!({
                "application_id": id.0,
                "status": "cancellation_requested",
            });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &ApplicationServiceError) -> Response {
    let status = match err {
        ApplicationServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        ApplicationServiceError::Repository(RepositoryError::Conflict)
        | ApplicationServiceError::AlreadyFinished(_) => StatusCode::CONFLICT,
        ApplicationServiceError::InvalidSubmission(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}
