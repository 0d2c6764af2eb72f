use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::assistance::router::{self, application_router, ApplicationRequest};
use crate::workflows::assistance::service::AssistanceApplicationService;

fn request_body(income: f64, statement_income: f64) -> Value {
    let statement = String::from_utf8(bank_statement(statement_income, 0.0).content)
        .expect("statement is text");
    let identity = String::from_utf8(identity_document().content).expect("identity is text");
    json!({
        "identity_number": IDENTITY_NUMBER,
        "name": "Ali Hassan",
        "phone": "0501234567",
        "address": "Jumeirah 5, Dubai",
        "dependents": 3,
        "monthly_income": income,
        "monthly_debt_service": 0.0,
        "identity_document": identity,
        "bank_statement_csv": statement,
        "resume_text": "",
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::to_vec(body).expect("body serializes"),
        ))
        .expect("request builds")
}

#[test]
fn request_attaches_only_non_empty_documents() {
    let request: ApplicationRequest =
        serde_json::from_value(request_body(3000.0, 3000.0)).expect("request parses");
    let submission = request.into_submission();
    assert_eq!(submission.declared.dependents, 3);
    assert!(submission.documents.identity_document.is_some());
    assert!(submission.documents.bank_statement.is_some());
    assert!(submission.documents.resume.is_none());
}

#[tokio::test]
async fn evaluate_route_returns_outcome() {
    let (service, _) = build_service(orchestrator());
    let router = application_router(service);

    let response = router
        .oneshot(post(
            "/api/v1/applications/evaluate",
            &request_body(3000.0, 3000.0),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "completed");
    assert_eq!(payload["mismatches"], json!([]));
    assert_eq!(payload["eligibility"]["status"], "success");
    assert_eq!(payload["validation"]["all_valid"], true);
    assert_eq!(
        payload["recommendations"]["status"],
        "financial_assistance_not_approved"
    );
    assert!(payload.get("identity_document").is_none());
}

#[tokio::test]
async fn evaluate_route_reports_mismatched_fields() {
    let (service, _) = build_service(orchestrator());
    let router = application_router(service);

    let response = router
        .oneshot(post(
            "/api/v1/applications/evaluate",
            &request_body(4000.0, 4600.0),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "mismatch_terminated");
    assert_eq!(payload["mismatches"], json!(["Income"]));
    assert!(payload["message"]
        .as_str()
        .expect("message")
        .contains("don't match your documents"));
    assert!(payload.get("eligibility").is_none());
}

#[tokio::test]
async fn submit_route_accepts_and_status_route_reports() {
    let (service, _) = build_service(orchestrator());
    let router = application_router(service.clone());

    let response = router
        .clone()
        .oneshot(post("/api/v1/applications", &request_body(3000.0, 3000.0)))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let ticket = read_json_body(response).await;
    let id = ticket["application_id"]
        .as_str()
        .expect("ticket carries id")
        .to_string();

    let response = router
        .oneshot(
            Request::get(format!("/api/v1/applications/{id}/status"))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["application_id"], id.as_str());
    let status = payload["status"].as_str().expect("status");
    assert!(
        status == "in_progress" || status == "completed",
        "unexpected status {status}"
    );
}

#[tokio::test]
async fn unknown_application_routes_return_not_found() {
    let (service, _) = build_service(orchestrator());
    let router = application_router(service);

    let response = router
        .clone()
        .oneshot(
            Request::get("/api/v1/applications/app-424242")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(
            Request::delete("/api/v1/applications/app-424242")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn record_handler_returns_stored_outcome() {
    let (service, _) = build_service(orchestrator());
    let record = service
        .process(ineligible_submission())
        .await
        .expect("processing succeeds");

    let response = router::record_handler::<MemoryRepository>(
        State(service.clone()),
        Path(record.application_id.0.clone()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["application_id"], record.application_id.0.as_str());
    assert_eq!(payload["eligibility"]["eligible"], false);
}

#[tokio::test]
async fn evaluate_handler_maps_repository_outage_to_server_error() {
    let service = Arc::new(AssistanceApplicationService::new(
        Arc::new(orchestrator()),
        Arc::new(UnavailableRepository),
    ));
    let request: ApplicationRequest =
        serde_json::from_value(request_body(3000.0, 3000.0)).expect("request parses");

    let response =
        router::evaluate_handler::<UnavailableRepository>(State(service), axum::Json(request))
            .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .expect("error message")
        .contains("database offline"));
}

#[tokio::test]
async fn list_route_returns_stored_status_views() {
    let (service, _) = build_service(orchestrator());
    service
        .process(ineligible_submission())
        .await
        .expect("processing succeeds");
    service
        .process(mismatched_submission())
        .await
        .expect("mismatch stored");

    let response = application_router(service)
        .oneshot(
            Request::get("/api/v1/applications")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let views = payload.as_array().expect("array of views");
    assert_eq!(views.len(), 2);
    assert!(views
        .iter()
        .any(|view| view["status"] == "mismatch_terminated"));
}

#[tokio::test]
async fn negative_declared_amounts_are_unprocessable() {
    let (service, repository) = build_service(orchestrator());
    let router = application_router(service);

    let mut body = request_body(-300.0, 0.0);
    body["monthly_debt_service"] = json!(-250.0);
    body["bank_statement_csv"] = json!("");

    for uri in ["/api/v1/applications/evaluate", "/api/v1/applications"] {
        let response = router
            .clone()
            .oneshot(post(uri, &body))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        let payload = read_json_body(response).await;
        assert!(payload["error"]
            .as_str()
            .expect("error message")
            .contains("monthly_income"));
    }
    assert_eq!(repository.len(), 0);
}
