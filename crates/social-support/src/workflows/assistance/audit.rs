use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ApplicationId, DocumentHandle, MismatchField, PipelineStage};
use super::record::ApplicationRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPhase {
    Before,
    After,
}

/// Record state captured around one stage transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSnapshot {
    pub stage: PipelineStage,
    pub phase: SnapshotPhase,
    pub record: RedactedRecord,
}

/// Record view safe to write to logs: personal values are truncated and payloads omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactedRecord {
    pub application_id: ApplicationId,
    pub status: &'static str,
    pub identity_number: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub dependents: u32,
    pub monthly_income: f64,
    pub monthly_debt_service: f64,
    pub identity_document: &'static str,
    pub bank_statement: &'static str,
    pub resume: &'static str,
    pub extracted_identity_number: String,
    pub extracted_name: String,
    pub extracted_phone: String,
    pub extracted_address: String,
    pub extracted_income: f64,
    pub extracted_debt_service: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatches: Option<Vec<MismatchField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation_status: Option<&'static str>,
}

fn truncated(value: &str, keep: usize, suffix: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let prefix: String = value.chars().take(keep).collect();
    format!("{prefix}{suffix}")
}

pub fn redact_identifier(value: &str) -> String {
    truncated(value, 3, "...")
}

pub fn redact_name(value: &str) -> String {
    truncated(value, 1, "***")
}

pub fn redact_address(value: &str) -> String {
    truncated(value, 10, "...")
}

fn file_marker(document: Option<&DocumentHandle>) -> &'static str {
    if document.is_some() {
        "[FILE]"
    } else {
        "None"
    }
}

impl RedactedRecord {
    pub fn from_record(record: &ApplicationRecord) -> Self {
        let extracted = record.extracted();
        let eligibility = record.eligibility();
        Self {
            application_id: record.application_id.clone(),
            status: record.status.label(),
            identity_number: redact_identifier(&record.declared.identity_number),
            name: redact_name(&record.declared.name),
            phone: redact_identifier(&record.declared.phone),
            address: redact_address(&record.declared.address),
            dependents: record.declared.dependents,
            monthly_income: record.declared.monthly_income,
            monthly_debt_service: record.declared.monthly_debt_service,
            identity_document: file_marker(record.documents.identity_document.as_ref()),
            bank_statement: file_marker(record.documents.bank_statement.as_ref()),
            resume: file_marker(record.documents.resume.as_ref()),
            extracted_identity_number: redact_identifier(&extracted.identity_number),
            extracted_name: redact_name(&extracted.name),
            extracted_phone: redact_identifier(&extracted.phone),
            extracted_address: redact_address(&extracted.address),
            extracted_income: extracted.monthly_income,
            extracted_debt_service: extracted.monthly_debt_service,
            mismatches: record.mismatches().map(<[MismatchField]>::to_vec),
            all_valid: record.validation().map(|report| report.all_valid),
            eligible: eligibility.map(|assessment| assessment.eligible()),
            confidence: eligibility.and_then(|assessment| assessment.confidence()),
            narrative_chars: record.narrative().map(|text| text.chars().count()),
            recommendation_status: record
                .recommendations()
                .map(|outcome| outcome.status.label()),
        }
    }
}

/// Receives a redacted snapshot before and after every stage.
pub trait AuditSink: Send + Sync {
    fn record(&self, snapshot: StageSnapshot);
}

/// Writes snapshots as JSON under the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, snapshot: StageSnapshot) {
        match serde_json::to_string(&snapshot.record) {
            Ok(state) => info!(
                target: "audit",
                stage = ?snapshot.stage,
                phase = ?snapshot.phase,
                %state,
                "state change"
            ),
            Err(err) => warn!(target: "audit", error = %err, "could not serialize snapshot"),
        }
    }
}

pub(crate) fn emit(
    sink: &Arc<dyn AuditSink>,
    stage: PipelineStage,
    phase: SnapshotPhase,
    record: &ApplicationRecord,
) {
    sink.record(StageSnapshot {
        stage,
        phase,
        record: RedactedRecord::from_record(record),
    });
}
