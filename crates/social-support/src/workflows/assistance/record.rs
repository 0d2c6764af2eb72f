use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationId, ApplicationStatus, ApplicationSubmission, DeclaredFields, ExtractedFields,
    MismatchField, SupportingDocuments,
};
use super::eligibility::EligibilityAssessment;
use super::recommendation::RecommendationOutcome;
use super::validation::{CheckKind, CheckState, ValidationReport};

/// Stage-owned slot on the record that may be written at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSlot {
    Extracted,
    Mismatches,
    Validation,
    Eligibility,
    Narrative,
    Recommendations,
}

impl RecordSlot {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Extracted => "extracted fields",
            Self::Mismatches => "mismatch list",
            Self::Validation => "validation outcome",
            Self::Eligibility => "eligibility outcome",
            Self::Narrative => "narrative",
            Self::Recommendations => "recommendations",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("{} was already written for {application_id}", .slot.label())]
    AlreadyWritten {
        application_id: ApplicationId,
        slot: RecordSlot,
    },
}

/// The aggregate threaded through every pipeline stage.
///
/// Declared fields are fixed at creation. Each derived field belongs to one stage and is
/// written through a `with_*` method that returns a new version of the record and refuses a
/// second write to the same field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub submitted_at: DateTime<Utc>,
    pub declared: DeclaredFields,
    pub documents: SupportingDocuments,
    extracted: Option<ExtractedFields>,
    mismatches: Option<Vec<MismatchField>>,
    validation: Option<ValidationReport>,
    eligibility: Option<EligibilityAssessment>,
    narrative: Option<String>,
    recommendations: Option<RecommendationOutcome>,
    pub status: ApplicationStatus,
}

impl ApplicationRecord {
    pub fn new(application_id: ApplicationId, submission: ApplicationSubmission) -> Self {
        Self {
            application_id,
            submitted_at: Utc::now(),
            declared: submission.declared,
            documents: submission.documents,
            extracted: None,
            mismatches: None,
            validation: None,
            eligibility: None,
            narrative: None,
            recommendations: None,
            status: ApplicationStatus::Submitted,
        }
    }

    fn guard<T>(&self, slot: &Option<T>, kind: RecordSlot) -> Result<(), RecordError> {
        if slot.is_some() {
            return Err(RecordError::AlreadyWritten {
                application_id: self.application_id.clone(),
                slot: kind,
            });
        }
        Ok(())
    }

    pub fn with_extracted(&self, extracted: ExtractedFields) -> Result<Self, RecordError> {
        self.guard(&self.extracted, RecordSlot::Extracted)?;
        Ok(Self {
            extracted: Some(extracted),
            ..self.clone()
        })
    }

    pub fn with_mismatches(&self, mismatches: Vec<MismatchField>) -> Result<Self, RecordError> {
        self.guard(&self.mismatches, RecordSlot::Mismatches)?;
        Ok(Self {
            mismatches: Some(mismatches),
            ..self.clone()
        })
    }

    pub fn with_validation(&self, report: ValidationReport) -> Result<Self, RecordError> {
        self.guard(&self.validation, RecordSlot::Validation)?;
        Ok(Self {
            validation: Some(report),
            ..self.clone()
        })
    }

    pub fn with_eligibility(
        &self,
        assessment: EligibilityAssessment,
    ) -> Result<Self, RecordError> {
        self.guard(&self.eligibility, RecordSlot::Eligibility)?;
        Ok(Self {
            eligibility: Some(assessment),
            ..self.clone()
        })
    }

    pub fn with_narrative(&self, narrative: String) -> Result<Self, RecordError> {
        self.guard(&self.narrative, RecordSlot::Narrative)?;
        Ok(Self {
            narrative: Some(narrative),
            ..self.clone()
        })
    }

    pub fn with_recommendations(
        &self,
        outcome: RecommendationOutcome,
    ) -> Result<Self, RecordError> {
        self.guard(&self.recommendations, RecordSlot::Recommendations)?;
        Ok(Self {
            recommendations: Some(outcome),
            ..self.clone()
        })
    }

    pub fn with_status(mut self, status: ApplicationStatus) -> Self {
        self.status = status;
        self
    }

    pub fn extraction_complete(&self) -> bool {
        self.extracted.is_some()
    }

    /// Extracted values; empty strings and zeros until extraction has run.
    pub fn extracted(&self) -> ExtractedFields {
        self.extracted.clone().unwrap_or_default()
    }

    pub fn mismatches(&self) -> Option<&[MismatchField]> {
        self.mismatches.as_deref()
    }

    pub fn validation(&self) -> Option<&ValidationReport> {
        self.validation.as_ref()
    }

    pub fn check_state(&self, kind: CheckKind) -> CheckState {
        match &self.validation {
            None => CheckState::Unknown,
            Some(report) if report.verdict(kind).valid => CheckState::Passed,
            Some(_) => CheckState::Failed,
        }
    }

    pub fn eligibility(&self) -> Option<&EligibilityAssessment> {
        self.eligibility.as_ref()
    }

    pub fn narrative(&self) -> Option<&str> {
        self.narrative.as_deref()
    }

    pub fn recommendations(&self) -> Option<&RecommendationOutcome> {
        self.recommendations.as_ref()
    }

    /// Identity number for storage: the extracted one when present, otherwise the declared one.
    pub fn identity_number(&self) -> &str {
        match &self.extracted {
            Some(extracted) if !extracted.identity_number.is_empty() => &extracted.identity_number,
            _ => &self.declared.identity_number,
        }
    }

    /// User-facing explanation of the current outcome.
    pub fn outcome_message(&self) -> String {
        match self.status {
            ApplicationStatus::MismatchTerminated => {
                let fields: Vec<&str> = self
                    .mismatches()
                    .unwrap_or_default()
                    .iter()
                    .map(|field| field.label())
                    .collect();
                format!(
                    "These fields don't match your documents: {}. Please review them and resubmit.",
                    fields.join(", ")
                )
            }
            ApplicationStatus::Completed => match &self.eligibility {
                Some(assessment) if assessment.eligible() => {
                    "Eligible for financial assistance".to_string()
                }
                Some(EligibilityAssessment::Unavailable { .. }) => {
                    "Eligibility could not be determined".to_string()
                }
                _ => "Not eligible for financial assistance".to_string(),
            },
            ApplicationStatus::Failed => "Processing failed; please try again".to_string(),
            ApplicationStatus::Cancelled => "Processing was cancelled".to_string(),
            ApplicationStatus::Submitted | ApplicationStatus::InProgress => {
                "Pending processing".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::assistance::validation::AuthorityVerdict;

    fn record() -> ApplicationRecord {
        ApplicationRecord::new(
            ApplicationId("app-000042".to_string()),
            ApplicationSubmission {
                declared: DeclaredFields {
                    identity_number: "784-1985-1234567-1".to_string(),
                    name: "Ali Hassan".to_string(),
                    phone: "0501234567".to_string(),
                    address: "Villa 12, Al Barsha, Dubai".to_string(),
                    dependents: 3,
                    monthly_income: 3000.0,
                    monthly_debt_service: 0.0,
                },
                documents: SupportingDocuments::default(),
            },
        )
    }

    #[test]
    fn fresh_record_has_only_declared_fields() {
        let record = record();
        assert!(!record.extraction_complete());
        assert_eq!(record.extracted(), ExtractedFields::default());
        assert!(record.mismatches().is_none());
        assert_eq!(record.check_state(CheckKind::Identity), CheckState::Unknown);
        assert!(record.eligibility().is_none());
        assert_eq!(record.status, ApplicationStatus::Submitted);
    }

    #[test]
    fn second_write_to_a_stage_field_is_rejected() {
        let record = record()
            .with_mismatches(Vec::new())
            .expect("first write succeeds");
        let err = record
            .with_mismatches(vec![MismatchField::Income])
            .expect_err("second write rejected");
        assert_eq!(
            err,
            RecordError::AlreadyWritten {
                application_id: ApplicationId("app-000042".to_string()),
                slot: RecordSlot::Mismatches,
            }
        );
    }

    #[test]
    fn check_state_follows_validation_report() {
        let report = ValidationReport::new(
            AuthorityVerdict::passed("ok", ""),
            AuthorityVerdict::failed("Bank validation failed", ""),
            AuthorityVerdict::passed("ok", ""),
        );
        let record = record().with_validation(report).expect("validation written");
        assert_eq!(record.check_state(CheckKind::Identity), CheckState::Passed);
        assert_eq!(record.check_state(CheckKind::Financial), CheckState::Failed);
    }

    #[test]
    fn identity_number_prefers_extracted_value() {
        let record = record();
        assert_eq!(record.identity_number(), "784-1985-1234567-1");
        let record = record
            .with_extracted(ExtractedFields {
                identity_number: "784198512345671".to_string(),
                ..ExtractedFields::default()
            })
            .expect("extracted written");
        assert_eq!(record.identity_number(), "784198512345671");
    }

    #[test]
    fn mismatch_message_lists_fields() {
        let record = record()
            .with_mismatches(vec![MismatchField::Name, MismatchField::Income])
            .expect("mismatches written")
            .with_status(ApplicationStatus::MismatchTerminated);
        assert!(record.outcome_message().contains("Name, Income"));
    }
}
