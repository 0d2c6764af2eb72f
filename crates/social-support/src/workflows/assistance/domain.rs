use serde::{Deserialize, Serialize};

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values typed in by the applicant on the intake form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredFields {
    pub identity_number: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub dependents: u32,
    pub monthly_income: f64,
    pub monthly_debt_service: f64,
}

impl DeclaredFields {
    /// Declared amounts must be finite and non-negative.
    pub fn validate(&self) -> Result<(), SubmissionError> {
        for (field, value) in [
            ("monthly_income", self.monthly_income),
            ("monthly_debt_service", self.monthly_debt_service),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(SubmissionError::InvalidAmount { field, value });
            }
        }
        Ok(())
    }
}

/// Submission rejected before any processing starts.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmissionError {
    #[error("{field} must be a finite non-negative amount, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },
}

/// Opaque uploaded document. The payload is never serialized back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub name: String,
    #[serde(skip_serializing, default)]
    pub content: Vec<u8>,
}

impl DocumentHandle {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(name, text.into().into_bytes())
    }
}

/// Supporting material attached to a submission; every document is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportingDocuments {
    pub identity_document: Option<DocumentHandle>,
    pub bank_statement: Option<DocumentHandle>,
    pub resume: Option<DocumentHandle>,
}

/// Everything the applicant hands over in one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSubmission {
    pub declared: DeclaredFields,
    #[serde(default)]
    pub documents: SupportingDocuments,
}

/// Facts recovered from the uploaded documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub identity_number: String,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub monthly_income: f64,
    pub monthly_debt_service: f64,
}

/// Declared/extracted field pairs checked during reconciliation, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchField {
    Name,
    PhoneNumber,
    Address,
    Income,
    LoanAmount,
}

impl MismatchField {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Name,
            Self::PhoneNumber,
            Self::Address,
            Self::Income,
            Self::LoanAmount,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::PhoneNumber => "Phone Number",
            Self::Address => "Address",
            Self::Income => "Income",
            Self::LoanAmount => "Loan Amount",
        }
    }
}

/// Stage of the processing pipeline, published to callers polling a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Extracting,
    Reconciling,
    Validating,
    Evaluating,
    Recommending,
    Done,
    Terminated,
    Failed,
    Cancelled,
}

impl PipelineStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Received => "Application received",
            Self::Extracting => "Extracting documents",
            Self::Reconciling => "Reconciling data",
            Self::Validating => "Validating information",
            Self::Evaluating => "Running eligibility evaluation",
            Self::Recommending => "Generating career recommendations",
            Self::Done => "Processing complete",
            Self::Terminated => "Stopped: documents do not match the application",
            Self::Failed => "Processing error",
            Self::Cancelled => "Processing cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Done | Self::Terminated | Self::Failed | Self::Cancelled
        )
    }

    /// Status implied by the stage; anything before a terminal stage is in progress.
    pub const fn status(self) -> ApplicationStatus {
        match self {
            Self::Done => ApplicationStatus::Completed,
            Self::Terminated => ApplicationStatus::MismatchTerminated,
            Self::Failed => ApplicationStatus::Failed,
            Self::Cancelled => ApplicationStatus::Cancelled,
            _ => ApplicationStatus::InProgress,
        }
    }
}

/// High level status tracked for stored applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    InProgress,
    MismatchTerminated,
    Completed,
    Failed,
    Cancelled,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::MismatchTerminated => "mismatch_terminated",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Failed => "failed",
            ApplicationStatus::Cancelled => "cancelled",
        }
    }
}
