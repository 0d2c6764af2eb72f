use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationId, MismatchField};
use super::eligibility::EligibilityAssessment;
use super::record::ApplicationRecord;
use super::recommendation::RecommendationOutcome;
use super::validation::ValidationReport;

impl ApplicationRecord {
    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application_id.clone(),
            status: self.status.label(),
            stage: None,
            message: self.outcome_message(),
            eligible: self.eligibility().map(EligibilityAssessment::eligible),
            confidence: self.eligibility().and_then(EligibilityAssessment::confidence),
        }
    }

    /// Full outcome for API responses. Personal values are limited to what the applicant
    /// submitted; document payloads are never included.
    pub fn outcome_view(&self) -> ApplicationOutcomeView {
        ApplicationOutcomeView {
            status: self.status_view(),
            mismatches: self
                .mismatches()
                .map(|fields| fields.iter().map(|field| field.label()).collect())
                .unwrap_or_default(),
            mismatch_fields: self.mismatches().map(<[MismatchField]>::to_vec),
            validation: self.validation().cloned(),
            eligibility: self.eligibility().cloned(),
            narrative: self.narrative().map(str::to_string),
            recommendations: self.recommendations().cloned(),
        }
    }

    pub fn ledger_row(&self) -> LedgerRow {
        let extracted = self.extracted();
        LedgerRow {
            identity_number: self.identity_number().to_string(),
            name: self.declared.name.clone(),
            phone: self.declared.phone.clone(),
            address: self.declared.address.clone(),
            dependents: self.declared.dependents,
            submitted_income: self.declared.monthly_income,
            submitted_loans: self.declared.monthly_debt_service,
            extracted_income: extracted.monthly_income,
            extracted_loans: extracted.monthly_debt_service,
        }
    }
}

/// Storage abstraction so the service can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn list(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Compact status exposed while polling.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<&'static str>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationOutcomeView {
    #[serde(flatten)]
    pub status: ApplicationStatusView,
    pub mismatches: Vec<&'static str>,
    #[serde(skip)]
    pub mismatch_fields: Option<Vec<MismatchField>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<EligibilityAssessment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<RecommendationOutcome>,
}

/// One row per processed application, in ledger column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub identity_number: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub dependents: u32,
    pub submitted_income: f64,
    pub submitted_loans: f64,
    pub extracted_income: f64,
    pub extracted_loans: f64,
}

/// Append-only sink for processed applications.
pub trait ApplicationLedger: Send + Sync {
    fn append(&self, row: &LedgerRow) -> Result<(), RepositoryError>;
}

/// Ledger backed by a CSV file; the header is written only when the file is new or empty.
pub struct CsvApplicationLedger {
    path: PathBuf,
    writer: Mutex<csv::Writer<BufWriter<File>>>,
}

impl CsvApplicationLedger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(unavailable)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(unavailable)?;
        let has_content = file.metadata().map_err(unavailable)?.len() > 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(!has_content)
            .from_writer(BufWriter::new(file));

        Ok(Self {
            path,
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ApplicationLedger for CsvApplicationLedger {
    fn append(&self, row: &LedgerRow) -> Result<(), RepositoryError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| RepositoryError::Unavailable("ledger lock poisoned".to_string()))?;
        writer.serialize(row).map_err(unavailable)?;
        writer.flush().map_err(unavailable)
    }
}

fn unavailable(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Unavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(identity: &str) -> LedgerRow {
        LedgerRow {
            identity_number: identity.to_string(),
            name: "Ali Hassan".to_string(),
            phone: "0501234567".to_string(),
            address: "Villa 12, Al Barsha, Dubai".to_string(),
            dependents: 3,
            submitted_income: 3000.0,
            submitted_loans: 0.0,
            extracted_income: 3050.0,
            extracted_loans: 0.0,
        }
    }

    #[test]
    fn ledger_writes_header_once_across_reopens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ledger").join("applications.csv");

        let ledger = CsvApplicationLedger::open(&path).expect("ledger opens");
        ledger.append(&row("784198512345671")).expect("first row");
        drop(ledger);

        let ledger = CsvApplicationLedger::open(&path).expect("ledger reopens");
        ledger.append(&row("784199012345672")).expect("second row");

        let contents = std::fs::read_to_string(&path).expect("ledger readable");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("identity_number,name,phone,address,dependents"));
        assert_eq!(
            contents.matches("identity_number").count(),
            1,
            "header repeated: {contents}"
        );

        let mut reader = csv::Reader::from_path(&path).expect("csv reader");
        let rows: Vec<LedgerRow> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .expect("rows deserialize");
        assert_eq!(rows[1].identity_number, "784199012345672");
        assert_eq!(rows[0].extracted_income, 3050.0);
    }
}
