//! Document extraction: identity document text and bank statement CSV to structured fields.
//!
//! Extraction never fails. A document that cannot be read degrades only its own fields to
//! empty strings or zero and the problem is logged.

mod identity;
mod statement;

pub use identity::{parse_identity_text, IdentityFields};
pub use statement::{
    summarize_statement, StatementError, StatementSummary, STATEMENT_METADATA_ROWS,
};

use tracing::{info, warn};

use super::domain::{DocumentHandle, ExtractedFields};

/// Seam for the extraction stage so the orchestrator can run alternative parsers.
pub trait DocumentExtractor: Send + Sync {
    fn extract(
        &self,
        identity_document: Option<&DocumentHandle>,
        identity_number_fallback: &str,
        bank_statement: Option<&DocumentHandle>,
    ) -> ExtractedFields;
}

/// Parses UTF-8 identity text and CSV bank statements.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionAdapter;

impl ExtractionAdapter {
    pub fn new() -> Self {
        Self
    }

    fn identity_fields(&self, document: &DocumentHandle) -> IdentityFields {
        match std::str::from_utf8(&document.content) {
            Ok(text) => parse_identity_text(text),
            Err(err) => {
                warn!(
                    document = %document.name,
                    error = %err,
                    "identity document is not UTF-8 text"
                );
                IdentityFields::default()
            }
        }
    }

    fn statement_summary(&self, document: &DocumentHandle) -> StatementSummary {
        match summarize_statement(document.content.as_slice()) {
            Ok(summary) => summary,
            Err(err) => {
                warn!(
                    document = %document.name,
                    error = %err,
                    "could not summarize bank statement"
                );
                StatementSummary::default()
            }
        }
    }
}

impl DocumentExtractor for ExtractionAdapter {
    fn extract(
        &self,
        identity_document: Option<&DocumentHandle>,
        identity_number_fallback: &str,
        bank_statement: Option<&DocumentHandle>,
    ) -> ExtractedFields {
        let identity = match identity_document {
            Some(document) => self.identity_fields(document),
            None => IdentityFields {
                identity_number: Some(identity_number_fallback.to_string()),
                ..IdentityFields::default()
            },
        };

        let statement = bank_statement
            .map(|document| self.statement_summary(document))
            .unwrap_or_default();

        info!(
            identity_document = identity_document.is_some(),
            bank_statement = bank_statement.is_some(),
            salary_months = statement.salary_months,
            installment_months = statement.installment_months,
            "document extraction finished"
        );

        ExtractedFields {
            identity_number: identity.identity_number.unwrap_or_default(),
            name: identity.name,
            address: identity.address,
            phone: identity.phone,
            monthly_income: statement.monthly_income,
            monthly_debt_service: statement.monthly_debt_service,
        }
    }
}
