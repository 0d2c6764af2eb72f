use crate::infra::application_service;
use clap::Args;
use social_support::config::AppConfig;
use social_support::error::AppError;
use social_support::workflows::assistance::audit::{
    redact_address, redact_identifier, redact_name,
};
use social_support::workflows::assistance::{
    ApplicationRecord, ApplicationRequest, ApplicationServiceError, CheckKind, ComparisonOutcome,
    FieldComparison, MismatchField, ReconciliationEngine,
};
use social_support::{build_orchestrator, telemetry};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub(crate) struct ProcessArgs {
    /// JSON file with the declared form fields (documents may also be inlined)
    #[arg(long)]
    pub(crate) application: PathBuf,
    /// Identity document as plain text
    #[arg(long)]
    pub(crate) identity_document: Option<PathBuf>,
    /// Bank statement export (CSV)
    #[arg(long)]
    pub(crate) bank_statement: Option<PathBuf>,
    /// Resume as plain text
    #[arg(long)]
    pub(crate) resume: Option<PathBuf>,
}

pub(crate) async fn run_process(args: ProcessArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let request = load_request(&args)?;
    let orchestrator = build_orchestrator(&config)?;
    let engine = *orchestrator.reconciliation();
    let service = application_service(&config, orchestrator)?;

    match service.process(request.into_submission()).await {
        Ok(record) => {
            let comparisons = engine.compare(&record.declared, &record.extracted());
            print!("{}", render_outcome(&record, &comparisons));
            Ok(())
        }
        Err(ApplicationServiceError::Pipeline(failure)) => {
            print!("{}", render_outcome(&failure.record, &[]));
            Err(ApplicationServiceError::Pipeline(failure).into())
        }
        Err(err) => Err(err.into()),
    }
}

fn load_request(args: &ProcessArgs) -> Result<ApplicationRequest, AppError> {
    let raw = std::fs::read(&args.application)?;
    let mut request: ApplicationRequest =
        serde_json::from_slice(&raw).map_err(std::io::Error::from)?;

    if let Some(path) = &args.identity_document {
        request.identity_document = Some(read_text(path)?);
    }
    if let Some(path) = &args.bank_statement {
        request.bank_statement_csv = Some(read_text(path)?);
    }
    if let Some(path) = &args.resume {
        request.resume_text = Some(read_text(path)?);
    }
    Ok(request)
}

fn read_text(path: &Path) -> Result<String, AppError> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn masked(field: MismatchField, value: &str) -> String {
    match field {
        MismatchField::Name => redact_name(value),
        MismatchField::PhoneNumber => redact_identifier(value),
        MismatchField::Address => redact_address(value),
        MismatchField::Income | MismatchField::LoanAmount => value.to_string(),
    }
}

fn outcome_label(outcome: ComparisonOutcome) -> &'static str {
    match outcome {
        ComparisonOutcome::Match => "match",
        ComparisonOutcome::Mismatch => "MISMATCH",
        ComparisonOutcome::Skipped => "skipped",
    }
}

/// Plain-text summary with personal values masked.
pub(crate) fn render_outcome(record: &ApplicationRecord, comparisons: &[FieldComparison]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Application {} ({})",
        record.application_id.0,
        record.status.label()
    );
    let _ = writeln!(
        out,
        "Applicant {} | ID {}",
        redact_name(&record.declared.name),
        redact_identifier(&record.declared.identity_number)
    );
    let _ = writeln!(out, "{}", record.outcome_message());

    if !comparisons.is_empty() {
        let _ = writeln!(out, "\nReconciliation");
        let _ = writeln!(
            out,
            "  {:<14} {:<20} {:<20} {}",
            "Field", "Declared", "Extracted", "Result"
        );
        for row in comparisons {
            let _ = writeln!(
                out,
                "  {:<14} {:<20} {:<20} {}",
                row.field.label(),
                masked(row.field, &row.declared),
                masked(row.field, &row.extracted),
                outcome_label(row.outcome)
            );
        }
    }

    if let Some(report) = record.validation() {
        let _ = writeln!(out, "\nValidation");
        for kind in [CheckKind::Identity, CheckKind::Financial, CheckKind::Credit] {
            let verdict = report.verdict(kind);
            let mark = if verdict.valid { "pass" } else { "FAIL" };
            let _ = writeln!(out, "  {:<10} {mark} {}", kind.label(), verdict.message);
        }
    }

    if let Some(assessment) = record.eligibility() {
        let _ = writeln!(out, "\nEligibility: {}", assessment.status_label());
        if let Some(score) = assessment.score() {
            let decision = if score.eligible { "eligible" } else { "not eligible" };
            let _ = writeln!(
                out,
                "  {decision} (confidence {:.1}%, model {})",
                score.confidence * 100.0,
                score.model_version
            );
            for (feature, contribution) in score.top_factors(3) {
                let _ = writeln!(out, "  {:<22} {contribution:+.3}", feature.label());
            }
        }
    }

    if let Some(outcome) = record.recommendations() {
        let _ = writeln!(out, "\nRecommendations: {}", outcome.status.label());
        for suggestion in &outcome.suggestions {
            let _ = writeln!(out, "  - {suggestion}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use social_support::workflows::assistance::{
        ApplicationId, ApplicationSubmission, DeclaredFields, ExtractedFields,
        SupportingDocuments,
    };

    fn mismatched_record() -> ApplicationRecord {
        let declared = DeclaredFields {
            identity_number: "784-1985-1234567-1".to_string(),
            name: "Ali Hassan".to_string(),
            phone: "0501234567".to_string(),
            address: "Jumeirah 5, Dubai".to_string(),
            dependents: 3,
            monthly_income: 4000.0,
            monthly_debt_service: 0.0,
        };
        ApplicationRecord::new(
            ApplicationId("app-000042".to_string()),
            ApplicationSubmission {
                declared,
                documents: SupportingDocuments::default(),
            },
        )
    }

    #[test]
    fn summary_masks_personal_values() {
        let record = mismatched_record();
        let extracted = ExtractedFields {
            name: "ali hassan".to_string(),
            monthly_income: 4600.0,
            ..ExtractedFields::default()
        };
        let comparisons = ReconciliationEngine::default().compare(&record.declared, &extracted);

        let rendered = render_outcome(&record, &comparisons);

        assert!(rendered.contains("app-000042"));
        assert!(rendered.contains("A***"));
        assert!(rendered.contains("784..."));
        assert!(!rendered.contains("Ali Hassan"));
        assert!(!rendered.contains("1234567"));
        assert!(rendered.contains("MISMATCH"));
        assert_eq!(comparisons.len(), 5);
    }

    #[test]
    fn request_file_accepts_inline_documents() {
        let dir = std::env::temp_dir().join(format!("process-args-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let form = dir.join("form.json");
        let statement = dir.join("statement.csv");
        std::fs::write(
            &form,
            r#"{"identity_number":"784-1985-1234567-1","name":"Ali Hassan","phone":"0501234567",
                "address":"Jumeirah 5, Dubai","dependents":3,"monthly_income":3000,
                "monthly_debt_service":0,"resume_text":"Skills\nExcel\n"}"#,
        )
        .expect("form written");
        std::fs::write(&statement, "a\nb\nc\nd\ne\nf\nDate,Description,Income\n")
            .expect("statement written");

        let request = load_request(&ProcessArgs {
            application: form,
            identity_document: None,
            bank_statement: Some(statement),
            resume: None,
        })
        .expect("request loads");

        assert_eq!(request.declared.dependents, 3);
        assert!(request.resume_text.is_some());
        assert!(request
            .bank_statement_csv
            .as_deref()
            .is_some_and(|text| text.contains("Description")));
        let _ = std::fs::remove_dir_all(dir);
    }
}
