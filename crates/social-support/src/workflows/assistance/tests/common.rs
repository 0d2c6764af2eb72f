use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::assistance::audit::{AuditSink, StageSnapshot};
use crate::workflows::assistance::domain::{
    ApplicationId, ApplicationSubmission, DeclaredFields, DocumentHandle, SupportingDocuments,
};
use crate::workflows::assistance::eligibility::{
    EligibilityInput, EligibilityScore, EligibilityScorer, EligibilityScoring, ScoringError,
    DEFAULT_ELIGIBILITY_CUTOFF,
};
use crate::workflows::assistance::generation::{GenerationError, TextGenerator};
use crate::workflows::assistance::orchestrator::PipelineOrchestrator;
use crate::workflows::assistance::record::ApplicationRecord;
use crate::workflows::assistance::repository::{ApplicationRepository, RepositoryError};
use crate::workflows::assistance::service::AssistanceApplicationService;
use crate::workflows::assistance::validation::{
    Authority, AuthorityError, AuthorityVerdict, ValidationCoordinator, ValidationRequest,
};

pub(super) const IDENTITY_NUMBER: &str = "784-1985-1234567-1";

const STATEMENT_PREAMBLE: &str = "Emirates NBD\nAccount Holder,Ali Hassan\n\
                                  Account Number,1012345678\nCurrency,AED\n\
                                  Period,2024-01-01 to 2024-02-29\nGenerated,2024-03-02\n";

pub(super) fn declared(monthly_income: f64, monthly_debt_service: f64) -> DeclaredFields {
    DeclaredFields {
        identity_number: IDENTITY_NUMBER.to_string(),
        name: "Ali Hassan".to_string(),
        phone: "0501234567".to_string(),
        address: "Jumeirah 5, Dubai".to_string(),
        dependents: 3,
        monthly_income,
        monthly_debt_service,
    }
}

pub(super) fn identity_document() -> DocumentHandle {
    DocumentHandle::from_text(
        "emirates_id.txt",
        "UNITED ARAB EMIRATES\n\
         Emirates Id: 784-1985-1234567-1\n\
         Name: ali hassan\n\
         Address: Jumeirah 5 Dubai\n\
         Phone: 050 123 4567\n",
    )
}

/// Two months of identical salary credits and installments.
pub(super) fn bank_statement(salary: f64, installment: f64) -> DocumentHandle {
    let mut csv = format!(
        "{STATEMENT_PREAMBLE}Txn Date,Description,Income (AED),Expenditure (AED),Balance\n"
    );
    for month in ["01", "02"] {
        csv.push_str(&format!("2024-{month}-25,Salary ACME LLC,{salary},,0\n"));
        if installment > 0.0 {
            csv.push_str(&format!("2024-{month}-05,Car Loan EMI,,{installment},0\n"));
        }
    }
    DocumentHandle::from_text("statement.csv", csv)
}

pub(super) fn resume() -> DocumentHandle {
    DocumentHandle::from_text(
        "resume.txt",
        "Ali Hassan\n\nSkills\nBookkeeping, Excel, Customer service\n\n\
         Experience\nCashier, Carrefour Mall of the Emirates (2019-2023)\n\n\
         Education\nDiploma in Accounting\n",
    )
}

/// Income 3000, installments 6000, three dependents: scored eligible by the bundled model.
pub(super) fn eligible_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        declared: declared(3000.0, 6000.0),
        documents: SupportingDocuments {
            identity_document: Some(identity_document()),
            bank_statement: Some(bank_statement(3000.0, 6000.0)),
            resume: Some(resume()),
        },
    }
}

/// Income 3000, no installments, three dependents: scored not eligible by the bundled model.
pub(super) fn ineligible_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        declared: declared(3000.0, 0.0),
        documents: SupportingDocuments {
            identity_document: Some(identity_document()),
            bank_statement: Some(bank_statement(3000.0, 0.0)),
            resume: Some(resume()),
        },
    }
}

/// Declared income 4000 against a 4600 salary in the statement.
pub(super) fn mismatched_submission() -> ApplicationSubmission {
    ApplicationSubmission {
        declared: declared(4000.0, 0.0),
        documents: SupportingDocuments {
            identity_document: Some(identity_document()),
            bank_statement: Some(bank_statement(4600.0, 0.0)),
            resume: None,
        },
    }
}

pub(super) fn bundled_scorer() -> Arc<EligibilityScorer> {
    static SCORER: OnceLock<Arc<EligibilityScorer>> = OnceLock::new();
    SCORER
        .get_or_init(|| {
            let path = concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/../../models/eligibility_model.json"
            );
            Arc::new(
                EligibilityScorer::load(path, DEFAULT_ELIGIBILITY_CUTOFF)
                    .expect("bundled model loads"),
            )
        })
        .clone()
}

/// Scorer double that counts calls before delegating.
#[derive(Default)]
pub(super) struct CountingScorer {
    pub(super) calls: AtomicUsize,
    inner: Option<Arc<EligibilityScorer>>,
}

impl CountingScorer {
    pub(super) fn bundled() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            inner: Some(bundled_scorer()),
        }
    }

    pub(super) fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EligibilityScoring for CountingScorer {
    fn score(&self, input: &EligibilityInput) -> Result<EligibilityScore, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(scorer) => scorer.score(input),
            None => Err(ScoringError::NonFinite),
        }
    }
}

/// Authority double that records every request and returns a fixed verdict.
pub(super) struct CountingAuthority {
    calls: AtomicUsize,
    valid: bool,
}

impl CountingAuthority {
    pub(super) fn passing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            valid: true,
        })
    }

    pub(super) fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            valid: false,
        })
    }

    pub(super) fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authority for CountingAuthority {
    async fn verify(&self, _request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(if self.valid {
            AuthorityVerdict::passed("ok", "")
        } else {
            AuthorityVerdict::failed("rejected", "")
        })
    }
}

/// Authority that never answers within a test's lifetime.
pub(super) struct StalledAuthority;

#[async_trait]
impl Authority for StalledAuthority {
    async fn verify(&self, _request: &ValidationRequest) -> Result<AuthorityVerdict, AuthorityError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(AuthorityVerdict::passed("late", ""))
    }
}

pub(super) fn coordinator(
    identity: Arc<dyn Authority>,
    financial: Arc<dyn Authority>,
    credit: Arc<dyn Authority>,
) -> ValidationCoordinator {
    ValidationCoordinator::new(identity, financial, credit, Duration::from_secs(1))
}

/// Text generator returning a canned reply and remembering prompts.
#[derive(Default)]
pub(super) struct ScriptedGenerator {
    reply: String,
    pub(super) prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub(super) fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub(super) fn prompt_count(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
pub(super) struct RecordingAudit {
    snapshots: Mutex<Vec<StageSnapshot>>,
}

impl RecordingAudit {
    pub(super) fn snapshots(&self) -> Vec<StageSnapshot> {
        self.snapshots.lock().expect("audit lock").clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, snapshot: StageSnapshot) {
        self.snapshots.lock().expect("audit lock").push(snapshot);
    }
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    records: Mutex<HashMap<ApplicationId, ApplicationRecord>>,
}

impl MemoryRepository {
    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("repository lock").len()
    }
}

impl ApplicationRepository for MemoryRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut records = self.records.lock().expect("repository lock");
        if records.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        records.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Ok(self.records.lock().expect("repository lock").get(id).cloned())
    }

    fn list(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let records = self.records.lock().expect("repository lock");
        let mut all: Vec<ApplicationRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| a.application_id.cmp(&b.application_id));
        all.truncate(limit);
        Ok(all)
    }
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(&self, _limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn orchestrator() -> PipelineOrchestrator {
    PipelineOrchestrator::new(bundled_scorer())
}

pub(super) fn build_service(
    orchestrator: PipelineOrchestrator,
) -> (
    Arc<AssistanceApplicationService<MemoryRepository>>,
    Arc<MemoryRepository>,
) {
    let repository = Arc::new(MemoryRepository::default());
    let service = AssistanceApplicationService::new(Arc::new(orchestrator), repository.clone());
    (Arc::new(service), repository)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
