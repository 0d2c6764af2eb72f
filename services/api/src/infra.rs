use metrics_exporter_prometheus::PrometheusHandle;
use social_support::config::AppConfig;
use social_support::error::AppError;
use social_support::workflows::assistance::{
    ApplicationId, ApplicationLedger, ApplicationRecord, ApplicationRepository,
    ApplicationServiceError, AssistanceApplicationService, CsvApplicationLedger,
    PipelineOrchestrator, RepositoryError,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationRepository {
    records: Arc<Mutex<HashMap<ApplicationId, ApplicationRecord>>>,
}

impl ApplicationRepository for InMemoryApplicationRepository {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.records.lock().map_err(|_| poisoned())?;
        if guard.contains_key(&record.application_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().map_err(|_| poisoned())?;
        Ok(guard.get(id).cloned())
    }

    /// Most recently submitted first.
    fn list(&self, limit: usize) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        let guard = self.records.lock().map_err(|_| poisoned())?;
        let mut records: Vec<ApplicationRecord> = guard.values().cloned().collect();
        records.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.application_id.cmp(&a.application_id))
        });
        records.truncate(limit);
        Ok(records)
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("repository mutex poisoned".to_string())
}

pub(crate) type ApiService = AssistanceApplicationService<InMemoryApplicationRepository>;

/// Service over the in-memory store, with the CSV ledger attached when one is configured.
pub(crate) fn application_service(
    config: &AppConfig,
    orchestrator: PipelineOrchestrator,
) -> Result<ApiService, AppError> {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let service = AssistanceApplicationService::new(Arc::new(orchestrator), repository);

    match &config.storage.ledger_path {
        Some(path) => {
            let ledger = CsvApplicationLedger::open(path).map_err(ApplicationServiceError::from)?;
            info!(path = %ledger.path().display(), "application ledger enabled");
            let ledger: Arc<dyn ApplicationLedger> = Arc::new(ledger);
            Ok(service.with_ledger(ledger))
        }
        None => Ok(service),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use social_support::workflows::assistance::{
        ApplicationSubmission, DeclaredFields, SupportingDocuments,
    };

    fn record(id: &str) -> ApplicationRecord {
        ApplicationRecord::new(
            ApplicationId(id.to_string()),
            ApplicationSubmission {
                declared: DeclaredFields {
                    identity_number: "784-1985-1234567-1".to_string(),
                    name: "Ali Hassan".to_string(),
                    phone: "0501234567".to_string(),
                    address: "Jumeirah 5, Dubai".to_string(),
                    dependents: 2,
                    monthly_income: 3000.0,
                    monthly_debt_service: 0.0,
                },
                documents: SupportingDocuments::default(),
            },
        )
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let repository = InMemoryApplicationRepository::default();
        repository.insert(record("app-000001")).expect("first insert");

        let err = repository
            .insert(record("app-000001"))
            .expect_err("duplicate rejected");
        assert!(matches!(err, RepositoryError::Conflict));
    }

    #[test]
    fn list_honours_limit() {
        let repository = InMemoryApplicationRepository::default();
        for id in ["app-000001", "app-000002", "app-000003"] {
            repository.insert(record(id)).expect("insert");
        }

        let listed = repository.list(2).expect("list");
        assert_eq!(listed.len(), 2);
        assert!(repository
            .fetch(&ApplicationId("app-000003".to_string()))
            .expect("fetch")
            .is_some());
    }
}
