use crate::cli::StoreArgs;
use crate::infra::load_config;
use campus_admin::billing::{BillingService, BillingStore, EntityKind, Locale};
use campus_admin::config::StorageConfig;
use campus_admin::error::AppError;
use campus_admin::storage::{MemoryStore, SqliteStore};
use campus_admin::telemetry;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::warn;

/// One-shot maintenance work launched from the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Job {
    Transition {
        kind: EntityKind,
        today: Option<NaiveDate>,
    },
    ListTypes,
    AppendType(String),
    DeactivateType(u32),
}

pub(crate) fn run(job: Job, store: StoreArgs) -> Result<(), AppError> {
    let config = load_config(store.database)?;
    telemetry::init(&config.telemetry)?;

    let lines = match &config.storage {
        StorageConfig::Memory => {
            warn!("running a maintenance job against in-memory storage; nothing will persist");
            job.execute(Arc::new(MemoryStore::new()), config.locale)?
        }
        StorageConfig::Sqlite { path } => {
            job.execute(Arc::new(SqliteStore::open(path)?), config.locale)?
        }
    };

    for line in lines {
        println!("{line}");
    }
    Ok(())
}

impl Job {
    /// Runs the job and returns the lines to print.
    pub(crate) fn execute<S>(self, store: Arc<S>, locale: Locale) -> Result<Vec<String>, AppError>
    where
        S: BillingStore + 'static,
    {
        let service = BillingService::new(store, locale)?;

        match self {
            Job::Transition { kind, today } => {
                let today = today.unwrap_or_else(|| Local::now().date_naive());
                let report = service.run_transition(kind, today)?;
                let mut line = format!(
                    "{} {}: activated {}, inactivated {}",
                    report.kind, report.evaluated_on, report.activated, report.inactivated
                );
                if report.skipped {
                    line.push_str(" (skipped: another run in progress)");
                }
                Ok(vec![line])
            }
            Job::ListTypes => Ok(service
                .concept_types()
                .into_iter()
                .map(|entry| {
                    let marker = if entry.active { "" } else { " (inactive)" };
                    format!("{:>3}  {}{marker}", entry.index, entry.label)
                })
                .collect()),
            Job::AppendType(label) => {
                let entry = service.append_concept_type(&label)?;
                Ok(vec![format!("{:>3}  {}", entry.index, entry.label)])
            }
            Job::DeactivateType(index) => {
                service.set_concept_type_active(index, false)?;
                Ok(vec![format!("{index:>3}  deactivated")])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_admin::billing::{
        Discount, DiscountAmount, DiscountStatus, ServiceError, Window, WindowedRepository,
    };
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn transition_job_reports_counts() {
        let store = Arc::new(MemoryStore::new());
        let mut discount = Discount::propose(
            "Convenio",
            DiscountAmount::Valor(dec!(50000)),
            Window::open_ended(date(2024, 1, 1)),
        );
        discount.approve().expect("approves");
        WindowedRepository::<Discount>::insert(&*store, discount.clone()).expect("insert");

        let lines = Job::Transition {
            kind: EntityKind::Discount,
            today: Some(date(2024, 1, 2)),
        }
        .execute(store.clone(), Locale::Es)
        .expect("job runs");

        assert_eq!(lines, vec!["discounts 2024-01-02: activated 1, inactivated 0"]);
        let stored = WindowedRepository::<Discount>::fetch(&*store, &discount.id)
            .expect("fetch")
            .expect("present");
        assert_eq!(stored.status, DiscountStatus::Active);
    }

    #[test]
    fn concept_type_jobs_list_append_and_deactivate() {
        let store = Arc::new(MemoryStore::new());

        let appended = Job::AppendType("Becas".to_string())
            .execute(store.clone(), Locale::Es)
            .expect("append runs");
        assert_eq!(appended, vec!["  6  Becas"]);

        Job::DeactivateType(6)
            .execute(store.clone(), Locale::Es)
            .expect("deactivate runs");

        let listed = Job::ListTypes
            .execute(store.clone(), Locale::Es)
            .expect("list runs");
        assert_eq!(listed.len(), 7);
        assert_eq!(listed[0], "  0  Cartera");
        assert_eq!(listed[6], "  6  Becas (inactive)");

        let duplicate = Job::AppendType("Cartera".to_string()).execute(store, Locale::Es);
        assert!(matches!(
            duplicate,
            Err(AppError::Service(ServiceError::DuplicateType(_)))
        ));
    }
}
