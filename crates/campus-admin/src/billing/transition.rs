use std::marker::PhantomData;
use std::sync::{Arc, Mutex, TryLockError};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use super::lifecycle::{EntityKind, Transition, WindowedEntity};
use super::repository::{RepositoryError, TransitionOutcome, WindowedRepository};

/// Counts produced by one daily run for one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub kind: EntityKind,
    pub evaluated_on: NaiveDate,
    pub activated: usize,
    pub inactivated: usize,
    /// Set when another run of the same kind was already in flight.
    pub skipped: bool,
}

impl TransitionReport {
    fn from_outcomes(kind: EntityKind, evaluated_on: NaiveDate, outcomes: &[TransitionOutcome]) -> Self {
        let count = |wanted: Transition| -> usize {
            outcomes
                .iter()
                .filter(|outcome| outcome.transition == wanted)
                .map(|outcome| outcome.updated.len())
                .sum()
        };

        Self {
            kind,
            evaluated_on,
            activated: count(Transition::Activate),
            inactivated: count(Transition::Expire),
            skipped: false,
        }
    }

    fn skipped(kind: EntityKind, evaluated_on: NaiveDate) -> Self {
        Self {
            kind,
            evaluated_on,
            activated: 0,
            inactivated: 0,
            skipped: true,
        }
    }

    pub fn writes(&self) -> usize {
        self.activated + self.inactivated
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("{kind} transition failed: {source}")]
    Repository {
        kind: EntityKind,
        #[source]
        source: RepositoryError,
    },
}

impl TransitionError {
    pub fn kind(&self) -> EntityKind {
        match self {
            TransitionError::Repository { kind, .. } => *kind,
        }
    }
}

/// Daily batch job flipping Approved→Active and Active→Inactive for one kind.
///
/// The repository applies both flips in one transaction, so a failed run
/// leaves every row untouched and the reported counts are the rows the
/// updates actually wrote.
pub struct WindowTransitioner<E, R> {
    repository: Arc<R>,
    in_flight: Mutex<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, R> WindowTransitioner<E, R>
where
    E: WindowedEntity,
    R: WindowedRepository<E>,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            in_flight: Mutex::new(()),
            _entity: PhantomData,
        }
    }

    pub fn kind(&self) -> EntityKind {
        E::KIND
    }

    pub fn run_daily(&self, now: NaiveDate) -> Result<TransitionReport, TransitionError> {
        let _in_flight = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!(kind = %E::KIND, %now, "transition already running, skipping");
                return Ok(TransitionReport::skipped(E::KIND, now));
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let outcomes = self
            .repository
            .apply_transitions(&Transition::DAILY, now)
            .map_err(|source| {
                error!(kind = %E::KIND, %now, error = %source, "transition run aborted");
                TransitionError::Repository {
                    kind: E::KIND,
                    source,
                }
            })?;

        let report = TransitionReport::from_outcomes(E::KIND, now, &outcomes);
        info!(
            kind = %E::KIND,
            %now,
            activated = report.activated,
            inactivated = report.inactivated,
            "transition run complete"
        );
        Ok(report)
    }
}
