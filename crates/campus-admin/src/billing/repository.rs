use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Discount, EntityId, PaymentConcept, PriceList};
use super::lifecycle::{Transition, WindowedEntity};
use super::receipts::{PaymentReceipt, ReceiptIncludes};
use super::registry::TypeEntry;

/// Storage abstraction for date-windowed entities.
pub trait WindowedRepository<E: WindowedEntity>: Send + Sync {
    fn insert(&self, entity: E) -> Result<E, RepositoryError>;
    fn update(&self, entity: E) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &EntityId) -> Result<Option<E>, RepositoryError>;
    fn list(&self) -> Result<Vec<E>, RepositoryError>;

    /// Applies every transition, in order, inside one storage transaction.
    ///
    /// Each outcome lists the rows the update actually touched. On error no
    /// row may have changed.
    fn apply_transitions(
        &self,
        transitions: &[Transition],
        now: NaiveDate,
    ) -> Result<Vec<TransitionOutcome>, RepositoryError>;
}

/// Rows moved by one transition of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionOutcome {
    pub transition: Transition,
    pub updated: Vec<EntityId>,
}

pub trait ConceptRepository: Send + Sync {
    fn insert_concept(&self, concept: PaymentConcept) -> Result<PaymentConcept, RepositoryError>;
    fn fetch_concept(&self, id: &EntityId) -> Result<Option<PaymentConcept>, RepositoryError>;
    fn list_concepts(&self) -> Result<Vec<PaymentConcept>, RepositoryError>;
}

pub trait ReceiptRepository: Send + Sync {
    fn insert_receipt(&self, receipt: PaymentReceipt) -> Result<PaymentReceipt, RepositoryError>;

    /// Loads the receipt header plus only the relations named in `includes`;
    /// the line vectors of every other relation come back empty.
    fn fetch_receipt(
        &self,
        id: &EntityId,
        includes: &ReceiptIncludes,
    ) -> Result<Option<PaymentReceipt>, RepositoryError>;
}

/// Persisted concept-type table backing the in-process registry snapshot.
pub trait RegistryStore: Send + Sync {
    fn load_types(&self) -> Result<Vec<TypeEntry>, RepositoryError>;

    /// Assigns `max(index) + 1` (0 on an empty table). Returns `None` when the
    /// label already exists.
    fn append_type(&self, label: &str) -> Result<Option<TypeEntry>, RepositoryError>;

    fn set_type_active(&self, index: u32, active: bool) -> Result<(), RepositoryError>;
}

/// Everything the billing service needs from one storage backend.
pub trait BillingStore:
    WindowedRepository<Discount>
    + WindowedRepository<PriceList>
    + ConceptRepository
    + ReceiptRepository
    + RegistryStore
{
}

impl<T> BillingStore for T where
    T: WindowedRepository<Discount>
        + WindowedRepository<PriceList>
        + ConceptRepository
        + ReceiptRepository
        + RegistryStore
{
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
