use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::billing::domain::{Discount, EntityId, PaymentConcept, PriceList};
use crate::billing::lifecycle::{Transition, WindowedEntity};
use crate::billing::receipts::{PaymentReceipt, ReceiptIncludes};
use crate::billing::registry::TypeEntry;
use crate::billing::repository::{
    ConceptRepository, ReceiptRepository, RegistryStore, RepositoryError, TransitionOutcome,
    WindowedRepository,
};

type Table<E> = Mutex<BTreeMap<EntityId, E>>;

/// Mutex-guarded maps. Every operation holds its table lock for its whole
/// duration, so a batch transition is atomic with respect to other callers.
#[derive(Default)]
pub struct MemoryStore {
    discounts: Table<Discount>,
    price_lists: Table<PriceList>,
    concepts: Table<PaymentConcept>,
    receipts: Table<PaymentReceipt>,
    types: Mutex<BTreeMap<u32, TypeEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Picks the map holding a given windowed entity.
pub trait WindowedTable<E> {
    fn table(&self) -> &Table<E>;
}

impl WindowedTable<Discount> for MemoryStore {
    fn table(&self) -> &Table<Discount> {
        &self.discounts
    }
}

impl WindowedTable<PriceList> for MemoryStore {
    fn table(&self) -> &Table<PriceList> {
        &self.price_lists
    }
}

impl<E> WindowedRepository<E> for MemoryStore
where
    E: WindowedEntity,
    MemoryStore: WindowedTable<E>,
{
    fn insert(&self, entity: E) -> Result<E, RepositoryError> {
        let mut guard = self.table().lock().expect("store mutex poisoned");
        if guard.contains_key(entity.id()) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    fn update(&self, entity: E) -> Result<(), RepositoryError> {
        let mut guard = self.table().lock().expect("store mutex poisoned");
        match guard.get_mut(entity.id()) {
            Some(slot) => {
                *slot = entity;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<E>, RepositoryError> {
        let guard = self.table().lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        let guard = self.table().lock().expect("store mutex poisoned");
        let mut entities: Vec<E> = guard.values().cloned().collect();
        entities.sort_by(|a, b| {
            a.window()
                .fecha_inicio
                .cmp(&b.window().fecha_inicio)
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(entities)
    }

    fn apply_transitions(
        &self,
        transitions: &[Transition],
        now: NaiveDate,
    ) -> Result<Vec<TransitionOutcome>, RepositoryError> {
        let mut guard = self.table().lock().expect("store mutex poisoned");
        let mut outcomes = Vec::with_capacity(transitions.len());

        for &transition in transitions {
            let mut updated = Vec::new();
            for entity in guard.values_mut() {
                if transition.matches(entity.status(), entity.window(), now) {
                    entity.set_status(transition.target());
                    updated.push(entity.id().clone());
                }
            }
            outcomes.push(TransitionOutcome {
                transition,
                updated,
            });
        }

        Ok(outcomes)
    }
}

impl ConceptRepository for MemoryStore {
    fn insert_concept(&self, concept: PaymentConcept) -> Result<PaymentConcept, RepositoryError> {
        let mut guard = self.concepts.lock().expect("store mutex poisoned");
        if guard.contains_key(&concept.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(concept.id.clone(), concept.clone());
        Ok(concept)
    }

    fn fetch_concept(&self, id: &EntityId) -> Result<Option<PaymentConcept>, RepositoryError> {
        let guard = self.concepts.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn list_concepts(&self) -> Result<Vec<PaymentConcept>, RepositoryError> {
        let guard = self.concepts.lock().expect("store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }
}

impl ReceiptRepository for MemoryStore {
    fn insert_receipt(&self, receipt: PaymentReceipt) -> Result<PaymentReceipt, RepositoryError> {
        let mut guard = self.receipts.lock().expect("store mutex poisoned");
        let duplicate = guard.contains_key(&receipt.id)
            || guard.values().any(|stored| stored.numero == receipt.numero);
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(receipt.id.clone(), receipt.clone());
        Ok(receipt)
    }

    fn fetch_receipt(
        &self,
        id: &EntityId,
        includes: &ReceiptIncludes,
    ) -> Result<Option<PaymentReceipt>, RepositoryError> {
        let guard = self.receipts.lock().expect("store mutex poisoned");
        Ok(guard.get(id).cloned().map(|mut receipt| {
            receipt.retain_relations(includes);
            receipt
        }))
    }
}

impl RegistryStore for MemoryStore {
    fn load_types(&self) -> Result<Vec<TypeEntry>, RepositoryError> {
        let guard = self.types.lock().expect("store mutex poisoned");
        Ok(guard.values().cloned().collect())
    }

    fn append_type(&self, label: &str) -> Result<Option<TypeEntry>, RepositoryError> {
        let mut guard = self.types.lock().expect("store mutex poisoned");
        if guard.values().any(|entry| entry.label == label) {
            return Ok(None);
        }

        let index = guard
            .keys()
            .next_back()
            .map_or(0, |max| max.saturating_add(1));
        let entry = TypeEntry {
            index,
            label: label.to_string(),
            active: true,
        };
        guard.insert(index, entry.clone());
        Ok(Some(entry))
    }

    fn set_type_active(&self, index: u32, active: bool) -> Result<(), RepositoryError> {
        let mut guard = self.types.lock().expect("store mutex poisoned");
        match guard.get_mut(&index) {
            Some(entry) => {
                entry.active = active;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }
}
