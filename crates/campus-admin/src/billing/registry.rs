//! Payment-concept type registry.
//!
//! Concept rows persist an integer `tipo`; the registry maps those indices to
//! display labels. The table lives in storage and each process serves lookups
//! from an immutable snapshot that is swapped wholesale after an append or an
//! explicit refresh. Indices are only ever appended, never removed or
//! renumbered.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::repository::{RegistryStore, RepositoryError};

/// Seed written to an empty table; position is the index.
pub const DEFAULT_CONCEPT_TYPES: [&str; 6] = [
    "Cartera",
    "Matrícula",
    "Pensión",
    "Derechos de grado",
    "Certificados",
    "Otros",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub index: u32,
    pub label: String,
    /// Inactive types still resolve for existing rows but are refused for new input.
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    entries: BTreeMap<u32, TypeEntry>,
}

impl RegistrySnapshot {
    pub fn from_entries(entries: impl IntoIterator<Item = TypeEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.index, entry))
                .collect(),
        }
    }

    pub fn lookup(&self, index: u32) -> Option<&str> {
        self.entries.get(&index).map(|entry| entry.label.as_str())
    }

    /// Exact, case-sensitive match.
    pub fn lookup_index(&self, label: &str) -> Option<u32> {
        self.entries
            .values()
            .find(|entry| entry.label == label)
            .map(|entry| entry.index)
    }

    pub fn is_valid_index(&self, index: i64) -> bool {
        u32::try_from(index)
            .map(|index| self.entries.contains_key(&index))
            .unwrap_or(false)
    }

    pub fn is_selectable(&self, index: u32) -> bool {
        self.entries.get(&index).is_some_and(|entry| entry.active)
    }

    pub fn next_index(&self) -> u32 {
        self.entries
            .keys()
            .next_back()
            .map_or(0, |max| max.saturating_add(1))
    }

    /// Labels accepted for new input, in index order.
    pub fn allowed_labels(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|entry| entry.active)
            .map(|entry| entry.label.clone())
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("concept type label must not be blank")]
    BlankLabel,
    #[error("concept type index {0} does not exist")]
    UnknownIndex(u32),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Process-local view over the persisted concept-type table.
pub struct ConceptTypeRegistry<S> {
    store: Arc<S>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl<S> ConceptTypeRegistry<S>
where
    S: RegistryStore + 'static,
{
    /// Reads the table, seeding [`DEFAULT_CONCEPT_TYPES`] when it is empty.
    pub fn load(store: Arc<S>) -> Result<Self, RegistryError> {
        let mut entries = store.load_types()?;
        if entries.is_empty() {
            for label in DEFAULT_CONCEPT_TYPES {
                store.append_type(label)?;
            }
            entries = store.load_types()?;
            info!(seeded = entries.len(), "seeded default concept types");
        }

        Ok(Self {
            store,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::from_entries(entries))),
        })
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot
            .read()
            .expect("registry lock poisoned")
            .clone()
    }

    pub fn lookup(&self, index: u32) -> Option<String> {
        self.snapshot().lookup(index).map(str::to_string)
    }

    pub fn lookup_index(&self, label: &str) -> Option<u32> {
        self.snapshot().lookup_index(label)
    }

    pub fn is_valid_index(&self, index: i64) -> bool {
        self.snapshot().is_valid_index(index)
    }

    /// Writes the label through to storage and refreshes the snapshot.
    ///
    /// Returns `Ok(None)` when the label is already registered, including
    /// labels appended by another process since the last refresh.
    pub fn append(&self, label: &str) -> Result<Option<u32>, RegistryError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(RegistryError::BlankLabel);
        }

        let appended = self.store.append_type(label)?;
        self.refresh()?;

        match appended {
            Some(entry) => {
                info!(index = entry.index, label = %entry.label, "concept type appended");
                Ok(Some(entry.index))
            }
            None => {
                warn!(label, "concept type already registered");
                Ok(None)
            }
        }
    }

    pub fn set_active(&self, index: u32, active: bool) -> Result<(), RegistryError> {
        if !self.snapshot().is_valid_index(i64::from(index)) {
            self.refresh()?;
            if !self.snapshot().is_valid_index(i64::from(index)) {
                return Err(RegistryError::UnknownIndex(index));
            }
        }

        self.store.set_type_active(index, active)?;
        self.refresh()?;
        Ok(())
    }

    /// Re-reads storage so appends made by other workers become visible.
    pub fn refresh(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let fresh = Arc::new(RegistrySnapshot::from_entries(self.store.load_types()?));
        let mut guard = self.snapshot.write().expect("registry lock poisoned");
        *guard = fresh.clone();
        Ok(fresh)
    }
}
