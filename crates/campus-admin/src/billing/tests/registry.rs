use super::common::*;
use std::sync::Arc;

use crate::billing::registry::{ConceptTypeRegistry, RegistryError, DEFAULT_CONCEPT_TYPES};
use crate::billing::repository::RegistryStore;
use crate::storage::MemoryStore;

#[test]
fn load_seeds_defaults_in_index_order() {
    let store = Arc::new(MemoryStore::new());
    let registry = ConceptTypeRegistry::load(store.clone()).expect("registry loads");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), DEFAULT_CONCEPT_TYPES.len());
    for (index, label) in DEFAULT_CONCEPT_TYPES.iter().enumerate() {
        assert_eq!(snapshot.lookup(index as u32), Some(*label));
    }
    assert_eq!(registry.lookup(0).as_deref(), Some("Cartera"));
    assert_eq!(registry.lookup(5).as_deref(), Some("Otros"));
    assert_eq!(registry.lookup(6), None);
}

#[test]
fn load_does_not_reseed_existing_table() {
    let store = Arc::new(MemoryStore::new());
    store.append_type("Transporte").expect("append succeeds");

    let registry = ConceptTypeRegistry::load(store).expect("registry loads");

    assert_eq!(registry.snapshot().len(), 1);
    assert_eq!(registry.lookup_index("Transporte"), Some(0));
    assert_eq!(registry.lookup_index("Cartera"), None);
}

#[test]
fn lookup_index_is_exact_match() {
    let registry = ConceptTypeRegistry::load(Arc::new(MemoryStore::new())).expect("loads");

    assert_eq!(registry.lookup_index("Pensión"), Some(2));
    assert_eq!(registry.lookup_index("pensión"), None);
    assert_eq!(registry.lookup_index(" Pensión"), None);
}

#[test]
fn index_validity_covers_negative_and_out_of_range() {
    let registry = ConceptTypeRegistry::load(Arc::new(MemoryStore::new())).expect("loads");

    assert!(registry.is_valid_index(0));
    assert!(registry.is_valid_index(5));
    assert!(!registry.is_valid_index(6));
    assert!(!registry.is_valid_index(-1));
    assert!(!registry.is_valid_index(i64::from(u32::MAX) + 1));
}

#[test]
fn append_assigns_next_index_and_refuses_duplicates() {
    let registry = ConceptTypeRegistry::load(Arc::new(MemoryStore::new())).expect("loads");

    assert_eq!(registry.append("  Becas ").expect("append succeeds"), Some(6));
    assert_eq!(registry.lookup(6).as_deref(), Some("Becas"));
    assert_eq!(registry.snapshot().next_index(), 7);

    assert_eq!(registry.append("Becas").expect("duplicate is not an error"), None);
    assert_eq!(registry.snapshot().len(), 7);
}

#[test]
fn append_rejects_blank_labels() {
    let registry = ConceptTypeRegistry::load(Arc::new(MemoryStore::new())).expect("loads");
    assert!(matches!(registry.append("   "), Err(RegistryError::BlankLabel)));
}

#[test]
fn refresh_picks_up_appends_from_another_worker() {
    let store = Arc::new(MemoryStore::new());
    let first = ConceptTypeRegistry::load(store.clone()).expect("first worker loads");
    let second = ConceptTypeRegistry::load(store).expect("second worker loads");

    first.append("Transporte").expect("append succeeds");
    assert_eq!(second.lookup(6), None);

    let held = second.snapshot();
    second.refresh().expect("refresh succeeds");

    assert_eq!(second.lookup(6).as_deref(), Some("Transporte"));
    assert_eq!(held.lookup(6), None, "existing snapshots are immutable");
}

#[test]
fn deactivated_types_resolve_but_are_not_selectable() {
    let registry = ConceptTypeRegistry::load(Arc::new(MemoryStore::new())).expect("loads");

    registry.set_active(4, false).expect("deactivate succeeds");
    let snapshot = registry.snapshot();

    assert_eq!(snapshot.lookup(4), Some("Certificados"));
    assert!(snapshot.is_valid_index(4));
    assert!(!snapshot.is_selectable(4));
    assert!(!snapshot
        .allowed_labels()
        .contains(&"Certificados".to_string()));

    registry.set_active(4, true).expect("reactivate succeeds");
    assert!(registry.snapshot().is_selectable(4));
}

#[test]
fn set_active_reports_unknown_index() {
    let registry = ConceptTypeRegistry::load(Arc::new(MemoryStore::new())).expect("loads");
    assert!(matches!(
        registry.set_active(42, false),
        Err(RegistryError::UnknownIndex(42))
    ));
}

#[test]
fn snapshot_from_entries_matches_defaults() {
    let snapshot = default_types();
    assert_eq!(snapshot.allowed_labels(), DEFAULT_CONCEPT_TYPES.map(str::to_string).to_vec());
    assert!(!snapshot.is_empty());
}
