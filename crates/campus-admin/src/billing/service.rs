use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;

use super::domain::{Discount, EntityId, PaymentConcept, PriceList};
use super::lifecycle::{EntityKind, LifecycleError, WindowedEntity};
use super::locale::{Locale, LocaleSetting};
use super::receipts::{compose, PaymentReceipt, ReceiptIncludes, ReceiptView};
use super::registry::{ConceptTypeRegistry, RegistryError, TypeEntry};
use super::repository::{BillingStore, RepositoryError, WindowedRepository};
use super::transition::{TransitionError, TransitionReport, WindowTransitioner};
use super::validation::{
    validate_concept, validate_discount, validate_price_list, validate_receipt, ConceptPayload,
    DiscountPayload, PriceListPayload, ReceiptPayload, ValidationErrors,
};
use super::views::{PaymentConceptView, WindowedView};

/// Service composing storage, the concept-type registry and the transitioners.
pub struct BillingService<S> {
    store: Arc<S>,
    registry: ConceptTypeRegistry<S>,
    locale: LocaleSetting,
    discount_transitions: WindowTransitioner<Discount, S>,
    price_list_transitions: WindowTransitioner<PriceList, S>,
}

impl<S> BillingService<S>
where
    S: BillingStore + 'static,
{
    /// Loads (and if needed seeds) the concept-type registry from `store`.
    pub fn new(store: Arc<S>, locale: Locale) -> Result<Self, ServiceError> {
        let registry = ConceptTypeRegistry::load(store.clone())?;

        Ok(Self {
            discount_transitions: WindowTransitioner::new(store.clone()),
            price_list_transitions: WindowTransitioner::new(store.clone()),
            registry,
            locale: LocaleSetting::new(locale),
            store,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &ConceptTypeRegistry<S> {
        &self.registry
    }

    pub fn locale(&self) -> Locale {
        self.locale.current()
    }

    pub fn switch_locale(&self, raw: &str) -> Result<Locale, ServiceError> {
        let locale = Locale::parse(raw)
            .map_err(|err| ValidationErrors::single("locale", err.to_string()))?;
        self.locale.switch(locale);
        info!(locale = locale.code(), "locale switched");
        Ok(locale)
    }

    /// Runs the daily transition for one entity kind.
    pub fn run_transition(
        &self,
        kind: EntityKind,
        now: NaiveDate,
    ) -> Result<TransitionReport, TransitionError> {
        match kind {
            EntityKind::Discount => self.discount_transitions.run_daily(now),
            EntityKind::PriceList => self.price_list_transitions.run_daily(now),
        }
    }

    /// Runs every kind; a failing kind does not stop the others.
    pub fn run_daily_transitions(
        &self,
        now: NaiveDate,
    ) -> Vec<Result<TransitionReport, TransitionError>> {
        EntityKind::ordered()
            .into_iter()
            .map(|kind| self.run_transition(kind, now))
            .collect()
    }

    pub fn concept_types(&self) -> Vec<TypeEntry> {
        self.registry.snapshot().entries().cloned().collect()
    }

    pub fn append_concept_type(&self, label: &str) -> Result<TypeEntry, ServiceError> {
        match self.registry.append(label)? {
            Some(index) => self
                .registry
                .snapshot()
                .entries()
                .find(|entry| entry.index == index)
                .cloned()
                .ok_or(ServiceError::Registry(RegistryError::UnknownIndex(index))),
            None => Err(ServiceError::DuplicateType(label.trim().to_string())),
        }
    }

    pub fn set_concept_type_active(&self, index: u32, active: bool) -> Result<(), ServiceError> {
        self.registry.set_active(index, active)?;
        Ok(())
    }

    pub fn create_concept(&self, payload: &ConceptPayload) -> Result<PaymentConcept, ServiceError> {
        let types = self.registry.snapshot();
        let validated = validate_concept(payload, &types)?;

        let concept = PaymentConcept {
            id: EntityId::generate(),
            nombre: validated.nombre,
            tipo: validated.tipo,
            valor: validated.valor,
            activo: validated.activo,
        };
        let stored = self.store.insert_concept(concept)?;
        info!(id = %stored.id, tipo = stored.tipo, "payment concept created");
        Ok(stored)
    }

    pub fn concept_view(&self, id: &EntityId) -> Result<PaymentConceptView, ServiceError> {
        let concept = self
            .store
            .fetch_concept(id)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(PaymentConceptView::new(
            concept,
            &self.registry.snapshot(),
            self.locale(),
        ))
    }

    pub fn concepts(&self) -> Result<Vec<PaymentConceptView>, ServiceError> {
        let types = self.registry.snapshot();
        let locale = self.locale();
        Ok(self
            .store
            .list_concepts()?
            .into_iter()
            .map(|concept| PaymentConceptView::new(concept, &types, locale))
            .collect())
    }

    pub fn propose_discount(&self, payload: DiscountPayload) -> Result<Discount, ServiceError> {
        let discount = validate_discount(payload)?;
        let stored = self.insert_windowed(discount)?;
        info!(id = %stored.id, "discount proposed");
        Ok(stored)
    }

    pub fn approve_discount(&self, id: &EntityId) -> Result<Discount, ServiceError> {
        self.change_windowed(id, Discount::approve)
    }

    pub fn reject_discount(&self, id: &EntityId) -> Result<Discount, ServiceError> {
        self.change_windowed(id, Discount::reject)
    }

    pub fn discounts(&self, now: NaiveDate) -> Result<Vec<WindowedView<Discount>>, ServiceError> {
        self.list_windowed(now)
    }

    pub fn draft_price_list(&self, payload: PriceListPayload) -> Result<PriceList, ServiceError> {
        let price_list = validate_price_list(payload)?;
        let stored = self.insert_windowed(price_list)?;
        info!(id = %stored.id, items = stored.items.len(), "price list drafted");
        Ok(stored)
    }

    pub fn approve_price_list(&self, id: &EntityId) -> Result<PriceList, ServiceError> {
        self.change_windowed(id, PriceList::approve)
    }

    pub fn price_lists(&self, now: NaiveDate) -> Result<Vec<WindowedView<PriceList>>, ServiceError> {
        self.list_windowed(now)
    }

    pub fn record_receipt(&self, payload: ReceiptPayload) -> Result<PaymentReceipt, ServiceError> {
        let receipt = validate_receipt(payload, &self.registry.snapshot())?;
        let stored = self.store.insert_receipt(receipt)?;
        info!(id = %stored.id, numero = %stored.numero, "payment receipt recorded");
        Ok(stored)
    }

    pub fn receipt_view(
        &self,
        id: &EntityId,
        includes: &ReceiptIncludes,
    ) -> Result<ReceiptView, ServiceError> {
        let receipt = self
            .store
            .fetch_receipt(id, includes)?
            .ok_or(RepositoryError::NotFound)?;
        Ok(compose(
            &receipt,
            includes,
            &self.registry.snapshot(),
            self.locale(),
        ))
    }

    fn insert_windowed<E>(&self, entity: E) -> Result<E, ServiceError>
    where
        E: WindowedEntity,
        S: WindowedRepository<E>,
    {
        Ok(<S as WindowedRepository<E>>::insert(&*self.store, entity)?)
    }

    fn change_windowed<E>(
        &self,
        id: &EntityId,
        change: impl FnOnce(&mut E) -> Result<(), LifecycleError>,
    ) -> Result<E, ServiceError>
    where
        E: WindowedEntity,
        S: WindowedRepository<E>,
    {
        let mut entity = <S as WindowedRepository<E>>::fetch(&*self.store, id)?
            .ok_or(RepositoryError::NotFound)?;
        change(&mut entity)?;
        <S as WindowedRepository<E>>::update(&*self.store, entity.clone())?;
        info!(kind = %E::KIND, %id, status = ?entity.status(), "status changed");
        Ok(entity)
    }

    fn list_windowed<E>(&self, now: NaiveDate) -> Result<Vec<WindowedView<E>>, ServiceError>
    where
        E: WindowedEntity,
        S: WindowedRepository<E>,
    {
        let locale = self.locale();
        Ok(<S as WindowedRepository<E>>::list(&*self.store)?
            .into_iter()
            .map(|entity| WindowedView::new(entity, now, locale))
            .collect())
    }
}

/// Error raised by the billing service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("concept type '{0}' already exists")]
    DuplicateType(String),
    #[error("billing task did not complete: {0}")]
    Interrupted(String),
}
