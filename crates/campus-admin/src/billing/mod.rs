//! Billing core: windowed discounts and price lists, typed payment concepts
//! and payment receipts.

pub mod domain;
pub mod lifecycle;
pub mod locale;
pub mod receipts;
pub mod registry;
pub mod repository;
pub mod router;
pub mod service;
pub mod transition;
pub mod validation;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{Discount, DiscountAmount, EntityId, PaymentConcept, PriceList, PriceListItem};
pub use lifecycle::{
    active_for_expiration, approved_for_activation, DiscountStatus, EntityKind, LifecycleError,
    PriceListStatus, Transition, Window, WindowedEntity, WindowedStatus,
};
pub use locale::{Locale, LocaleError, LocaleSetting};
pub use receipts::{
    compose, ConceptLine, DiscountLine, PaymentMethodLine, PaymentReceipt, PriceListLine,
    ProductLine, ReceiptIncludes, ReceiptRelation, ReceiptStatus, ReceiptView, SubtotalMismatch,
};
pub use registry::{
    ConceptTypeRegistry, RegistryError, RegistrySnapshot, TypeEntry, DEFAULT_CONCEPT_TYPES,
};
pub use repository::{
    BillingStore, ConceptRepository, ReceiptRepository, RegistryStore, RepositoryError,
    TransitionOutcome, WindowedRepository,
};
pub use router::billing_router;
pub use service::{BillingService, ServiceError};
pub use transition::{TransitionError, TransitionReport, WindowTransitioner};
pub use validation::{
    ConceptPayload, DiscountPayload, FieldReader, PriceListPayload, ReceiptPayload, TypeInput,
    TypeResolutionError, ValidationErrors,
};
pub use views::{PaymentConceptView, WindowedView};
