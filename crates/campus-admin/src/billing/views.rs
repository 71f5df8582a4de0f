use chrono::NaiveDate;
use serde::Serialize;

use super::domain::PaymentConcept;
use super::lifecycle::{WindowedEntity, WindowedStatus};
use super::locale::Locale;
use super::registry::RegistrySnapshot;

/// Windowed entity plus the display fields derived from its status and window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowedView<E> {
    #[serde(flatten)]
    pub entity: E,
    pub status_label: &'static str,
    /// Active and inside its window on the evaluation date.
    pub vigente: bool,
    pub vigente_label: &'static str,
}

impl<E: WindowedEntity> WindowedView<E> {
    pub fn new(entity: E, now: NaiveDate, locale: Locale) -> Self {
        let status = entity.status();
        let vigente = status == E::Status::ACTIVE && entity.window().contains(now);
        Self {
            status_label: status.label(),
            vigente,
            vigente_label: locale.yes_no(vigente),
            entity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentConceptView {
    #[serde(flatten)]
    pub concept: PaymentConcept,
    pub tipo_label: Option<String>,
    pub valor_formateado: String,
    pub activo_label: &'static str,
}

impl PaymentConceptView {
    pub fn new(concept: PaymentConcept, types: &RegistrySnapshot, locale: Locale) -> Self {
        Self {
            tipo_label: types.lookup(concept.tipo).map(str::to_string),
            valor_formateado: locale.format_currency(concept.valor),
            activo_label: locale.yes_no(concept.activo),
            concept,
        }
    }
}
