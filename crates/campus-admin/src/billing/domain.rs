use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::lifecycle::{
    DiscountStatus, EntityKind, LifecycleError, PriceListStatus, Window, WindowedEntity,
    WindowedStatus,
};

/// Identifier wrapper shared by every persisted billing record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// How much a discount takes off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modalidad", content = "monto", rename_all = "snake_case")]
pub enum DiscountAmount {
    Porcentaje(Decimal),
    Valor(Decimal),
}

/// `Descuento`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub id: EntityId,
    pub nombre: String,
    pub monto: DiscountAmount,
    pub status: DiscountStatus,
    #[serde(flatten)]
    pub window: Window,
}

impl Discount {
    /// New discounts always start as proposals awaiting human approval.
    pub fn propose(nombre: impl Into<String>, monto: DiscountAmount, window: Window) -> Self {
        Self {
            id: EntityId::generate(),
            nombre: nombre.into(),
            monto,
            status: DiscountStatus::Proposed,
            window,
        }
    }

    pub fn approve(&mut self) -> Result<(), LifecycleError> {
        self.move_from(DiscountStatus::Proposed, DiscountStatus::Approved)
    }

    pub fn reject(&mut self) -> Result<(), LifecycleError> {
        self.move_from(DiscountStatus::Proposed, DiscountStatus::Rejected)
    }

    fn move_from(
        &mut self,
        expected: DiscountStatus,
        target: DiscountStatus,
    ) -> Result<(), LifecycleError> {
        if self.status != expected {
            return Err(LifecycleError::InvalidTransition {
                from: self.status.code(),
                to: target.code(),
            });
        }
        self.status = target;
        Ok(())
    }
}

impl WindowedEntity for Discount {
    type Status = DiscountStatus;
    const KIND: EntityKind = EntityKind::Discount;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn status(&self) -> DiscountStatus {
        self.status
    }

    fn set_status(&mut self, status: DiscountStatus) {
        self.status = status;
    }

    fn window(&self) -> &Window {
        &self.window
    }
}

/// Product price carried by a price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListItem {
    pub producto_id: String,
    pub precio_unitario: Decimal,
}

/// `LpListaPrecio`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceList {
    pub id: EntityId,
    pub nombre: String,
    pub status: PriceListStatus,
    #[serde(flatten)]
    pub window: Window,
    #[serde(default)]
    pub items: Vec<PriceListItem>,
}

impl PriceList {
    pub fn draft(nombre: impl Into<String>, window: Window, items: Vec<PriceListItem>) -> Self {
        Self {
            id: EntityId::generate(),
            nombre: nombre.into(),
            status: PriceListStatus::Draft,
            window,
            items,
        }
    }

    pub fn approve(&mut self) -> Result<(), LifecycleError> {
        if self.status != PriceListStatus::Draft {
            return Err(LifecycleError::InvalidTransition {
                from: self.status.code(),
                to: PriceListStatus::Approved.code(),
            });
        }
        self.status = PriceListStatus::Approved;
        Ok(())
    }

    pub fn price_for(&self, producto_id: &str) -> Option<Decimal> {
        self.items
            .iter()
            .find(|item| item.producto_id == producto_id)
            .map(|item| item.precio_unitario)
    }
}

impl WindowedEntity for PriceList {
    type Status = PriceListStatus;
    const KIND: EntityKind = EntityKind::PriceList;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn status(&self) -> PriceListStatus {
        self.status
    }

    fn set_status(&mut self, status: PriceListStatus) {
        self.status = status;
    }

    fn window(&self) -> &Window {
        &self.window
    }
}

/// `ConceptoPago`: a chargeable concept typed through the concept-type registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentConcept {
    pub id: EntityId,
    pub nombre: String,
    /// Index into the concept-type registry.
    pub tipo: u32,
    pub valor: Decimal,
    pub activo: bool,
}
