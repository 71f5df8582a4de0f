use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::domain::EntityId;

/// Entity families that follow the date-windowed lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Discount,
    PriceList,
}

impl EntityKind {
    pub const fn ordered() -> [Self; 2] {
        [Self::Discount, Self::PriceList]
    }

    /// Stable name used by the CLI, logs and storage tables.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Discount => "discounts",
            Self::PriceList => "price-lists",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Discount => "Descuentos",
            Self::PriceList => "Listas de precio",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The `[fecha_inicio, fecha_fin]` range during which an entity may be active.
///
/// A missing `fecha_fin` makes the window open-ended: the entity stays
/// eligible forever once it has started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub fecha_inicio: NaiveDate,
    #[serde(default)]
    pub fecha_fin: Option<NaiveDate>,
}

impl Window {
    pub fn new(
        fecha_inicio: NaiveDate,
        fecha_fin: Option<NaiveDate>,
    ) -> Result<Self, LifecycleError> {
        if let Some(fin) = fecha_fin {
            if fin < fecha_inicio {
                return Err(LifecycleError::InvertedWindow {
                    fecha_inicio,
                    fecha_fin: fin,
                });
            }
        }

        Ok(Self {
            fecha_inicio,
            fecha_fin,
        })
    }

    pub const fn open_ended(fecha_inicio: NaiveDate) -> Self {
        Self {
            fecha_inicio,
            fecha_fin: None,
        }
    }

    pub fn has_started(&self, now: NaiveDate) -> bool {
        self.fecha_inicio <= now
    }

    pub fn has_ended(&self, now: NaiveDate) -> bool {
        matches!(self.fecha_fin, Some(fin) if fin < now)
    }

    /// Inclusive at both ends.
    pub fn contains(&self, now: NaiveDate) -> bool {
        self.has_started(now) && !self.has_ended(now)
    }
}

/// Per-entity status enumeration participating in the automatic lifecycle.
///
/// Each entity picks its own set of statuses, but all of them expose the three
/// the batch transitioner moves between.
pub trait WindowedStatus: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const APPROVED: Self;
    const ACTIVE: Self;
    const INACTIVE: Self;

    /// Value persisted in the `status` column.
    fn code(self) -> &'static str;
    fn label(self) -> &'static str;
    fn from_code(code: &str) -> Option<Self>;
}

/// Records that carry a status and a window and can be bulk-transitioned.
pub trait WindowedEntity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: WindowedStatus;
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);
    fn window(&self) -> &Window;
}

/// `status == Approved AND fecha_inicio <= now AND (fecha_fin IS NULL OR fecha_fin >= now)`
pub fn approved_for_activation<S: WindowedStatus>(status: S, window: &Window, now: NaiveDate) -> bool {
    status == S::APPROVED && window.contains(now)
}

/// `status == Active AND fecha_fin IS NOT NULL AND fecha_fin < now`
pub fn active_for_expiration<S: WindowedStatus>(status: S, window: &Window, now: NaiveDate) -> bool {
    status == S::ACTIVE && window.has_ended(now)
}

/// Automatic status flips applied by the daily run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Activate,
    Expire,
}

impl Transition {
    /// Transitions applied by one daily run. Their source statuses differ, so
    /// no record moves twice within a run whatever the order.
    pub const DAILY: [Transition; 2] = [Transition::Activate, Transition::Expire];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Activate => "activate",
            Self::Expire => "expire",
        }
    }

    pub fn source<S: WindowedStatus>(self) -> S {
        match self {
            Self::Activate => S::APPROVED,
            Self::Expire => S::ACTIVE,
        }
    }

    pub fn target<S: WindowedStatus>(self) -> S {
        match self {
            Self::Activate => S::ACTIVE,
            Self::Expire => S::INACTIVE,
        }
    }

    pub fn matches<S: WindowedStatus>(self, status: S, window: &Window, now: NaiveDate) -> bool {
        match self {
            Self::Activate => approved_for_activation(status, window, now),
            Self::Expire => active_for_expiration(status, window, now),
        }
    }
}

/// Status of a discount (`Descuento`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscountStatus {
    #[serde(rename = "propuesto")]
    Proposed,
    #[serde(rename = "aprobado")]
    Approved,
    #[serde(rename = "activo")]
    Active,
    #[serde(rename = "inactivo")]
    Inactive,
    #[serde(rename = "rechazado")]
    Rejected,
}

impl WindowedStatus for DiscountStatus {
    const APPROVED: Self = Self::Approved;
    const ACTIVE: Self = Self::Active;
    const INACTIVE: Self = Self::Inactive;

    fn code(self) -> &'static str {
        match self {
            Self::Proposed => "propuesto",
            Self::Approved => "aprobado",
            Self::Active => "activo",
            Self::Inactive => "inactivo",
            Self::Rejected => "rechazado",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Proposed => "Propuesto",
            Self::Approved => "Aprobado",
            Self::Active => "Activo",
            Self::Inactive => "Inactivo",
            Self::Rejected => "Rechazado",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "propuesto" => Some(Self::Proposed),
            "aprobado" => Some(Self::Approved),
            "activo" => Some(Self::Active),
            "inactivo" => Some(Self::Inactive),
            "rechazado" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Status of a price list (`LpListaPrecio`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceListStatus {
    #[serde(rename = "borrador")]
    Draft,
    #[serde(rename = "aprobada")]
    Approved,
    #[serde(rename = "activa")]
    Active,
    #[serde(rename = "inactiva")]
    Inactive,
}

impl WindowedStatus for PriceListStatus {
    const APPROVED: Self = Self::Approved;
    const ACTIVE: Self = Self::Active;
    const INACTIVE: Self = Self::Inactive;

    fn code(self) -> &'static str {
        match self {
            Self::Draft => "borrador",
            Self::Approved => "aprobada",
            Self::Active => "activa",
            Self::Inactive => "inactiva",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Draft => "Borrador",
            Self::Approved => "Aprobada",
            Self::Active => "Activa",
            Self::Inactive => "Inactiva",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "borrador" => Some(Self::Draft),
            "aprobada" => Some(Self::Approved),
            "activa" => Some(Self::Active),
            "inactiva" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("fecha_fin {fecha_fin} precedes fecha_inicio {fecha_inicio}")]
    InvertedWindow {
        fecha_inicio: NaiveDate,
        fecha_fin: NaiveDate,
    },
    #[error("cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}
