//! Payment receipt aggregate (`ReciboPago`) and its pivot lines.
//!
//! Composition is a read-only transform: the caller names the relations it
//! loaded and the view carries exactly those, omitting the others from the
//! serialized output rather than emitting `null`.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::EntityId;
use super::locale::Locale;
use super::registry::RegistrySnapshot;
use super::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptStatus {
    #[serde(rename = "pendiente")]
    Pending,
    #[serde(rename = "pagado")]
    Paid,
    #[serde(rename = "anulado")]
    Cancelled,
}

impl ReceiptStatus {
    pub const fn initial() -> Self {
        Self::Pending
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Paid => "Pagado",
            Self::Cancelled => "Anulado",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptLine {
    pub concepto_id: EntityId,
    pub nombre: String,
    pub tipo: u32,
    pub cantidad: u32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountLine {
    pub descuento_id: EntityId,
    pub nombre: String,
    pub valor: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceListLine {
    pub lista_precio_id: EntityId,
    pub nombre: String,
    pub cantidad: u32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLine {
    pub producto_id: String,
    pub nombre: String,
    pub cantidad: u32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodLine {
    pub medio_pago_id: String,
    pub nombre: String,
    pub valor: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referencia: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub id: EntityId,
    pub numero: String,
    pub fecha: NaiveDate,
    pub status: ReceiptStatus,
    pub valor_total: Decimal,
    pub descuento_total: Decimal,
    #[serde(default)]
    pub conceptos: Vec<ConceptLine>,
    #[serde(default)]
    pub descuentos: Vec<DiscountLine>,
    #[serde(default)]
    pub listas_precio: Vec<PriceListLine>,
    #[serde(default)]
    pub productos: Vec<ProductLine>,
    #[serde(default)]
    pub medios_pago: Vec<PaymentMethodLine>,
}

/// Pivot line whose stored subtotal differs from `cantidad * precio_unitario`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtotalMismatch {
    pub relation: ReceiptRelation,
    pub line_id: String,
    /// `None` when `cantidad * precio_unitario` does not fit a decimal.
    pub expected: Option<Decimal>,
    pub stored: Decimal,
}

impl PaymentReceipt {
    pub fn valor_neto(&self) -> Decimal {
        self.valor_total - self.descuento_total
    }

    /// Only loaded relations are inspected.
    pub fn subtotal_mismatches(&self) -> Vec<SubtotalMismatch> {
        let conceptos = self.conceptos.iter().map(|line| {
            (
                ReceiptRelation::Conceptos,
                line.concepto_id.to_string(),
                line.cantidad,
                line.precio_unitario,
                line.subtotal,
            )
        });
        let listas = self.listas_precio.iter().map(|line| {
            (
                ReceiptRelation::ListasPrecio,
                line.lista_precio_id.to_string(),
                line.cantidad,
                line.precio_unitario,
                line.subtotal,
            )
        });
        let productos = self.productos.iter().map(|line| {
            (
                ReceiptRelation::Productos,
                line.producto_id.clone(),
                line.cantidad,
                line.precio_unitario,
                line.subtotal,
            )
        });

        conceptos
            .chain(listas)
            .chain(productos)
            .filter_map(|(relation, line_id, cantidad, precio_unitario, stored)| {
                let expected = precio_unitario.checked_mul(Decimal::from(cantidad));
                (expected != Some(stored)).then_some(SubtotalMismatch {
                    relation,
                    line_id,
                    expected,
                    stored,
                })
            })
            .collect()
    }

    /// Clears every relation not named in `includes`.
    pub fn retain_relations(&mut self, includes: &ReceiptIncludes) {
        if !includes.contains(ReceiptRelation::Conceptos) {
            self.conceptos.clear();
        }
        if !includes.contains(ReceiptRelation::Descuentos) {
            self.descuentos.clear();
        }
        if !includes.contains(ReceiptRelation::ListasPrecio) {
            self.listas_precio.clear();
        }
        if !includes.contains(ReceiptRelation::Productos) {
            self.productos.clear();
        }
        if !includes.contains(ReceiptRelation::MediosPago) {
            self.medios_pago.clear();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptRelation {
    Conceptos,
    Descuentos,
    ListasPrecio,
    Productos,
    MediosPago,
}

impl ReceiptRelation {
    pub const ALL: [ReceiptRelation; 5] = [
        Self::Conceptos,
        Self::Descuentos,
        Self::ListasPrecio,
        Self::Productos,
        Self::MediosPago,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Conceptos => "conceptos",
            Self::Descuentos => "descuentos",
            Self::ListasPrecio => "listas_precio",
            Self::Productos => "productos",
            Self::MediosPago => "medios_pago",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|relation| relation.name() == name)
    }
}

/// Relations the caller chose to load eagerly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiptIncludes(BTreeSet<ReceiptRelation>);

impl ReceiptIncludes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(ReceiptRelation::ALL.into_iter().collect())
    }

    /// Parses `conceptos,descuentos,...`; blank segments are ignored.
    pub fn parse(raw: &str) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut relations = BTreeSet::new();

        for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            match ReceiptRelation::from_name(name) {
                Some(relation) => {
                    relations.insert(relation);
                }
                None => {
                    let allowed: Vec<&str> =
                        ReceiptRelation::ALL.iter().map(|rel| rel.name()).collect();
                    errors.add(
                        "include",
                        format!("unknown relation '{name}'; allowed: {}", allowed.join(", ")),
                    );
                }
            }
        }

        if errors.is_empty() {
            Ok(Self(relations))
        } else {
            Err(errors)
        }
    }

    pub fn with(mut self, relation: ReceiptRelation) -> Self {
        self.0.insert(relation);
        self
    }

    pub fn contains(&self, relation: ReceiptRelation) -> bool {
        self.0.contains(&relation)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConceptLineView {
    pub concepto_id: EntityId,
    pub nombre: String,
    pub tipo: u32,
    pub tipo_label: Option<String>,
    pub cantidad: u32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
    pub subtotal_formateado: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricedLineView {
    pub id: String,
    pub nombre: String,
    pub cantidad: u32,
    pub precio_unitario: Decimal,
    pub subtotal: Decimal,
    pub subtotal_formateado: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AmountLineView {
    pub id: String,
    pub nombre: String,
    pub valor: Decimal,
    pub valor_formateado: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referencia: Option<String>,
}

/// Flat receipt representation served by the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct ReceiptView {
    pub id: EntityId,
    pub numero: String,
    pub fecha: NaiveDate,
    pub status: ReceiptStatus,
    pub status_label: &'static str,
    pub valor_total: Decimal,
    pub valor_total_formateado: String,
    pub descuento_total: Decimal,
    pub descuento_total_formateado: String,
    pub valor_neto: Decimal,
    pub valor_neto_formateado: String,
    pub pagado: bool,
    pub pagado_label: &'static str,
    pub subtotales_conciliados: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conceptos: Option<Vec<ConceptLineView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descuentos: Option<Vec<AmountLineView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listas_precio: Option<Vec<PricedLineView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub productos: Option<Vec<PricedLineView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medios_pago: Option<Vec<AmountLineView>>,
}

pub fn compose(
    receipt: &PaymentReceipt,
    includes: &ReceiptIncludes,
    types: &RegistrySnapshot,
    locale: Locale,
) -> ReceiptView {
    let money = |amount: Decimal| locale.format_currency(amount);
    let loaded = |relation| includes.contains(relation);
    let pagado = receipt.status == ReceiptStatus::Paid;

    let conceptos = loaded(ReceiptRelation::Conceptos).then(|| {
        receipt
            .conceptos
            .iter()
            .map(|line| ConceptLineView {
                concepto_id: line.concepto_id.clone(),
                nombre: line.nombre.clone(),
                tipo: line.tipo,
                tipo_label: types.lookup(line.tipo).map(str::to_string),
                cantidad: line.cantidad,
                precio_unitario: line.precio_unitario,
                subtotal: line.subtotal,
                subtotal_formateado: money(line.subtotal),
            })
            .collect()
    });

    let descuentos = loaded(ReceiptRelation::Descuentos).then(|| {
        receipt
            .descuentos
            .iter()
            .map(|line| AmountLineView {
                id: line.descuento_id.to_string(),
                nombre: line.nombre.clone(),
                valor: line.valor,
                valor_formateado: money(line.valor),
                referencia: None,
            })
            .collect()
    });

    let listas_precio = loaded(ReceiptRelation::ListasPrecio).then(|| {
        receipt
            .listas_precio
            .iter()
            .map(|line| PricedLineView {
                id: line.lista_precio_id.to_string(),
                nombre: line.nombre.clone(),
                cantidad: line.cantidad,
                precio_unitario: line.precio_unitario,
                subtotal: line.subtotal,
                subtotal_formateado: money(line.subtotal),
            })
            .collect()
    });

    let productos = loaded(ReceiptRelation::Productos).then(|| {
        receipt
            .productos
            .iter()
            .map(|line| PricedLineView {
                id: line.producto_id.clone(),
                nombre: line.nombre.clone(),
                cantidad: line.cantidad,
                precio_unitario: line.precio_unitario,
                subtotal: line.subtotal,
                subtotal_formateado: money(line.subtotal),
            })
            .collect()
    });

    let medios_pago = loaded(ReceiptRelation::MediosPago).then(|| {
        receipt
            .medios_pago
            .iter()
            .map(|line| AmountLineView {
                id: line.medio_pago_id.clone(),
                nombre: line.nombre.clone(),
                valor: line.valor,
                valor_formateado: money(line.valor),
                referencia: line.referencia.clone(),
            })
            .collect()
    });

    ReceiptView {
        id: receipt.id.clone(),
        numero: receipt.numero.clone(),
        fecha: receipt.fecha,
        status: receipt.status,
        status_label: receipt.status.label(),
        valor_total: receipt.valor_total,
        valor_total_formateado: money(receipt.valor_total),
        descuento_total: receipt.descuento_total,
        descuento_total_formateado: money(receipt.descuento_total),
        valor_neto: receipt.valor_neto(),
        valor_neto_formateado: money(receipt.valor_neto()),
        pagado,
        pagado_label: locale.yes_no(pagado),
        subtotales_conciliados: receipt.subtotal_mismatches().is_empty(),
        conceptos,
        descuentos,
        listas_precio,
        productos,
        medios_pago,
    }
}
