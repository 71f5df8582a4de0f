//! Request normalization and validation.
//!
//! External payloads may reference a concept type either by index or by
//! label. The type is normalized to the canonical index first; only then does
//! the range rule run, so each failure maps to exactly one error kind.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::domain::{Discount, DiscountAmount, EntityId, PriceList, PriceListItem};
use super::lifecycle::Window;
use super::receipts::{
    ConceptLine, DiscountLine, PaymentMethodLine, PaymentReceipt, PriceListLine, ProductLine,
    ReceiptStatus,
};
use super::registry::RegistrySnapshot;

pub const NOMBRE_MAX_CHARS: usize = 255;
pub const AMOUNT_MAX_SCALE: u32 = 2;

/// Field name to messages, rendered as the `errors` object of a 422 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("validation failed")?;
        for (field, messages) in &self.fields {
            write!(f, "; {field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Reads typed fields out of a raw JSON object, recording one error per field
/// that is missing or does not deserialize.
pub struct FieldReader<'a> {
    object: Option<&'a Map<String, Value>>,
    errors: ValidationErrors,
}

impl<'a> FieldReader<'a> {
    pub fn new(body: &'a Value) -> Self {
        let mut errors = ValidationErrors::new();
        let object = body.as_object();
        if object.is_none() {
            errors.add("body", "the request body must be a JSON object");
        }
        Self { object, errors }
    }

    fn raw(&self, field: &str) -> Option<&'a Value> {
        self.object
            .and_then(|object| object.get(field))
            .filter(|value| !value.is_null())
    }

    /// Absent and `null` both count as missing.
    pub fn required<T: DeserializeOwned>(&mut self, field: &str) -> Option<T> {
        match self.raw(field) {
            Some(value) => self.parse(field, value),
            None => {
                if self.object.is_some() {
                    self.errors.add(field, format!("the {field} field is required"));
                }
                None
            }
        }
    }

    pub fn optional<T: DeserializeOwned>(&mut self, field: &str) -> Option<T> {
        self.raw(field).and_then(|value| self.parse(field, value))
    }

    fn parse<T: DeserializeOwned>(&mut self, field: &str, value: &Value) -> Option<T> {
        T::deserialize(value)
            .map_err(|err| {
                self.errors
                    .add(field, format!("the {field} field is invalid: {err}"))
            })
            .ok()
    }

    /// `build` sees `None` for every field that failed; it only runs to
    /// completion when nothing was recorded.
    pub fn finish<T>(self, build: impl FnOnce() -> Option<T>) -> Result<T, ValidationErrors> {
        match build() {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => Err(self.errors),
        }
    }
}

/// External representation of a concept type before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInput {
    Index(i64),
    Label(String),
}

impl TypeInput {
    /// Integers and numeric strings are indices; any other string is a label.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(Self::Index),
            Value::String(raw) => match raw.trim().parse::<i64>() {
                Ok(index) => Some(Self::Index(index)),
                Err(_) => Some(Self::Label(raw.clone())),
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TypeResolutionError {
    #[error("the tipo field must be an integer index or a type label")]
    Malformed,
    #[error("unrecognized tipo '{label}'; allowed: {}", allowed.join(", "))]
    UnknownLabel { label: String, allowed: Vec<String> },
    #[error("tipo index {index} is out of range; allowed: {}", allowed.join(", "))]
    IndexOutOfRange { index: i64, allowed: Vec<String> },
    #[error("tipo '{label}' (index {index}) is inactive; allowed: {}", allowed.join(", "))]
    Inactive {
        index: u32,
        label: String,
        allowed: Vec<String>,
    },
}

/// Maps a label onto its index; indices pass through untouched.
pub fn normalize_type(
    input: &TypeInput,
    types: &RegistrySnapshot,
) -> Result<i64, TypeResolutionError> {
    match input {
        TypeInput::Index(index) => Ok(*index),
        TypeInput::Label(label) => types
            .lookup_index(label)
            .map(i64::from)
            .ok_or_else(|| TypeResolutionError::UnknownLabel {
                label: label.clone(),
                allowed: types.allowed_labels(),
            }),
    }
}

/// Normalizes, then applies the range rule against selectable types.
pub fn resolve_type(value: &Value, types: &RegistrySnapshot) -> Result<u32, TypeResolutionError> {
    let input = TypeInput::from_json(value).ok_or(TypeResolutionError::Malformed)?;
    let index = normalize_type(&input, types)?;

    match u32::try_from(index) {
        Ok(candidate) if types.is_selectable(candidate) => Ok(candidate),
        Ok(candidate) => match types.lookup(candidate) {
            Some(label) => Err(TypeResolutionError::Inactive {
                index: candidate,
                label: label.to_string(),
                allowed: types.allowed_labels(),
            }),
            None => Err(TypeResolutionError::IndexOutOfRange {
                index,
                allowed: types.allowed_labels(),
            }),
        },
        Err(_) => Err(TypeResolutionError::IndexOutOfRange {
            index,
            allowed: types.allowed_labels(),
        }),
    }
}

pub fn check_nombre(field: &str, raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(format!("the {field} field is required"));
    }
    if trimmed.chars().count() > NOMBRE_MAX_CHARS {
        return Err(format!(
            "the {field} field must not exceed {NOMBRE_MAX_CHARS} characters"
        ));
    }
    Ok(trimmed.to_string())
}

/// Non-negative with at most two fraction digits.
pub fn check_amount(field: &str, amount: Decimal) -> Result<Decimal, String> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format!("the {field} field must not be negative"));
    }
    if amount.scale() > AMOUNT_MAX_SCALE {
        return Err(format!(
            "the {field} field must have at most {AMOUNT_MAX_SCALE} decimal places"
        ));
    }
    Ok(amount)
}

pub fn parse_amount(field: &str, value: &Value) -> Result<Decimal, String> {
    let parsed = match value {
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        Value::String(raw) => Decimal::from_str(raw.trim()).ok(),
        _ => None,
    };
    let amount = parsed.ok_or_else(|| format!("the {field} field must be a decimal number"))?;
    check_amount(field, amount)
}

/// Raw create payload for a payment concept. Fields stay untyped so every
/// problem can be reported per field instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConceptPayload {
    #[serde(default)]
    pub nombre: Option<Value>,
    #[serde(default)]
    pub tipo: Option<Value>,
    #[serde(default)]
    pub valor: Option<Value>,
    #[serde(default)]
    pub activo: Option<Value>,
}

impl ConceptPayload {
    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let object = body.as_object().ok_or_else(|| {
            ValidationErrors::single("body", "the request body must be a JSON object")
        })?;
        Ok(Self {
            nombre: object.get("nombre").cloned(),
            tipo: object.get("tipo").cloned(),
            valor: object.get("valor").cloned(),
            activo: object.get("activo").cloned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentConcept {
    pub nombre: String,
    pub tipo: u32,
    pub valor: Decimal,
    pub activo: bool,
}

pub fn validate_concept(
    payload: &ConceptPayload,
    types: &RegistrySnapshot,
) -> Result<NewPaymentConcept, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let nombre = match &payload.nombre {
        Some(Value::String(raw)) => check_nombre("nombre", raw),
        Some(Value::Null) | None => Err("the nombre field is required".to_string()),
        Some(_) => Err("the nombre field must be a string".to_string()),
    }
    .map_err(|message| errors.add("nombre", message))
    .ok();

    let tipo = match &payload.tipo {
        Some(Value::Null) | None => {
            errors.add("tipo", "the tipo field is required");
            None
        }
        Some(value) => resolve_type(value, types)
            .map_err(|err| errors.add("tipo", err.to_string()))
            .ok(),
    };

    let valor = match &payload.valor {
        Some(Value::Null) | None => {
            errors.add("valor", "the valor field is required");
            None
        }
        Some(value) => parse_amount("valor", value)
            .map_err(|message| errors.add("valor", message))
            .ok(),
    };

    let activo = match &payload.activo {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Null) | None => true,
        Some(_) => {
            errors.add("activo", "the activo field must be true or false");
            true
        }
    };

    match (nombre, tipo, valor) {
        (Some(nombre), Some(tipo), Some(valor)) if errors.is_empty() => Ok(NewPaymentConcept {
            nombre,
            tipo,
            valor,
            activo,
        }),
        _ => Err(errors),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscountPayload {
    pub nombre: String,
    pub monto: DiscountAmount,
    pub fecha_inicio: NaiveDate,
    #[serde(default)]
    pub fecha_fin: Option<NaiveDate>,
}

impl DiscountPayload {
    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = FieldReader::new(body);
        let nombre = reader.required("nombre");
        let monto = reader.required("monto");
        let fecha_inicio = reader.required("fecha_inicio");
        let fecha_fin = reader.optional("fecha_fin");
        reader.finish(|| {
            Some(Self {
                nombre: nombre?,
                monto: monto?,
                fecha_inicio: fecha_inicio?,
                fecha_fin,
            })
        })
    }
}

pub fn validate_discount(payload: DiscountPayload) -> Result<Discount, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let nombre = check_nombre("nombre", &payload.nombre)
        .map_err(|message| errors.add("nombre", message))
        .unwrap_or_default();

    match payload.monto {
        DiscountAmount::Porcentaje(porcentaje) => {
            if let Err(message) = check_amount("monto", porcentaje) {
                errors.add("monto", message);
            } else if porcentaje.is_zero() || porcentaje > Decimal::ONE_HUNDRED {
                errors.add("monto", "a percentage discount must be above 0 and at most 100");
            }
        }
        DiscountAmount::Valor(valor) => {
            if let Err(message) = check_amount("monto", valor) {
                errors.add("monto", message);
            }
        }
    }

    let window = Window::new(payload.fecha_inicio, payload.fecha_fin)
        .map_err(|err| errors.add("fecha_fin", err.to_string()))
        .ok();

    match window {
        Some(window) => errors.finish(|| Discount::propose(nombre, payload.monto, window)),
        None => Err(errors),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceListPayload {
    pub nombre: String,
    pub fecha_inicio: NaiveDate,
    #[serde(default)]
    pub fecha_fin: Option<NaiveDate>,
    #[serde(default)]
    pub items: Vec<PriceListItem>,
}

impl PriceListPayload {
    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = FieldReader::new(body);
        let nombre = reader.required("nombre");
        let fecha_inicio = reader.required("fecha_inicio");
        let fecha_fin = reader.optional("fecha_fin");
        let items = reader.optional("items").unwrap_or_default();
        reader.finish(|| {
            Some(Self {
                nombre: nombre?,
                fecha_inicio: fecha_inicio?,
                fecha_fin,
                items,
            })
        })
    }
}

pub fn validate_price_list(payload: PriceListPayload) -> Result<PriceList, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let nombre = check_nombre("nombre", &payload.nombre)
        .map_err(|message| errors.add("nombre", message))
        .unwrap_or_default();

    let mut seen = std::collections::BTreeSet::new();
    for (position, item) in payload.items.iter().enumerate() {
        if item.producto_id.trim().is_empty() {
            errors.add(
                format!("items.{position}.producto_id"),
                "the producto_id field is required",
            );
        } else if !seen.insert(item.producto_id.as_str()) {
            errors.add(
                format!("items.{position}.producto_id"),
                format!("producto '{}' is listed more than once", item.producto_id),
            );
        }
        if let Err(message) = check_amount("precio_unitario", item.precio_unitario) {
            errors.add(format!("items.{position}.precio_unitario"), message);
        }
    }

    let window = Window::new(payload.fecha_inicio, payload.fecha_fin)
        .map_err(|err| errors.add("fecha_fin", err.to_string()))
        .ok();

    match window {
        Some(window) => errors.finish(|| PriceList::draft(nombre, window, payload.items)),
        None => Err(errors),
    }
}

/// Receipt aggregate as submitted by a caller; the id is assigned on insert.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptPayload {
    pub numero: String,
    pub fecha: NaiveDate,
    #[serde(default = "ReceiptStatus::initial")]
    pub status: ReceiptStatus,
    pub valor_total: Decimal,
    #[serde(default)]
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

impl ReceiptPayload {
    pub fn from_json(body: &Value) -> Result<Self, ValidationErrors> {
        let mut reader = FieldReader::new(body);
        let numero = reader.required("numero");
        let fecha = reader.required("fecha");
        let status = reader.optional("status").unwrap_or_else(ReceiptStatus::initial);
        let valor_total = reader.required("valor_total");
        let descuento_total = reader.optional("descuento_total").unwrap_or_default();
        let conceptos = reader.optional("conceptos").unwrap_or_default();
        let descuentos = reader.optional("descuentos").unwrap_or_default();
        let listas_precio = reader.optional("listas_precio").unwrap_or_default();
        let productos = reader.optional("productos").unwrap_or_default();
        let medios_pago = reader.optional("medios_pago").unwrap_or_default();
        reader.finish(|| {
            Some(Self {
                numero: numero?,
                fecha: fecha?,
                status,
                valor_total: valor_total?,
                descuento_total,
                conceptos,
                descuentos,
                listas_precio,
                productos,
                medios_pago,
            })
        })
    }
}

/// Subtotals are stored as supplied; see `PaymentReceipt::subtotal_mismatches`.
pub fn validate_receipt(
    payload: ReceiptPayload,
    types: &RegistrySnapshot,
) -> Result<PaymentReceipt, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let numero = check_nombre("numero", &payload.numero)
        .map_err(|message| errors.add("numero", message))
        .unwrap_or_default();

    for (field, amount) in [
        ("valor_total", payload.valor_total),
        ("descuento_total", payload.descuento_total),
    ] {
        if let Err(message) = check_amount(field, amount) {
            errors.add(field, message);
        }
    }
    if payload.descuento_total > payload.valor_total {
        errors.add(
            "descuento_total",
            "the descuento_total field must not exceed valor_total",
        );
    }

    for (position, line) in payload.conceptos.iter().enumerate() {
        if !types.is_valid_index(i64::from(line.tipo)) {
            errors.add(
                format!("conceptos.{position}.tipo"),
                TypeResolutionError::IndexOutOfRange {
                    index: i64::from(line.tipo),
                    allowed: types.allowed_labels(),
                }
                .to_string(),
            );
        }
        check_pivot(
            &mut errors,
            "conceptos",
            position,
            line.cantidad,
            line.precio_unitario,
            line.subtotal,
        );
    }
    for (position, line) in payload.listas_precio.iter().enumerate() {
        check_pivot(
            &mut errors,
            "listas_precio",
            position,
            line.cantidad,
            line.precio_unitario,
            line.subtotal,
        );
    }
    for (position, line) in payload.productos.iter().enumerate() {
        check_pivot(
            &mut errors,
            "productos",
            position,
            line.cantidad,
            line.precio_unitario,
            line.subtotal,
        );
    }
    for (position, line) in payload.descuentos.iter().enumerate() {
        if let Err(message) = check_amount("valor", line.valor) {
            errors.add(format!("descuentos.{position}.valor"), message);
        }
    }
    for (position, line) in payload.medios_pago.iter().enumerate() {
        if let Err(message) = check_amount("valor", line.valor) {
            errors.add(format!("medios_pago.{position}.valor"), message);
        }
    }

    errors.finish(|| PaymentReceipt {
        id: EntityId::generate(),
        numero,
        fecha: payload.fecha,
        status: payload.status,
        valor_total: payload.valor_total,
        descuento_total: payload.descuento_total,
        conceptos: payload.conceptos,
        descuentos: payload.descuentos,
        listas_precio: payload.listas_precio,
        productos: payload.productos,
        medios_pago: payload.medios_pago,
    })
}

fn check_pivot(
    errors: &mut ValidationErrors,
    relation: &str,
    position: usize,
    cantidad: u32,
    precio_unitario: Decimal,
    subtotal: Decimal,
) {
    if let Err(message) = check_amount("precio_unitario", precio_unitario) {
        errors.add(format!("{relation}.{position}.precio_unitario"), message);
    }
    if precio_unitario.checked_mul(Decimal::from(cantidad)).is_none() {
        errors.add(
            format!("{relation}.{position}.cantidad"),
            "the line total cantidad * precio_unitario is too large",
        );
    }
    if let Err(message) = check_amount("subtotal", subtotal) {
        errors.add(format!("{relation}.{position}.subtotal"), message);
    }
}
