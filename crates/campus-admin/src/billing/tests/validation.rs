use super::common::*;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use crate::billing::domain::DiscountAmount;
use crate::billing::receipts::ReceiptStatus;
use crate::billing::registry::{RegistrySnapshot, TypeEntry};
use crate::billing::validation::{
    normalize_type, resolve_type, validate_concept, validate_discount, validate_price_list,
    validate_receipt, ConceptPayload, DiscountPayload, PriceListPayload, ReceiptPayload,
    TypeInput, TypeResolutionError, NOMBRE_MAX_CHARS,
};

fn concept_payload(nombre: Value, tipo: Value, valor: Value) -> ConceptPayload {
    ConceptPayload {
        nombre: Some(nombre),
        tipo: Some(tipo),
        valor: Some(valor),
        activo: None,
    }
}

#[test]
fn label_normalizes_to_its_index() {
    let types = default_types();
    let concept = validate_concept(
        &concept_payload(json!("Pensión marzo"), json!("Cartera"), json!(150000)),
        &types,
    )
    .expect("valid payload");

    assert_eq!(concept.tipo, 0);
    assert_eq!(concept.nombre, "Pensión marzo");
    assert_eq!(concept.valor, dec!(150000));
    assert!(concept.activo);
}

#[test]
fn integer_and_numeric_string_indices_are_accepted() {
    let types = default_types();
    assert_eq!(resolve_type(&json!(2), &types), Ok(2));
    assert_eq!(resolve_type(&json!("3"), &types), Ok(3));
    assert_eq!(
        TypeInput::from_json(&json!("Otros")),
        Some(TypeInput::Label("Otros".to_string()))
    );
    assert_eq!(TypeInput::from_json(&json!(null)), None);
}

#[test]
fn unknown_label_lists_allowed_labels() {
    let types = default_types();
    let err = resolve_type(&json!("Bogus"), &types).expect_err("unknown label");

    match &err {
        TypeResolutionError::UnknownLabel { label, allowed } => {
            assert_eq!(label, "Bogus");
            assert_eq!(allowed.len(), 6);
            assert_eq!(allowed[0], "Cartera");
        }
        other => panic!("expected unknown label, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("Bogus"));
    assert!(message.contains("Cartera, Matrícula, Pensión"));
}

#[test]
fn normalization_leaves_indices_for_the_range_rule() {
    let types = default_types();
    assert_eq!(normalize_type(&TypeInput::Index(99), &types), Ok(99));
    assert!(matches!(
        resolve_type(&json!(99), &types),
        Err(TypeResolutionError::IndexOutOfRange { index: 99, .. })
    ));
    assert!(matches!(
        resolve_type(&json!(-1), &types),
        Err(TypeResolutionError::IndexOutOfRange { index: -1, .. })
    ));
    assert_eq!(
        resolve_type(&json!(true), &types),
        Err(TypeResolutionError::Malformed)
    );
}

#[test]
fn deactivated_type_is_refused_for_new_concepts() {
    let mut entries = default_entries();
    entries[4].active = false;
    let types = RegistrySnapshot::from_entries(entries);

    let by_label = resolve_type(&json!("Certificados"), &types).expect_err("inactive label");
    assert!(matches!(
        by_label,
        TypeResolutionError::Inactive { index: 4, ref label, .. } if label == "Certificados"
    ));
    let message = by_label.to_string();
    assert!(message.contains("inactive"));
    assert!(!message.contains("out of range"));

    assert!(matches!(
        resolve_type(&json!(4), &types),
        Err(TypeResolutionError::Inactive { index: 4, .. })
    ));
    assert_eq!(resolve_type(&json!(5), &types), Ok(5));
}

#[test]
fn appended_type_becomes_valid_input() {
    let mut entries = default_entries();
    entries.push(TypeEntry {
        index: 6,
        label: "Becas".to_string(),
        active: true,
    });
    let types = RegistrySnapshot::from_entries(entries);

    assert_eq!(resolve_type(&json!("Becas"), &types), Ok(6));
}

#[test]
fn nombre_length_is_bounded() {
    let types = default_types();

    let at_limit = "a".repeat(NOMBRE_MAX_CHARS);
    assert!(validate_concept(&concept_payload(json!(at_limit), json!(0), json!(1)), &types).is_ok());

    let too_long = "ñ".repeat(NOMBRE_MAX_CHARS + 1);
    let errors = validate_concept(&concept_payload(json!(too_long), json!(0), json!(1)), &types)
        .expect_err("too long");
    assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["nombre"]);
    assert!(errors.messages("nombre")[0].contains("255"));

    let errors = validate_concept(&concept_payload(json!("   "), json!(0), json!(1)), &types)
        .expect_err("blank");
    assert!(errors.messages("nombre")[0].contains("required"));
}

#[test]
fn valor_must_be_non_negative_with_two_decimals() {
    let types = default_types();

    let accepted = validate_concept(
        &concept_payload(json!("Certificado"), json!(4), json!("12500.50")),
        &types,
    )
    .expect("two decimals accepted");
    assert_eq!(accepted.valor, dec!(12500.50));

    for (valor, fragment) in [
        (json!("10.123"), "decimal places"),
        (json!(-5), "negative"),
        (json!("abc"), "decimal number"),
        (json!([1]), "decimal number"),
    ] {
        let errors = validate_concept(&concept_payload(json!("Certificado"), json!(4), valor), &types)
            .expect_err("invalid valor");
        assert!(
            errors.messages("valor")[0].contains(fragment),
            "expected '{fragment}' in {:?}",
            errors.messages("valor")
        );
    }
}

#[test]
fn every_field_error_is_reported_together() {
    let types = default_types();
    let payload = ConceptPayload {
        nombre: None,
        tipo: Some(json!("Bogus")),
        valor: Some(json!("1.001")),
        activo: Some(json!("yes")),
    };

    let errors = validate_concept(&payload, &types).expect_err("invalid payload");

    assert_eq!(
        errors.fields().collect::<Vec<_>>(),
        vec!["activo", "nombre", "tipo", "valor"]
    );
    assert!(errors.to_string().starts_with("validation failed; activo:"));
}

#[test]
fn percentage_discounts_are_bounded() {
    let payload = |monto| DiscountPayload {
        nombre: "Hermanos".to_string(),
        monto,
        fecha_inicio: date(2024, 1, 1),
        fecha_fin: None,
    };

    assert!(validate_discount(payload(DiscountAmount::Porcentaje(dec!(100)))).is_ok());
    assert!(validate_discount(payload(DiscountAmount::Porcentaje(dec!(0)))).is_err());
    assert!(validate_discount(payload(DiscountAmount::Porcentaje(dec!(100.5)))).is_err());
    assert!(validate_discount(payload(DiscountAmount::Valor(dec!(250000)))).is_ok());
}

#[test]
fn inverted_discount_window_is_reported_on_fecha_fin() {
    let errors = validate_discount(DiscountPayload {
        nombre: "Convenio".to_string(),
        monto: DiscountAmount::Valor(dec!(1000)),
        fecha_inicio: date(2024, 6, 1),
        fecha_fin: Some(date(2024, 5, 1)),
    })
    .expect_err("inverted window");

    assert!(errors.messages("fecha_fin")[0].contains("precedes"));
}

#[test]
fn price_list_items_are_checked_per_position() {
    let payload: PriceListPayload = serde_json::from_value(json!({
        "nombre": "Tarifas 2024",
        "fecha_inicio": "2024-01-01",
        "items": [
            { "producto_id": "uniforme", "precio_unitario": "85000" },
            { "producto_id": "uniforme", "precio_unitario": "90000" },
            { "producto_id": "morral", "precio_unitario": "-1" }
        ]
    }))
    .expect("payload deserializes");

    let errors = validate_price_list(payload).expect_err("invalid items");

    assert!(errors.messages("items.1.producto_id")[0].contains("more than once"));
    assert!(errors.messages("items.2.precio_unitario")[0].contains("negative"));
    assert!(errors.messages("items.0.producto_id").is_empty());
}

#[test]
fn receipt_totals_and_concept_types_are_checked() {
    let receipt = sample_receipt("R-0001");
    let mut payload: ReceiptPayload =
        serde_json::from_value(serde_json::to_value(&receipt).expect("serializes"))
            .expect("payload deserializes");
    payload.descuento_total = dec!(2000000);
    payload.conceptos[0].tipo = 17;

    let errors = validate_receipt(payload, &default_types()).expect_err("invalid receipt");

    assert!(!errors.messages("descuento_total").is_empty());
    assert!(errors.messages("conceptos.0.tipo")[0].contains("out of range"));
}

#[test]
fn valid_receipt_gets_a_fresh_id() {
    let receipt = sample_receipt("R-0002");
    let payload: ReceiptPayload =
        serde_json::from_value(serde_json::to_value(&receipt).expect("serializes"))
            .expect("payload deserializes");

    let validated = validate_receipt(payload, &default_types()).expect("valid receipt");

    assert_ne!(validated.id, receipt.id);
    assert_eq!(validated.numero, "R-0002");
    assert_eq!(validated.conceptos, receipt.conceptos);
}

#[test]
fn overflowing_receipt_line_is_rejected() {
    let receipt = sample_receipt("R-0003");
    let mut payload: ReceiptPayload =
        serde_json::from_value(serde_json::to_value(&receipt).expect("serializes"))
            .expect("payload deserializes");
    payload.productos[0].cantidad = 4_000_000_000;
    payload.productos[0].precio_unitario = dec!(70000000000000000000);

    let errors = validate_receipt(payload, &default_types()).expect_err("line total overflows");

    assert!(errors.messages("productos.0.cantidad")[0].contains("too large"));
}

#[test]
fn discount_payload_reports_each_bad_field() {
    let errors = DiscountPayload::from_json(&json!({
        "nombre": 12,
        "monto": { "modalidad": "porcentaje", "monto": "10" }
    }))
    .expect_err("incomplete payload");

    assert!(errors.messages("nombre")[0].starts_with("the nombre field is invalid"));
    assert_eq!(
        errors.messages("fecha_inicio"),
        ["the fecha_inicio field is required".to_string()]
    );
    assert!(errors.messages("monto").is_empty());
    assert!(errors.messages("fecha_fin").is_empty());
}

#[test]
fn receipt_payload_defaults_optional_fields() {
    let payload = ReceiptPayload::from_json(&json!({
        "numero": "R-0004",
        "fecha": "2024-03-15",
        "valor_total": "1000",
        "fecha_fin": null
    }))
    .expect("minimal receipt");

    assert_eq!(payload.status, ReceiptStatus::Pending);
    assert_eq!(payload.descuento_total, dec!(0));
    assert!(payload.conceptos.is_empty());

    let errors = ReceiptPayload::from_json(&json!("R-0004")).expect_err("not an object");
    assert_eq!(errors.fields().collect::<Vec<_>>(), ["body"]);
}
