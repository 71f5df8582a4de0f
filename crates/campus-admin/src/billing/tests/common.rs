use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::Value;

use crate::billing::domain::{
    Discount, DiscountAmount, EntityId, PaymentConcept, PriceList, PriceListItem,
};
use crate::billing::lifecycle::{Transition, Window, WindowedEntity};
use crate::billing::locale::Locale;
use crate::billing::receipts::{
    ConceptLine, DiscountLine, PaymentMethodLine, PaymentReceipt, PriceListLine, ProductLine,
    ReceiptIncludes, ReceiptStatus,
};
use crate::billing::registry::{RegistrySnapshot, TypeEntry, DEFAULT_CONCEPT_TYPES};
use crate::billing::repository::{
    ConceptRepository, ReceiptRepository, RegistryStore, RepositoryError, TransitionOutcome,
    WindowedRepository,
};
use crate::billing::service::BillingService;
use crate::storage::MemoryStore;

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn window(inicio: NaiveDate, fin: Option<NaiveDate>) -> Window {
    Window::new(inicio, fin).expect("ordered window")
}

pub(super) fn default_entries() -> Vec<TypeEntry> {
    DEFAULT_CONCEPT_TYPES
        .iter()
        .enumerate()
        .map(|(index, label)| TypeEntry {
            index: index as u32,
            label: label.to_string(),
            active: true,
        })
        .collect()
}

pub(super) fn default_types() -> RegistrySnapshot {
    RegistrySnapshot::from_entries(default_entries())
}

pub(super) fn build_service() -> (BillingService<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = BillingService::new(store.clone(), Locale::Es).expect("service builds");
    (service, store)
}

pub(super) fn approved_discount(inicio: NaiveDate, fin: Option<NaiveDate>) -> Discount {
    let mut discount = Discount::propose(
        "Descuento hermanos",
        DiscountAmount::Porcentaje(dec!(10)),
        window(inicio, fin),
    );
    discount.approve().expect("proposed discounts can be approved");
    discount
}

pub(super) fn approved_price_list(inicio: NaiveDate, fin: Option<NaiveDate>) -> PriceList {
    let mut price_list = PriceList::draft(
        "Tarifas 2024",
        window(inicio, fin),
        vec![PriceListItem {
            producto_id: "uniforme".to_string(),
            precio_unitario: dec!(85000),
        }],
    );
    price_list.approve().expect("drafts can be approved");
    price_list
}

pub(super) fn stored<E>(store: &MemoryStore, id: &EntityId) -> E
where
    E: WindowedEntity,
    MemoryStore: WindowedRepository<E>,
{
    <MemoryStore as WindowedRepository<E>>::fetch(store, id)
        .expect("fetch succeeds")
        .expect("entity present")
}

pub(super) fn sample_receipt(numero: &str) -> PaymentReceipt {
    PaymentReceipt {
        id: EntityId::generate(),
        numero: numero.to_string(),
        fecha: date(2024, 3, 15),
        status: ReceiptStatus::Paid,
        valor_total: dec!(1500000),
        descuento_total: dec!(150000),
        conceptos: vec![ConceptLine {
            concepto_id: EntityId::from("concepto-pension"),
            nombre: "Pensión marzo".to_string(),
            tipo: 2,
            cantidad: 2,
            precio_unitario: dec!(600000),
            subtotal: dec!(1200000),
        }],
        descuentos: vec![DiscountLine {
            descuento_id: EntityId::from("descuento-hermanos"),
            nombre: "Descuento hermanos".to_string(),
            valor: dec!(150000),
        }],
        listas_precio: vec![PriceListLine {
            lista_precio_id: EntityId::from("lista-2024"),
            nombre: "Tarifas 2024".to_string(),
            cantidad: 1,
            precio_unitario: dec!(215000),
            subtotal: dec!(215000),
        }],
        productos: vec![ProductLine {
            producto_id: "uniforme".to_string(),
            nombre: "Uniforme".to_string(),
            cantidad: 1,
            precio_unitario: dec!(85000),
            subtotal: dec!(85000),
        }],
        medios_pago: vec![PaymentMethodLine {
            medio_pago_id: "efectivo".to_string(),
            nombre: "Efectivo".to_string(),
            valor: dec!(1350000),
            referencia: Some("caja-01".to_string()),
        }],
    }
}

/// Serves the default concept types and fails every other call.
pub(super) struct UnavailableStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

impl<E: WindowedEntity> WindowedRepository<E> for UnavailableStore {
    fn insert(&self, _entity: E) -> Result<E, RepositoryError> {
        Err(offline())
    }

    fn update(&self, _entity: E) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn fetch(&self, _id: &EntityId) -> Result<Option<E>, RepositoryError> {
        Err(offline())
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        Err(offline())
    }

    fn apply_transitions(
        &self,
        _transitions: &[Transition],
        _now: NaiveDate,
    ) -> Result<Vec<TransitionOutcome>, RepositoryError> {
        Err(offline())
    }
}

impl ConceptRepository for UnavailableStore {
    fn insert_concept(&self, _concept: PaymentConcept) -> Result<PaymentConcept, RepositoryError> {
        Err(offline())
    }

    fn fetch_concept(&self, _id: &EntityId) -> Result<Option<PaymentConcept>, RepositoryError> {
        Err(offline())
    }

    fn list_concepts(&self) -> Result<Vec<PaymentConcept>, RepositoryError> {
        Err(offline())
    }
}

impl ReceiptRepository for UnavailableStore {
    fn insert_receipt(&self, _receipt: PaymentReceipt) -> Result<PaymentReceipt, RepositoryError> {
        Err(offline())
    }

    fn fetch_receipt(
        &self,
        _id: &EntityId,
        _includes: &ReceiptIncludes,
    ) -> Result<Option<PaymentReceipt>, RepositoryError> {
        Err(offline())
    }
}

impl RegistryStore for UnavailableStore {
    fn load_types(&self) -> Result<Vec<TypeEntry>, RepositoryError> {
        Ok(default_entries())
    }

    fn append_type(&self, _label: &str) -> Result<Option<TypeEntry>, RepositoryError> {
        Err(offline())
    }

    fn set_type_active(&self, _index: u32, _active: bool) -> Result<(), RepositoryError> {
        Err(offline())
    }
}

/// Parks inside `apply_transitions` until released, so a second run can be
/// started while the first one is still in flight.
pub(super) struct BlockingRepository {
    inner: MemoryStore,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl BlockingRepository {
    pub(super) fn new(inner: MemoryStore) -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let repository = Self {
            inner,
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        (repository, entered_rx, release_tx)
    }
}

impl WindowedRepository<Discount> for BlockingRepository {
    fn insert(&self, entity: Discount) -> Result<Discount, RepositoryError> {
        WindowedRepository::<Discount>::insert(&self.inner, entity)
    }

    fn update(&self, entity: Discount) -> Result<(), RepositoryError> {
        WindowedRepository::<Discount>::update(&self.inner, entity)
    }

    fn fetch(&self, id: &EntityId) -> Result<Option<Discount>, RepositoryError> {
        WindowedRepository::<Discount>::fetch(&self.inner, id)
    }

    fn list(&self) -> Result<Vec<Discount>, RepositoryError> {
        WindowedRepository::<Discount>::list(&self.inner)
    }

    fn apply_transitions(
        &self,
        transitions: &[Transition],
        now: NaiveDate,
    ) -> Result<Vec<TransitionOutcome>, RepositoryError> {
        self.entered
            .lock()
            .expect("sender mutex poisoned")
            .send(())
            .expect("test is listening");
        self.release
            .lock()
            .expect("receiver mutex poisoned")
            .recv()
            .expect("test releases the run");
        WindowedRepository::<Discount>::apply_transitions(&self.inner, transitions, now)
    }
}

pub(super) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serializable body")))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
