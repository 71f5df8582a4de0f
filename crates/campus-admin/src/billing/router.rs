use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::domain::EntityId;
use super::lifecycle::LifecycleError;
use super::receipts::ReceiptIncludes;
use super::registry::RegistryError;
use super::repository::{BillingStore, RepositoryError};
use super::service::{BillingService, ServiceError};
use super::validation::{
    ConceptPayload, DiscountPayload, FieldReader, PriceListPayload, ReceiptPayload,
    ValidationErrors,
};

/// Router builder exposing the billing endpoints.
pub fn billing_router<S>(service: Arc<BillingService<S>>) -> Router
where
    S: BillingStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/payment-concepts",
            get(list_concepts_handler::<S>).post(create_concept_handler::<S>),
        )
        .route(
            "/api/v1/payment-concepts/:concept_id",
            get(concept_handler::<S>),
        )
        .route(
            "/api/v1/concept-types",
            get(concept_types_handler::<S>).post(append_concept_type_handler::<S>),
        )
        .route(
            "/api/v1/discounts",
            get(list_discounts_handler::<S>).post(propose_discount_handler::<S>),
        )
        .route(
            "/api/v1/discounts/:discount_id/approve",
            post(approve_discount_handler::<S>),
        )
        .route(
            "/api/v1/discounts/:discount_id/reject",
            post(reject_discount_handler::<S>),
        )
        .route(
            "/api/v1/price-lists",
            get(list_price_lists_handler::<S>).post(draft_price_list_handler::<S>),
        )
        .route(
            "/api/v1/price-lists/:price_list_id/approve",
            post(approve_price_list_handler::<S>),
        )
        .route("/api/v1/receipts", post(record_receipt_handler::<S>))
        .route("/api/v1/receipts/:receipt_id", get(receipt_handler::<S>))
        .route("/api/v1/locale", post(switch_locale_handler::<S>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReceiptQuery {
    #[serde(default)]
    pub(crate) include: Option<String>,
}

/// Raw JSON body; malformed bodies are rejected with the same 422 shape as
/// field validation failures.
pub struct JsonBody(pub Value);

#[async_trait]
impl<T: Send + Sync> FromRequest<T> for JsonBody {
    type Rejection = Response;

    async fn from_request(req: Request, state: &T) -> Result<Self, Self::Rejection> {
        match Json::<Value>::from_request(req, state).await {
            Ok(Json(body)) => Ok(Self(body)),
            Err(rejection) => Err(validation_response(&ValidationErrors::single(
                "body",
                rejection.body_text(),
            ))),
        }
    }
}

/// Runs synchronous service work on the blocking pool.
pub async fn run_blocking<S, T, F>(
    service: Arc<BillingService<S>>,
    work: F,
) -> Result<T, ServiceError>
where
    S: BillingStore + 'static,
    T: Send + 'static,
    F: FnOnce(&BillingService<S>) -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&service))
        .await
        .map_err(|err| ServiceError::Interrupted(err.to_string()))?
}

type Shared<S> = State<Arc<BillingService<S>>>;

fn respond<T: Serialize>(status: StatusCode, result: Result<T, ServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_concept_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    JsonBody(body): JsonBody,
) -> Response {
    let payload = match ConceptPayload::from_json(&body) {
        Ok(payload) => payload,
        Err(errors) => return validation_response(&errors),
    };
    let result = run_blocking(service, move |service| {
        let concept = service.create_concept(&payload)?;
        service.concept_view(&concept.id)
    })
    .await;
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn concept_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    Path(concept_id): Path<String>,
) -> Response {
    let id = EntityId(concept_id);
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.concept_view(&id)).await,
    )
}

pub(crate) async fn list_concepts_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
) -> Response {
    respond(
        StatusCode::OK,
        run_blocking(service, |service| service.concepts()).await,
    )
}

pub(crate) async fn concept_types_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
) -> Response {
    (StatusCode::OK, Json(service.concept_types())).into_response()
}

pub(crate) async fn append_concept_type_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    JsonBody(body): JsonBody,
) -> Response {
    let mut reader = FieldReader::new(&body);
    let label = reader.required::<String>("label");
    let label = match reader.finish(|| label) {
        Ok(label) => label,
        Err(errors) => return validation_response(&errors),
    };
    respond(
        StatusCode::CREATED,
        run_blocking(service, move |service| service.append_concept_type(&label)).await,
    )
}

pub(crate) async fn list_discounts_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
) -> Response {
    let today = Local::now().date_naive();
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.discounts(today)).await,
    )
}

pub(crate) async fn propose_discount_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    JsonBody(body): JsonBody,
) -> Response {
    let payload = match DiscountPayload::from_json(&body) {
        Ok(payload) => payload,
        Err(errors) => return validation_response(&errors),
    };
    respond(
        StatusCode::CREATED,
        run_blocking(service, move |service| service.propose_discount(payload)).await,
    )
}

pub(crate) async fn approve_discount_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    Path(discount_id): Path<String>,
) -> Response {
    let id = EntityId(discount_id);
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.approve_discount(&id)).await,
    )
}

pub(crate) async fn reject_discount_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    Path(discount_id): Path<String>,
) -> Response {
    let id = EntityId(discount_id);
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.reject_discount(&id)).await,
    )
}

pub(crate) async fn list_price_lists_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
) -> Response {
    let today = Local::now().date_naive();
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.price_lists(today)).await,
    )
}

pub(crate) async fn draft_price_list_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    JsonBody(body): JsonBody,
) -> Response {
    let payload = match PriceListPayload::from_json(&body) {
        Ok(payload) => payload,
        Err(errors) => return validation_response(&errors),
    };
    respond(
        StatusCode::CREATED,
        run_blocking(service, move |service| service.draft_price_list(payload)).await,
    )
}

pub(crate) async fn approve_price_list_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    Path(price_list_id): Path<String>,
) -> Response {
    let id = EntityId(price_list_id);
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.approve_price_list(&id)).await,
    )
}

pub(crate) async fn record_receipt_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    JsonBody(body): JsonBody,
) -> Response {
    let payload = match ReceiptPayload::from_json(&body) {
        Ok(payload) => payload,
        Err(errors) => return validation_response(&errors),
    };
    respond(
        StatusCode::CREATED,
        run_blocking(service, move |service| service.record_receipt(payload)).await,
    )
}

pub(crate) async fn receipt_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    Path(receipt_id): Path<String>,
    Query(query): Query<ReceiptQuery>,
) -> Response {
    let includes = match query.include.as_deref().map(ReceiptIncludes::parse) {
        Some(Ok(includes)) => includes,
        Some(Err(errors)) => return validation_response(&errors),
        None => ReceiptIncludes::none(),
    };

    let id = EntityId(receipt_id);
    respond(
        StatusCode::OK,
        run_blocking(service, move |service| service.receipt_view(&id, &includes)).await,
    )
}

pub(crate) async fn switch_locale_handler<S: BillingStore + 'static>(
    State(service): Shared<S>,
    JsonBody(body): JsonBody,
) -> Response {
    let mut reader = FieldReader::new(&body);
    let requested = reader.required::<String>("locale");
    let requested = match reader.finish(|| requested) {
        Ok(requested) => requested,
        Err(errors) => return validation_response(&errors),
    };

    match service.switch_locale(&requested) {
        Ok(locale) => (StatusCode::OK, Json(json!({ "locale": locale }))).into_response(),
        Err(error) => error_response(error),
    }
}

fn validation_response(errors: &ValidationErrors) -> Response {
    let payload = json!({
        "message": errors.to_string(),
        "errors": errors,
    });
    (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
}

pub(crate) fn error_response(error: ServiceError) -> Response {
    let status = match &error {
        ServiceError::Validation(errors) => return validation_response(errors),
        ServiceError::Lifecycle(LifecycleError::InvalidTransition { .. }) => StatusCode::CONFLICT,
        ServiceError::Lifecycle(LifecycleError::InvertedWindow { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::Registry(RegistryError::BlankLabel) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Registry(RegistryError::UnknownIndex(_)) => StatusCode::NOT_FOUND,
        ServiceError::Repository(RepositoryError::NotFound)
        | ServiceError::Registry(RegistryError::Repository(RepositoryError::NotFound)) => {
            StatusCode::NOT_FOUND
        }
        ServiceError::Repository(RepositoryError::Conflict) | ServiceError::DuplicateType(_) => {
            StatusCode::CONFLICT
        }
        ServiceError::Repository(_)
        | ServiceError::Registry(_)
        | ServiceError::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}
