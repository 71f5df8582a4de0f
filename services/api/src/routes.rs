use crate::infra::{deserialize_optional_date, AppState};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json, Router};
use campus_admin::billing::router::{run_blocking, JsonBody};
use campus_admin::billing::{
    billing_router, BillingService, BillingStore, ServiceError, TransitionReport, ValidationErrors,
};
use campus_admin::error::AppError;
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TransitionRunRequest {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub(crate) today: Option<NaiveDate>,
}

pub(crate) fn with_billing_routes<S>(service: Arc<BillingService<S>>) -> Router
where
    S: BillingStore + 'static,
{
    let operations = Router::new()
        .route(
            "/api/v1/transitions",
            axum::routing::post(transition_run_endpoint::<S>),
        )
        .with_state(service.clone());

    billing_router(service)
        .merge(operations)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Manual trigger for the daily run; the first failing kind fails the request.
/// The run holds a write transaction, so it executes on the blocking pool.
pub(crate) async fn transition_run_endpoint<S>(
    State(service): State<Arc<BillingService<S>>>,
    JsonBody(body): JsonBody,
) -> Result<Json<Vec<TransitionReport>>, AppError>
where
    S: BillingStore + 'static,
{
    let payload: TransitionRunRequest = serde_json::from_value(body)
        .map_err(|err| ServiceError::from(ValidationErrors::single("today", err.to_string())))?;
    let today = payload.today.unwrap_or_else(|| Local::now().date_naive());
    let reports = run_blocking(service, move |service| Ok(service.run_daily_transitions(today)))
        .await?
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(reports))
}
