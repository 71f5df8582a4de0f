use crate::cli::ServeArgs;
use crate::infra::{load_config, AppState};
use crate::routes::with_billing_routes;
use crate::scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use campus_admin::billing::{BillingService, BillingStore};
use campus_admin::config::{AppConfig, StorageConfig};
use campus_admin::error::AppError;
use campus_admin::storage::{MemoryStore, SqliteStore};
use campus_admin::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = load_config(args.store.database.take())?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    match config.storage.clone() {
        StorageConfig::Memory => serve(config, Arc::new(MemoryStore::new())).await,
        StorageConfig::Sqlite { path } => {
            let store = SqliteStore::open(&path)?;
            info!(path = %path.display(), "sqlite storage opened");
            serve(config, Arc::new(store)).await
        }
    }
}

async fn serve<S>(config: AppConfig, store: Arc<S>) -> Result<(), AppError>
where
    S: BillingStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let billing_service = Arc::new(BillingService::new(store, config.locale)?);

    if config.scheduler.enabled {
        scheduler::spawn(billing_service.clone(), config.scheduler.interval);
    }

    let app = with_billing_routes(billing_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        locale = config.locale.code(),
        scheduler = config.scheduler.enabled,
        "campus billing service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
