use crate::cli::ServeArgs;
use crate::infra::{load_vendor_directory, AppState, InMemoryJobRepository, TracingNotifier};
use crate::routes::with_fulfillment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use print_dispatch::config::AppConfig;
use print_dispatch::error::AppError;
use print_dispatch::telemetry;
use print_dispatch::workflows::fulfillment::{FulfillmentService, TimeoutScheduler};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let vendors = Arc::new(load_vendor_directory(config.vendors_csv.as_deref())?);
    let jobs = Arc::new(InMemoryJobRepository::default());
    let scheduler = TimeoutScheduler::new(Handle::current());
    let service = FulfillmentService::new(
        jobs,
        vendors.clone(),
        Arc::new(TracingNotifier),
        scheduler.clone(),
        config.dispatch.clone(),
    );
    service.resume_deadlines()?;

    let app = with_fulfillment_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        vendors = vendors.len(),
        decision_window_secs = config.dispatch.decision_window.as_secs(),
        "print dispatch service ready"
    );

    let served = axum::serve(listener, app).await;
    scheduler.cancel_all();
    served?;
    Ok(())
}
