use crate::cli::ServeArgs;
use crate::infra::{build_integrations, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use clearme::config::AppConfig;
use clearme::error::AppError;
use clearme::telemetry;
use clearme::workflows::clearance::{ClearanceServices, DepartmentRegistry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let integrations = build_integrations(&config)?;
    let services = ClearanceServices::new(&config, DepartmentRegistry::standard(), integrations);

    let app = with_service_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        base_url = %config.portal.base_url,
        records_sync = config.sync.is_some(),
        external_signing = config.signing.is_some(),
        "clearance service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
