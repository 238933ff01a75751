use crate::cli::ServeArgs;
use crate::infra::{seed_demo_portal, AppState};
use crate::routes::with_portal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Local;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;
use vaxportal::config::AppConfig;
use vaxportal::error::AppError;
use vaxportal::telemetry;
use vaxportal::workflows::vaccination::{InMemoryVaccinationStore, VaccinationService};

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

    let store = Arc::new(InMemoryVaccinationStore::new());
    let portal_service = Arc::new(VaccinationService::new(store, config.portal.clone()));
    if args.seed_demo {
        seed_demo_portal(&portal_service, Local::now().date_naive())?;
        info!("demo roster and drives loaded");
    }

    let app = with_portal_routes(portal_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        lead_time_days = config.portal.lead_time_days,
        "vaccination portal ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
