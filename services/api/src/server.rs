use crate::cli::ServeArgs;
use crate::infra::{
    seeded_registry, AppState, InMemoryMessageRepository, InMemoryScheduleRepository,
    InMemoryTransferRepository, LoggingEventPublisher,
};
use crate::routes::with_ops_routes;
use axum::{Extension, Router};
use axum_prometheus::PrometheusMetricLayer;
use prison_ops::config::AppConfig;
use prison_ops::error::AppError;
use prison_ops::telemetry;
use prison_ops::workflows::messaging::{messaging_router, MessagingService};
use prison_ops::workflows::transfer::{transfer_router, TransferWorkflowService};
use prison_ops::workflows::visitation::{visit_router, VisitSchedulingService};
use prison_ops::workflows::WorkflowError;
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

    let app = workflow_routes(&config)?
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        daily_visit_capacity = config.visitation.daily_capacity,
        "prison operations service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Wire the three engines over shared in-memory stores.
pub(crate) fn workflow_routes(config: &AppConfig) -> Result<Router, AppError> {
    let (prisons, inmates) = seeded_registry().map_err(WorkflowError::from)?;

    let transfers = Arc::new(TransferWorkflowService::new(
        Arc::new(InMemoryTransferRepository::default()),
        inmates.clone(),
        prisons,
        Arc::new(LoggingEventPublisher::default()),
        config.transfers,
    ));
    let visits = Arc::new(VisitSchedulingService::new(
        Arc::new(InMemoryScheduleRepository::default()),
        inmates,
        config.visitation,
    ));
    let messages = Arc::new(MessagingService::new(Arc::new(
        InMemoryMessageRepository::default(),
    )));

    let router = transfer_router(transfers)
        .merge(visit_router(visits))
        .merge(messaging_router(messages));

    Ok(with_ops_routes(router))
}
