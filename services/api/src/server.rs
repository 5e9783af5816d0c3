use crate::cli::ServeArgs;
use crate::infra::{spawn_notification_worker, AppState, ChannelNotifier};
use crate::routes::with_pipeline_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use talent_pipeline::config::AppConfig;
use talent_pipeline::error::AppError;
use talent_pipeline::telemetry;
use talent_pipeline::workflows::hiring::{InMemoryPipelineStore, PipelineService};
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

    let store = Arc::new(InMemoryPipelineStore::default());
    let (notifier, outbox) = ChannelNotifier::new();
    spawn_notification_worker(outbox);
    let pipeline_service = Arc::new(PipelineService::new(
        store.clone(),
        Arc::new(notifier),
        store,
        config.pipeline,
    ));

    let app = with_pipeline_routes(pipeline_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        mirror_retries = config.pipeline.mirror_retry_attempts,
        "talent pipeline service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
