use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use talent_pipeline::workflows::hiring::{
    pipeline_router, NotificationDispatcher, OwnershipCheck, PipelineService, PipelineStore,
};

pub(crate) fn with_pipeline_routes<S, N, O>(service: Arc<PipelineService<S, N, O>>) -> axum::Router
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    pipeline_router(service)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::ChannelNotifier;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use talent_pipeline::workflows::hiring::{InMemoryPipelineStore, PipelineConfig};
    use tower::ServiceExt;

    fn app(readiness: Arc<AtomicBool>) -> axum::Router {
        let store = Arc::new(InMemoryPipelineStore::default());
        let (notifier, _outbox) = ChannelNotifier::new();
        let service = Arc::new(PipelineService::new(
            store.clone(),
            Arc::new(notifier),
            store,
            PipelineConfig::default(),
        ));
        let state = AppState {
            readiness,
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_pipeline_routes(service).layer(Extension(state))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request builds")
    }

    fn get_as(uri: &str, actor: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-actor-id", actor)
            .body(Body::empty())
            .expect("request builds")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let readiness = Arc::new(AtomicBool::new(false));
        let router = app(readiness.clone());

        let response = router
            .clone()
            .oneshot(get("/ready"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.store(true, Ordering::Release);
        let response = router.oneshot(get("/ready")).await.expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn pipeline_routes_are_mounted_alongside_health_checks() {
        let router = app(Arc::new(AtomicBool::new(true)));

        let response = router
            .clone()
            .oneshot(get_as("/api/v1/candidates/nobody/applications", "nobody"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(get("/api/v1/candidates/nobody/applications"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .oneshot(get_as(
                "/api/v1/jobs/job-missing/candidates/nobody/progress",
                "nobody",
            ))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
