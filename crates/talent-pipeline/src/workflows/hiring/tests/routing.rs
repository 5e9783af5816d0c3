use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::hiring::router::ACTOR_HEADER;
use crate::workflows::hiring::{pipeline_router, JobRepository, OverallStatus, PipelineConfig};

fn router_with(service: MemoryService) -> Router {
    pipeline_router(Arc::new(service))
}

fn request(method: Method, uri: &str, actor: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACTOR_HEADER, actor);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("serialize body")))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    if status == StatusCode::NO_CONTENT {
        return (status, Value::Null);
    }
    (status, read_json_body(response).await)
}

#[tokio::test]
async fn full_pipeline_over_http() {
    let (service, _, _) = build_service(PipelineConfig::default());
    let router = router_with(service);

    let (status, job) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/jobs",
            Some("recruiter-1"),
            Some(json!({ "title": "Platform Engineer" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let job_id = job["job_id"].as_str().expect("job id").to_string();

    let (status, rounds) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/jobs/{job_id}/rounds"),
            Some("recruiter-1"),
            Some(json!({
                "rounds": [
                    { "id": "apt", "name": "Aptitude", "kind": "aptitude", "passing_score": 60 },
                    { "id": "tech", "name": "Technical", "kind": "technical" }
                ]
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let test_id = rounds[0]["aptitude_test"]
        .as_str()
        .expect("test bound")
        .to_string();

    let (status, _) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/tests/{test_id}"),
            Some("recruiter-1"),
            Some(json!({
                "questions": [
                    {
                        "text": "2 + 2",
                        "kind": "multiple_choice",
                        "options": [
                            { "text": "4", "is_correct": true },
                            { "text": "5" }
                        ],
                        "points": 10
                    },
                    {
                        "text": "The sky is blue",
                        "kind": "true_false",
                        "options": [
                            { "text": "true", "is_correct": true },
                            { "text": "false" }
                        ],
                        "points": 10
                    }
                ],
                "passing_score_percent": 60,
                "duration_minutes": 15
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, view) = send(
        &router,
        request(Method::GET, &format!("/api/v1/tests/{test_id}"), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(view["questions"][0]["options"][0].is_string(), "answer keys stay hidden");

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/applications"),
            Some("cand-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/applications/cand-1/screen"),
            Some("recruiter-1"),
            Some(json!({ "accept": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, progress) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/candidates/cand-1/admit"),
            Some("recruiter-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["current_round_id"], "apt");

    let (status, result) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/tests/{test_id}/attempts"),
            Some("cand-1"),
            Some(json!({ "candidate_id": "cand-1", "answers": { "0": 0, "1": "true" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["percentage"], 100);
    assert_eq!(result["passed"], true);

    let (status, progress) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/jobs/{job_id}/candidates/cand-1/progress"),
            Some("cand-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["overall_status"], "in_process");
    assert_eq!(progress["current_round"]["round_id"], "tech");
    assert_eq!(progress["application"]["current_stage"], "Technical");
    assert_eq!(progress["mirror_in_sync"], true);

    let (status, hired) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/candidates/cand-1/rounds/tech/outcome"),
            Some("recruiter-1"),
            Some(json!({ "status": "passed", "feedback": "great pairing session" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hired["overall_status"], "hired");

    let (status, applications) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/candidates/cand-1/applications",
            Some("cand-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(applications[0]["overall_status"], "hired");
    assert_eq!(applications[0]["status"], "accepted");
}

#[tokio::test]
async fn missing_actor_header_is_unauthorized() {
    let (service, _, _) = build_service(PipelineConfig::default());
    let router = router_with(service);

    let (status, body) = send(
        &router,
        request(
            Method::POST,
            "/api/v1/jobs",
            None,
            Some(json!({ "title": "Anonymous" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"]
        .as_str()
        .unwrap_or_default()
        .contains(ACTOR_HEADER));
}

#[tokio::test]
async fn service_errors_map_to_status_codes() {
    let (service, _, _) = build_service(PipelineConfig::default());
    let hiring = seeded_job(&service, standard_rounds());
    admitted(&service, &hiring.job, &candidate("cand-2"));
    let job_id = hiring.job.to_string();
    let router = router_with(service);

    let (status, _) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/jobs/{job_id}/rounds"),
            Some("recruiter-2"),
            Some(json!({ "rounds": [] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &router,
        request(
            Method::PUT,
            &format!("/api/v1/jobs/{job_id}/rounds"),
            Some("recruiter-1"),
            Some(json!({ "rounds": [ { "name": "Quiz", "kind": "aptitude" } ] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["retryable"], false);

    let (status, _) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/jobs/job-missing/candidates/cand-2/progress",
            Some("recruiter-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/candidates/cand-2/finalize"),
            Some("recruiter-1"),
            Some(json!({ "decision": "hired" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/candidates/cand-2/finalize"),
            Some("recruiter-1"),
            Some(json!({ "decision": "rejected" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &router,
        request(
            Method::DELETE,
            &format!("/api/v1/jobs/{job_id}/applications/cand-2"),
            Some("cand-2"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn reconcile_and_pipeline_view_are_owner_only() {
    let (service, _, _) = build_service(PipelineConfig::default());
    let hiring = seeded_job(&service, standard_rounds());
    let job_id = hiring.job.to_string();
    let router = router_with(service);

    let (status, report) = send(
        &router,
        request(
            Method::POST,
            &format!("/api/v1/jobs/{job_id}/reconcile"),
            Some("recruiter-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["checked"], 0);

    let (status, _) = send(
        &router,
        request(
            Method::GET,
            &format!("/api/v1/jobs/{job_id}/pipeline"),
            Some("recruiter-2"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn attempts_are_submitted_by_the_candidate_only() {
    let (service, store, _) = build_service(PipelineConfig::default());
    let hiring = seeded_job(&service, standard_rounds());
    let victim = candidate("cand-3");
    admitted(&service, &hiring.job, &victim);
    let uri = format!("/api/v1/tests/{}/attempts", hiring.test);
    let router = router_with(service);
    let wrong_answers = json!({ "candidate_id": "cand-3", "answers": { "0": 1, "1": 1 } });

    let (status, _) = send(
        &router,
        request(Method::POST, &uri, None, Some(wrong_answers.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &router,
        request(Method::POST, &uri, Some("cand-4"), Some(wrong_answers)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let progress = store
        .fetch_progress(&hiring.job, &victim)
        .expect("store reachable")
        .expect("progress kept");
    assert_eq!(progress.overall_status, OverallStatus::Applied);
    assert_eq!(store.attempt_count(), 0);

    let (status, result) = send(
        &router,
        request(
            Method::POST,
            &uri,
            Some("cand-3"),
            Some(json!({ "answers": { "0": 0, "1": 0 } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["passed"], true);
}

#[tokio::test]
async fn progress_and_applications_are_private_to_candidate_and_owner() {
    let (service, _, _) = build_service(PipelineConfig::default());
    let hiring = seeded_job(&service, standard_rounds());
    admitted(&service, &hiring.job, &candidate("cand-5"));
    let progress_uri = format!("/api/v1/jobs/{}/candidates/cand-5/progress", hiring.job);
    let router = router_with(service);

    let (status, _) = send(&router, request(Method::GET, &progress_uri, None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &router,
        request(Method::GET, &progress_uri, Some("cand-6"), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for reader in ["cand-5", "recruiter-1"] {
        let (status, _) = send(
            &router,
            request(Method::GET, &progress_uri, Some(reader), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{reader} reads progress");
    }

    let (status, listed) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/candidates/cand-5/applications",
            Some("recruiter-2"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(0));

    let (status, listed) = send(
        &router,
        request(
            Method::GET,
            "/api/v1/candidates/cand-5/applications",
            Some("recruiter-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}
