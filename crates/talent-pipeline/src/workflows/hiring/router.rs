use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::aptitude::{Answer, TestSetup};
use super::domain::{ActorId, CandidateId, FinalDecision, JobId, RoundId, TestId};
use super::pipeline::RoundDraft;
use super::progress::RoundOutcome;
use super::repository::{NotificationDispatcher, OwnershipCheck, PipelineStore};
use super::service::{ErrorClass, PipelineService, PipelineServiceError};

pub const ACTOR_HEADER: &str = "x-actor-id";

type SharedService<S, N, O> = Arc<PipelineService<S, N, O>>;

/// Router exposing pipeline administration, candidate progress, and aptitude testing endpoints.
pub fn pipeline_router<S, N, O>(service: SharedService<S, N, O>) -> Router
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    Router::new()
        .route("/api/v1/jobs", post(create_job_handler::<S, N, O>))
        .route("/api/v1/jobs/:job_id", delete(delete_job_handler::<S, N, O>))
        .route(
            "/api/v1/jobs/:job_id/rounds",
            put(define_pipeline_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/rounds/reorder",
            post(reorder_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/rounds/:round_id",
            delete(delete_round_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/pipeline",
            get(pipeline_view_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/reconcile",
            post(reconcile_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications",
            post(apply_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications/:candidate_id",
            delete(withdraw_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/applications/:candidate_id/screen",
            post(screen_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/candidates/:candidate_id/admit",
            post(admit_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/candidates/:candidate_id/progress",
            get(progress_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/candidates/:candidate_id/rounds/:round_id/outcome",
            post(outcome_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/candidates/:candidate_id/hold",
            post(hold_handler::<S, N, O>),
        )
        .route(
            "/api/v1/jobs/:job_id/candidates/:candidate_id/finalize",
            post(finalize_handler::<S, N, O>),
        )
        .route(
            "/api/v1/tests/:test_id",
            get(candidate_test_handler::<S, N, O>).put(configure_test_handler::<S, N, O>),
        )
        .route(
            "/api/v1/tests/:test_id/attempts",
            post(submit_attempt_handler::<S, N, O>),
        )
        .route(
            "/api/v1/tests/:test_id/attempts/:candidate_id/review",
            post(review_handler::<S, N, O>),
        )
        .route(
            "/api/v1/candidates/:candidate_id/applications",
            get(candidate_applications_handler::<S, N, O>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateJobRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DefinePipelineRequest {
    pub rounds: Vec<RoundDraft>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReorderRequest {
    pub round_ids: Vec<RoundId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScreenRequest {
    pub accept: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FinalizeRequest {
    pub decision: FinalDecision,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitAttemptRequest {
    /// Defaults to the caller; naming anyone else is refused.
    #[serde(default)]
    pub candidate_id: Option<CandidateId>,
    #[serde(default)]
    pub answers: BTreeMap<usize, Answer>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewRequest {
    pub awards: BTreeMap<usize, u32>,
}

/// Status code for a service failure.
pub fn status_for(error: &PipelineServiceError) -> StatusCode {
    match error.class() {
        ErrorClass::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::NotFound => StatusCode::NOT_FOUND,
        ErrorClass::Forbidden => StatusCode::FORBIDDEN,
        ErrorClass::Conflict => StatusCode::CONFLICT,
        ErrorClass::Retryable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: PipelineServiceError) -> Response {
    let status = status_for(&error);
    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_retryable(),
    });
    (status, Json(payload)).into_response()
}

fn respond<T: serde::Serialize>(
    status: StatusCode,
    result: Result<T, PipelineServiceError>,
) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

fn actor_from(headers: &HeaderMap) -> Result<ActorId, Response> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ActorId::new)
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {ACTOR_HEADER} header") });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

pub(crate) async fn create_job_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.create_job(&actor, &request.title) {
        Ok(job) => {
            let payload = json!({
                "job_id": job.id,
                "title": job.title,
                "owner": job.owner,
                "created_at": job.created_at,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn delete_job_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.delete_job(&actor, &JobId(job_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn define_pipeline_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(request): Json<DefinePipelineRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.define_pipeline(&actor, &JobId(job_id), request.rounds),
    )
}

pub(crate) async fn reorder_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.reorder_rounds(&actor, &JobId(job_id), &request.round_ids),
    )
}

pub(crate) async fn delete_round_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, round_id)): Path<(String, String)>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.delete_round(&actor, &JobId(job_id), &RoundId(round_id)),
    )
}

pub(crate) async fn pipeline_view_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.pipeline_view(&actor, &JobId(job_id)))
}

pub(crate) async fn reconcile_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(StatusCode::OK, service.reconcile(&actor, &JobId(job_id)))
}

/// The applying candidate is the caller.
pub(crate) async fn apply_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let candidate = CandidateId(actor.0);
    respond(
        StatusCode::CREATED,
        service
            .apply(&JobId(job_id), &candidate)
            .map(|record| record.status_view()),
    )
}

pub(crate) async fn screen_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id)): Path<(String, String)>,
    Json(request): Json<ScreenRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service
            .screen_application(
                &actor,
                &JobId(job_id),
                &CandidateId(candidate_id),
                request.accept,
            )
            .map(|record| record.status_view()),
    )
}

pub(crate) async fn withdraw_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id)): Path<(String, String)>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.withdraw(&actor, &JobId(job_id), &CandidateId(candidate_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn admit_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id)): Path<(String, String)>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.admit_candidate(&actor, &JobId(job_id), &CandidateId(candidate_id)),
    )
}

pub(crate) async fn progress_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id)): Path<(String, String)>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.get_progress(&actor, &JobId(job_id), &CandidateId(candidate_id)),
    )
}

pub(crate) async fn outcome_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id, round_id)): Path<(String, String, String)>,
    Json(outcome): Json<RoundOutcome>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.record_round_outcome(
            &actor,
            &JobId(job_id),
            &CandidateId(candidate_id),
            &RoundId(round_id),
            outcome,
        ),
    )
}

pub(crate) async fn hold_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id)): Path<(String, String)>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.hold_for_decision(&actor, &JobId(job_id), &CandidateId(candidate_id)),
    )
}

pub(crate) async fn finalize_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((job_id, candidate_id)): Path<(String, String)>,
    Json(request): Json<FinalizeRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.finalize(
            &actor,
            &JobId(job_id),
            &CandidateId(candidate_id),
            request.decision,
        ),
    )
}

pub(crate) async fn configure_test_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
    Json(setup): Json<TestSetup>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.configure_test(&actor, &TestId(test_id), setup),
    )
}

pub(crate) async fn candidate_test_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    Path(test_id): Path<String>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    respond(StatusCode::OK, service.candidate_test(&TestId(test_id)))
}

/// The submitting candidate is the caller.
pub(crate) async fn submit_attempt_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(test_id): Path<String>,
    Json(request): Json<SubmitAttemptRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let candidate = request
        .candidate_id
        .unwrap_or_else(|| CandidateId(actor.0.clone()));
    respond(
        StatusCode::OK,
        service.submit_aptitude_attempt(&actor, &TestId(test_id), &candidate, request.answers),
    )
}

pub(crate) async fn review_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path((test_id, candidate_id)): Path<(String, String)>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.review_short_answers(
            &actor,
            &TestId(test_id),
            &CandidateId(candidate_id),
            request.awards,
        ),
    )
}

pub(crate) async fn candidate_applications_handler<S, N, O>(
    State(service): State<SharedService<S, N, O>>,
    headers: HeaderMap,
    Path(candidate_id): Path<String>,
) -> Response
where
    S: PipelineStore + 'static,
    N: NotificationDispatcher + 'static,
    O: OwnershipCheck + 'static,
{
    let actor = match actor_from(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    respond(
        StatusCode::OK,
        service.candidate_applications(&actor, &CandidateId(candidate_id)),
    )
}
