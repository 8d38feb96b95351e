use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::applications::ApplicationReview;
use super::domain::{
    Actor, CompletionRequest, LifecycleError, RequestChanges, RequestDraft, RequestId, Role,
    UserId,
};
use super::repository::{RepositoryError, RequestFilter, RequestRepository, UserDirectory};
use super::service::{HelpRequestService, MatchServiceError};

/// Header carrying the authenticated user id, set by the upstream auth layer.
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the authenticated user's role.
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, D> = Arc<HelpRequestService<R, D>>;

/// Router builder exposing the request lifecycle over HTTP.
pub fn request_router<R, D>(service: SharedService<R, D>) -> Router
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/requests",
            post(create_handler::<R, D>).get(list_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id",
            get(view_handler::<R, D>)
                .patch(update_handler::<R, D>)
                .delete(delete_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/apply",
            post(apply_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/withdraw",
            post(withdraw_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/reject",
            post(reject_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/review",
            post(review_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/assign",
            post(assign_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/auto-assign",
            post(auto_assign_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/complete",
            post(complete_handler::<R, D>),
        )
        .route(
            "/api/v1/requests/:request_id/cancel",
            post(cancel_handler::<R, D>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApplyBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReasonBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ReviewBody {
    volunteer_id: UserId,
    decision: ApplicationReview,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AssignBody {
    volunteer_id: UserId,
}

pub(crate) async fn create_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    headers: HeaderMap,
    axum::Json(draft): axum::Json<RequestDraft>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.create(&actor, draft) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn list_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Query(filter): Query<RequestFilter>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    match service.list(&filter) {
        Ok(summaries) => (StatusCode::OK, axum::Json(summaries)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn view_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    match service.view(&RequestId(request_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn update_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(changes): axum::Json<RequestChanges>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.update_details(&RequestId(request_id), &actor, changes) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn delete_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.delete(&RequestId(request_id), &actor) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn apply_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ApplyBody>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.apply(&RequestId(request_id), &actor, &body.message) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn withdraw_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.withdraw(&RequestId(request_id), &actor) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn reject_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ReasonBody>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.reject(&RequestId(request_id), &actor, &body.reason) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn review_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ReviewBody>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let id = RequestId(request_id);
    match service.review_application(&id, &actor, &body.volunteer_id, body.decision) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn assign_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<AssignBody>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.assign(&RequestId(request_id), &actor, &body.volunteer_id) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn auto_assign_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.auto_assign(&RequestId(request_id), &actor) {
        Ok((record, picked)) => {
            let payload = json!({
                "assigned": picked,
                "request": record,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn complete_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(completion): axum::Json<CompletionRequest>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.complete(&RequestId(request_id), &actor, completion) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn cancel_handler<R, D>(
    State(service): State<SharedService<R, D>>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<ReasonBody>,
) -> Response
where
    R: RequestRepository + 'static,
    D: UserDirectory + 'static,
{
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match service.cancel(&RequestId(request_id), &actor, &body.reason) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// Read the caller identity forwarded by the auth layer.
pub(crate) fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, Response> {
    let Some(id) = header_value(headers, ACTOR_ID_HEADER) else {
        return Err(unauthorized(format!("missing {ACTOR_ID_HEADER} header")));
    };
    let Some(role) = header_value(headers, ACTOR_ROLE_HEADER).and_then(Role::parse) else {
        return Err(unauthorized(format!(
            "missing or unknown {ACTOR_ROLE_HEADER} header"
        )));
    };
    Ok(Actor::new(id, role))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn unauthorized(message: String) -> Response {
    let payload = json!({
        "error": message,
        "kind": "unauthenticated",
    });
    (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
}

pub(crate) fn error_response(error: &MatchServiceError) -> Response {
    let (status, kind) = match error {
        MatchServiceError::Lifecycle(err) => {
            let status = match err {
                LifecycleError::InvalidState { .. }
                | LifecycleError::Capacity { .. }
                | LifecycleError::Conflict(_) => StatusCode::CONFLICT,
                LifecycleError::Forbidden(_) => StatusCode::FORBIDDEN,
                LifecycleError::InvalidVolunteer(_) | LifecycleError::InvalidInput(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
            };
            (status, err.kind())
        }
        MatchServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        MatchServiceError::Repository(RepositoryError::Conflict) => {
            (StatusCode::CONFLICT, "conflict")
        }
        MatchServiceError::Repository(_) | MatchServiceError::Directory(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "unavailable")
        }
    };

    let payload = json!({
        "error": error.to_string(),
        "kind": kind,
    });
    (status, axum::Json(payload)).into_response()
}
