use crate::infra::AppState;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use volunteer_match::workflows::requests::{
    request_router, HelpRequestService, InMemoryRequestRepository, InMemoryUserDirectory, Role,
    UserId,
};

pub(crate) type AppService =
    HelpRequestService<InMemoryRequestRepository, InMemoryUserDirectory>;

/// Request lifecycle routes plus the operational and user-registry endpoints.
pub(crate) fn with_request_routes(
    service: Arc<AppService>,
    directory: Arc<InMemoryUserDirectory>,
) -> Router {
    let users = Router::new()
        .route(
            "/api/v1/users/:user_id",
            put(register_user).get(user_profile),
        )
        .with_state(directory);

    request_router(service)
        .merge(users)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
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

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterUserBody {
    role: Role,
}

/// Stand-in for the identity service: records the role the engine should trust.
pub(crate) async fn register_user(
    State(directory): State<Arc<InMemoryUserDirectory>>,
    Path(user_id): Path<String>,
    Json(body): Json<RegisterUserBody>,
) -> Response {
    let user = UserId::new(user_id);
    match directory.profile(&user) {
        Ok(Some(profile)) if profile.role == body.role => {
            return (StatusCode::OK, Json(json!({ "id": user, "role": body.role })))
                .into_response();
        }
        Ok(Some(_)) => {
            let payload = json!({
                "error": format!("{user} is already registered with another role"),
                "kind": "conflict",
            });
            return (StatusCode::CONFLICT, Json(payload)).into_response();
        }
        Ok(None) => {}
        Err(err) => return unavailable(&err),
    }

    match directory.register(user.clone(), body.role) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "id": user, "role": body.role })),
        )
            .into_response(),
        Err(err) => unavailable(&err),
    }
}

pub(crate) async fn user_profile(
    State(directory): State<Arc<InMemoryUserDirectory>>,
    Path(user_id): Path<String>,
) -> Response {
    let user = UserId::new(user_id);
    match directory.profile(&user) {
        Ok(Some(profile)) => {
            let payload = json!({
                "id": user,
                "role": profile.role,
                "rating": profile.rating.rating,
                "totalRatings": profile.rating.total_ratings,
                "requestsCreated": profile.requests_created,
                "servicesVolunteered": profile.services_volunteered,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Ok(None) => {
            let payload = json!({
                "error": format!("{user} not found"),
                "kind": "not_found",
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => unavailable(&err),
    }
}

fn unavailable(err: &dyn std::error::Error) -> Response {
    let payload = json!({ "error": err.to_string(), "kind": "unavailable" });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
