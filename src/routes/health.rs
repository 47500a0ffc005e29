use axum::{Json, Router, extract::State, routing::get};

use crate::{dto::health::HealthResponse, services::health_service, state::SharedState};

const BANNER: &str = "Live quiz backend is running";

#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses((status = 200, description = "Plain-text banner", body = String))
)]
/// Plain-text banner confirming the server is up.
pub async fn banner() -> &'static str {
    BANNER
}

#[utoipa::path(
    get,
    path = "/healthcheck",
    tag = "health",
    responses((status = 200, description = "Service health", body = HealthResponse))
)]
/// Return the current health status of the backend and ping the room store.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    let status = health_service::health_status(&state).await;
    Json(status)
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/", get(banner))
        .route("/healthcheck", get(healthcheck))
}
