use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Path of the generated document; the Swagger UI at `/docs` loads it from here.
pub const OPENAPI_PATH: &str = "/docs/openapi.json";

/// Swagger UI for the HTTP routes and the WebSocket message schemas.
pub fn router() -> Router<SharedState> {
    SwaggerUi::new("/docs")
        .url(OPENAPI_PATH, ApiDoc::openapi())
        .into()
}
