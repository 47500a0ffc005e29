use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the live quiz backend.
#[openapi(
    paths(
        crate::routes::health::banner,
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::ws::ClientMessage,
            crate::dto::ws::ServerMessage,
            crate::dto::ws::JoinRoomRequest,
            crate::dto::ws::HostRequest,
            crate::dto::ws::PlayerRequest,
            crate::dto::ws::SubmitAnswerRequest,
            crate::dto::room::LeaderboardEntry,
            crate::dto::room::QuestionView,
            crate::dto::room::ResultsView,
            crate::dto::room::PlayerHydration,
            crate::dto::room::HostHydration,
            crate::state::state_machine::RoomState,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quiz", description = "WebSocket protocol for hosts and players"),
    )
)]
pub struct ApiDoc;
