use serde::Serialize;
use utoipa::ToSchema;

/// Whether the room store is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The store answered its last health check.
    Ok,
    /// No store is installed or it failed its health check; room events are refused.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Serialized as `ok` or `degraded`.
    pub status: HealthStatus,
}

impl From<HealthStatus> for HealthResponse {
    fn from(status: HealthStatus) -> Self {
        Self { status }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_serialized_in_lowercase() {
        let body = serde_json::to_value(HealthResponse::from(HealthStatus::Degraded)).unwrap();
        assert_eq!(body, serde_json::json!({ "status": "degraded" }));
    }
}
