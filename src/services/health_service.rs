use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Report whether a healthy room store is installed, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let Some(store) = state.room_store().await else {
        warn!("storage unavailable (degraded mode)");
        return HealthStatus::Degraded.into();
    };

    match store.health_check().await {
        Ok(()) => HealthStatus::Ok.into(),
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            HealthStatus::Degraded.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_without_a_store() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, HealthStatus::Degraded);

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert_eq!(health_status(&state).await.status, HealthStatus::Ok);
    }
}
