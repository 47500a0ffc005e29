//! Background loop closing questions whose deadline has passed.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{error::ServiceError, services::room_service, state::SharedState};

/// Poll for overdue questions forever, finalizing each one exactly once.
pub async fn run(state: SharedState) {
    let period = state.config().watchdog_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?period, "watchdog started");

    loop {
        ticker.tick().await;
        if state.is_degraded().await {
            continue;
        }
        if let Err(err) = sweep_once(&state).await {
            warn!(error = %err, "watchdog sweep failed");
        }
    }
}

/// Finalize every room currently past its deadline, returning how many this call closed.
pub async fn sweep_once(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let mut finalized = 0;
    for pin in store.overdue_rooms().await? {
        match room_service::finalize_question(state, &pin).await {
            Ok(_) => finalized += 1,
            Err(ServiceError::Conflict) => debug!(pin, "question already finalized"),
            Err(err) => warn!(pin, error = %err, "failed to finalize overdue question"),
        }
    }
    Ok(finalized)
}
