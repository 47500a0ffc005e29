//! Background loop closing rooms whose host never came back.

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    error::ServiceError,
    services::{
        events::{self, REASON_HOST_TIMEOUT},
        room_service,
    },
    state::{SharedState, state_machine::RoomEvent},
};

pub async fn run(state: SharedState) {
    let period = state.config().cleanup_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?period, "cleanup sweeper started");

    loop {
        ticker.tick().await;
        if state.is_degraded().await {
            continue;
        }
        if let Err(err) = sweep_once(&state).await {
            warn!(error = %err, "cleanup sweep failed");
        }
    }
}

/// Close rooms abandoned for longer than the host offline TTL.
pub async fn sweep_once(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_store().await?;
    let grace = state.config().host_offline_ttl;
    let mut closed = 0;
    for room in store.abandoned_rooms(grace).await? {
        if room.state.transition(RoomEvent::Abandon).is_err() {
            continue;
        }
        // The host may have reconnected since the scan.
        if !store.close_abandoned_room(room.id, grace).await? {
            debug!(pin = %room.pin, "room no longer abandoned");
            continue;
        }
        info!(pin = %room.pin, "closed room after host timeout");
        events::broadcast_room_closed(state, &room.pin, REASON_HOST_TIMEOUT);
        room_service::release_room(state, &room.pin);
        closed += 1;
    }
    Ok(closed)
}
