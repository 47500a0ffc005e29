//! Rebuilds a reconnecting client's view of its room from the store.
//!
//! Reconnecting never changes the room state; it only flips the liveness flag of the
//! identity, registers the connection and puts it back in the room's broadcast group.

use tracing::info;
use validator::Validate;

use crate::{
    dao::{
        models::{PlayerEntity, RoomEntity},
        room_store::RoomStore,
    },
    dto::{
        room::{HostHydration, PlayerHydration, QuestionView, ResultsView, leaderboard},
        ws::{HostRequest, PlayerRequest, ServerMessage},
    },
    error::ServiceError,
    services::room_service::find_room,
    state::{
        SharedState,
        identity::{ConnectionId, Identity},
        state_machine::RoomState,
    },
};

/// Re-attach a host connection and send it the full room snapshot.
pub async fn reconnect_host(
    state: &SharedState,
    connection: ConnectionId,
    request: HostRequest,
) -> Result<HostHydration, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let room = find_room(store.as_ref(), &request.pin).await?;
    if room.host_token != request.host_token {
        return Err(ServiceError::Unauthorized("Invalid host token".into()));
    }

    store.set_host_connected(room.id, true).await?;
    attach(state, connection, Identity::host(&room.pin, room.host_token));

    let players = store.leaderboard(room.id).await?;
    let payload = HostHydration {
        state: room.state,
        current_question_index: room.current_question_index,
        players: leaderboard(&players),
        question: question_view(state, &room),
        results: results_view(state, &room, &players),
    };
    state
        .channels()
        .send(connection, ServerMessage::HostReconnected(payload.clone()));
    info!(pin = %room.pin, state = room.state.as_str(), "host reconnected");
    Ok(payload)
}

/// Re-attach a player connection and send it its view of the room.
pub async fn reconnect_player(
    state: &SharedState,
    connection: ConnectionId,
    request: PlayerRequest,
) -> Result<PlayerHydration, ServiceError> {
    request.validate()?;
    let store = state.require_store().await?;
    let room = find_room(store.as_ref(), &request.pin).await?;
    let player = store
        .find_player(room.id, request.player_token)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Player not found".into()))?;

    store
        .set_player_connected(room.id, player.player_token, true)
        .await?;
    store.touch_room(room.id).await?;
    attach(
        state,
        connection,
        Identity::player(&room.pin, player.player_token),
    );

    let players = leaderboard_if_results(store.as_ref(), &room).await?;
    let payload = PlayerHydration {
        state: room.state,
        current_question_index: room.current_question_index,
        score: player.score,
        question: question_view(state, &room),
        results: results_view(state, &room, &players),
    };
    state
        .channels()
        .send(connection, ServerMessage::Reconnected(payload.clone()));
    info!(pin = %room.pin, state = room.state.as_str(), "player reconnected");
    Ok(payload)
}

fn attach(state: &SharedState, connection: ConnectionId, identity: Identity) {
    state.channels().join(&identity.pin, connection);
    state.identities().register(connection, identity);
}

/// The open question with its stored deadline, only while in `QUESTION`.
fn question_view(state: &SharedState, room: &RoomEntity) -> Option<QuestionView> {
    if room.state != RoomState::Question {
        return None;
    }
    let index = room.question_index()?;
    let question = state.questions().question(index)?;
    QuestionView::for_room(room, index, question)
}

/// Correct option and standings of the closed question, only while in `RESULTS`.
fn results_view(
    state: &SharedState,
    room: &RoomEntity,
    players: &[PlayerEntity],
) -> Option<ResultsView> {
    if room.state != RoomState::Results {
        return None;
    }
    let question = state.questions().question(room.question_index()?)?;
    Some(ResultsView {
        correct_index: question.correct_index,
        leaderboard: leaderboard(players),
    })
}

async fn leaderboard_if_results(
    store: &dyn RoomStore,
    room: &RoomEntity,
) -> Result<Vec<PlayerEntity>, ServiceError> {
    if room.state == RoomState::Results {
        Ok(store.leaderboard(room.id).await?)
    } else {
        Ok(Vec::new())
    }
}
