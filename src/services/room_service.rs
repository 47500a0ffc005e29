//! Room lifecycle operations driven by host and player events.
//!
//! Every mutation goes through a conditional store write; reads taken here are only
//! used to pick an action and produce advisories.

use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{AnswerOutcome, FinishQuestionOutcome, PlayerEntity, RoomEntity},
        room_store::{NewAnswer, RoomStore},
        storage::StorageError,
    },
    dto::{
        room::{QuestionView, ResultsView, leaderboard},
        ws::{HostRequest, JoinRoomRequest, ServerMessage, SubmitAnswerRequest},
    },
    error::ServiceError,
    services::{events, scoring},
    state::{
        SharedState,
        identity::{ConnectionId, Identity, Role},
        rate_limit::LimitedAction,
        state_machine::{RoomEvent, RoomState},
    },
};

/// Open a new room and register the caller as its host.
pub async fn create_room(
    state: &SharedState,
    connection: ConnectionId,
) -> Result<RoomEntity, ServiceError> {
    admit(
        state,
        LimitedAction::CreateRoom,
        connection,
        "Too many rooms created. Slow down.",
    )?;
    let store = state.require_store().await?;

    let mut created = None;
    for attempt in 0..state.config().pin_attempts {
        let pin = generate_pin();
        match store.create_room(pin.clone(), Uuid::new_v4()).await? {
            Some(room) => {
                created = Some(room);
                break;
            }
            None => debug!(pin, attempt, "pin already in use"),
        }
    }
    let room = created.ok_or(ServiceError::PinExhausted)?;

    state
        .identities()
        .register(connection, Identity::host(&room.pin, room.host_token));
    state.channels().join(&room.pin, connection);
    state.channels().send(
        connection,
        ServerMessage::RoomCreated {
            pin: room.pin.clone(),
            host_token: room.host_token,
        },
    );
    info!(pin = %room.pin, "room created");
    Ok(room)
}

/// Add a player to an open room and announce it.
pub async fn join_room(
    state: &SharedState,
    connection: ConnectionId,
    request: JoinRoomRequest,
) -> Result<PlayerEntity, ServiceError> {
    admit(
        state,
        LimitedAction::JoinRoom,
        connection,
        "Too many join attempts",
    )?;
    request.validate()?;
    let name = request.name.trim().to_owned();

    let store = state.require_store().await?;
    let room = find_room(store.as_ref(), &request.pin).await?;
    if room.state == RoomState::Finished {
        return Err(ServiceError::InvalidState("Game finished".into()));
    }

    let capacity = state.config().max_players_per_room;
    if store.player_count(room.id).await? >= capacity {
        return Err(ServiceError::RoomFull);
    }
    let player = store
        .insert_player(room.id, Uuid::new_v4(), name, capacity)
        .await?
        .ok_or(ServiceError::RoomFull)?;
    store.touch_room(room.id).await?;

    state
        .identities()
        .register(connection, Identity::player(&room.pin, player.player_token));
    state.channels().join(&room.pin, connection);
    state.channels().send(
        connection,
        ServerMessage::Joined {
            player_token: player.player_token,
        },
    );
    events::broadcast_player_joined(state, &room.pin, &player.name);
    info!(pin = %room.pin, name = %player.name, "player joined");
    Ok(player)
}

/// Open the first question of a room waiting in the lobby.
pub async fn start_game(
    state: &SharedState,
    connection: ConnectionId,
    request: HostRequest,
) -> Result<QuestionView, ServiceError> {
    let store = state.require_store().await?;
    let room = authorize_host(state, store.as_ref(), connection, &request).await?;
    if room.state != RoomState::Lobby {
        return Err(ServiceError::InvalidState(
            "start_game allowed only in LOBBY".into(),
        ));
    }
    enter_question(state, store.as_ref(), &room, 0).await
}

/// What a `next_question` request ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// The overdue question was closed and scored.
    Finalized(ResultsView),
    /// The next question was opened.
    Question(QuestionView),
    /// There were no questions left; the room is finished.
    Finished,
}

/// Host action moving the game forward from its current state.
///
/// In `QUESTION` this is the host-initiated trigger of the timeout finalizer; in
/// `RESULTS` it opens the next question or ends the game.
pub async fn next_question(
    state: &SharedState,
    connection: ConnectionId,
    request: HostRequest,
) -> Result<Advance, ServiceError> {
    let store = state.require_store().await?;
    let room = authorize_host(state, store.as_ref(), connection, &request).await?;

    match room.state {
        RoomState::Question => finalize_question(state, &room.pin)
            .await
            .map(Advance::Finalized),
        RoomState::Results => {
            let next = room.question_index().map_or(0, |index| index + 1);
            if next < state.questions().len() {
                enter_question(state, store.as_ref(), &room, next)
                    .await
                    .map(Advance::Question)
            } else {
                finish_game(state, store.as_ref(), &room).await?;
                Ok(Advance::Finished)
            }
        }
        _ => Err(ServiceError::InvalidState(
            "next_question allowed only in RESULTS".into(),
        )),
    }
}

/// Record a player's answer for the open question.
///
/// Only rate limiting produces an advisory; every other rejection is returned so the
/// caller can log it, and is otherwise dropped.
pub async fn submit_answer(
    state: &SharedState,
    connection: ConnectionId,
    request: SubmitAnswerRequest,
) -> Result<AnswerOutcome, ServiceError> {
    admit(
        state,
        LimitedAction::SubmitAnswer,
        connection,
        "Too many answers. Slow down.",
    )?;
    request.validate()?;

    let store = state.require_store().await?;
    let room = find_room(store.as_ref(), &request.pin).await?;
    if room.state != RoomState::Question {
        return Err(ServiceError::InvalidState("No question is open".into()));
    }

    let identity = Identity::player(&room.pin, request.player_token);
    if !state.identities().is_registered_as(connection, &identity) {
        return Err(ServiceError::Unauthorized(
            "Player socket not registered. Reconnect.".into(),
        ));
    }
    if store
        .find_player(room.id, request.player_token)
        .await?
        .is_none()
    {
        return Err(ServiceError::NotFound("Player not found".into()));
    }

    let index = room
        .question_index()
        .ok_or_else(|| ServiceError::InvalidState("No question is open".into()))?;
    let question = state
        .questions()
        .question(index)
        .ok_or_else(|| ServiceError::NotFound(format!("question {index} does not exist")))?;
    let option_index = usize::try_from(request.option)
        .ok()
        .filter(|option| *option < question.options.len())
        .ok_or_else(|| ServiceError::Validation("Invalid option".into()))?;
    let deadline = room
        .question_ends_at
        .ok_or_else(|| ServiceError::InvalidState("No question is open".into()))?;

    let outcome = store
        .insert_answer(NewAnswer {
            room_id: room.id,
            player_token: request.player_token,
            question_index: room.current_question_index,
            option_index: option_index as i32,
            deadline,
        })
        .await?;
    if outcome == AnswerOutcome::Recorded {
        store.touch_room(room.id).await?;
        debug!(pin = %room.pin, index, "answer recorded");
    }
    Ok(outcome)
}

/// Close an overdue question, score it and broadcast the results.
///
/// Safe to call concurrently from any number of executors: the conditional store
/// write picks exactly one winner, and every other caller gets
/// [`ServiceError::Conflict`] without side effects.
pub async fn finalize_question(
    state: &SharedState,
    pin: &str,
) -> Result<ResultsView, ServiceError> {
    let store = state.require_store().await?;
    let room = find_room(store.as_ref(), pin).await?;
    room.state
        .transition(RoomEvent::CloseQuestion)
        .map_err(|_| ServiceError::Conflict)?;

    let closed = match store
        .finish_question(room.id, room.current_question_index)
        .await?
    {
        FinishQuestionOutcome::Finished(closed) => closed,
        FinishQuestionOutcome::NotDue => {
            return Err(ServiceError::InvalidState(
                "question is still running".into(),
            ));
        }
        FinishQuestionOutcome::AlreadyFinished => {
            debug!(pin, "finalize lost the race");
            return Err(ServiceError::Conflict);
        }
    };

    let index = closed.question_index().unwrap_or_default();
    let Some(question) = state.questions().question(index) else {
        warn!(pin, index, "closed a question that is not configured");
        return Err(ServiceError::NotFound(format!(
            "question {index} does not exist"
        )));
    };
    let ends_at = closed.question_ends_at.ok_or_else(|| {
        StorageError::Corrupted(format!("room {} closed without a deadline", closed.id))
    })?;

    let answers = store
        .answers_for_question(closed.id, closed.current_question_index)
        .await?;
    let awards = scoring::score_answers(&answers, question.correct_index, ends_at, question.duration);
    for award in &awards {
        store
            .add_score(closed.id, award.player_token, award.points)
            .await?;
    }

    let results = ResultsView {
        correct_index: question.correct_index,
        leaderboard: leaderboard(&store.leaderboard(closed.id).await?),
    };
    info!(
        pin,
        index,
        answers = answers.len(),
        correct = awards.len(),
        "question finalized"
    );
    events::broadcast_question_results(state, pin, results.clone());
    Ok(results)
}

/// Forget a connection and clear the liveness flag of its identity.
///
/// The flag stays set while another connection is still registered as the same
/// identity, so a late disconnect of a replaced socket does not mark a live client offline.
pub async fn disconnect(state: &SharedState, connection: ConnectionId) -> Result<(), ServiceError> {
    state.channels().unregister(connection);
    state.rate_limiters().forget(connection);
    let Some(identity) = state.identities().remove(connection) else {
        return Ok(());
    };
    if state.identities().is_live(&identity) {
        debug!(pin = %identity.pin, role = ?identity.role, "identity still has a live connection");
        return Ok(());
    }

    let store = state.require_store().await?;
    let Some(room) = store.find_open_room(identity.pin.clone()).await? else {
        return Ok(());
    };
    match identity.role {
        Role::Host if room.host_token == identity.token => {
            store.set_host_connected(room.id, false).await?;
            info!(pin = %room.pin, "host disconnected");
        }
        Role::Host => {}
        Role::Player => {
            store
                .set_player_connected(room.id, identity.token, false)
                .await?;
            debug!(pin = %room.pin, "player disconnected");
        }
    }
    Ok(())
}

/// Check a host request against the room and the calling connection.
pub async fn authorize_host(
    state: &SharedState,
    store: &dyn RoomStore,
    connection: ConnectionId,
    request: &HostRequest,
) -> Result<RoomEntity, ServiceError> {
    request.validate()?;
    let room = find_room(store, &request.pin).await?;
    if room.host_token != request.host_token {
        return Err(ServiceError::Unauthorized("Invalid host token".into()));
    }
    let identity = Identity::host(&room.pin, room.host_token);
    if !state.identities().is_registered_as(connection, &identity) {
        return Err(ServiceError::Unauthorized(
            "Host socket not registered. Reconnect host.".into(),
        ));
    }
    Ok(room)
}

/// Look up an open room by pin.
pub(crate) async fn find_room(store: &dyn RoomStore, pin: &str) -> Result<RoomEntity, ServiceError> {
    store
        .find_open_room(pin.to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound("Room not found".into()))
}

/// Open question `index` and broadcast it with its store-generated deadline.
async fn enter_question(
    state: &SharedState,
    store: &dyn RoomStore,
    room: &RoomEntity,
    index: usize,
) -> Result<QuestionView, ServiceError> {
    room.state.transition(RoomEvent::OpenQuestion)?;
    let question = state
        .questions()
        .question(index)
        .ok_or_else(|| ServiceError::NotFound(format!("question {index} does not exist")))?;

    let started = store
        .start_question(room.id, room.state, index as i32, question.duration)
        .await?
        .ok_or_else(|| ServiceError::InvalidState("Room state changed, try again".into()))?;
    let view = QuestionView::for_room(&started, index, question).ok_or_else(|| {
        StorageError::Corrupted(format!("room {} opened without a deadline", started.id))
    })?;

    info!(pin = %started.pin, index, "question started");
    events::broadcast_question_started(state, &started.pin, view.clone());
    Ok(view)
}

/// Close a room whose last question has been shown.
async fn finish_game(
    state: &SharedState,
    store: &dyn RoomStore,
    room: &RoomEntity,
) -> Result<(), ServiceError> {
    room.state.transition(RoomEvent::Finish)?;
    if !store.finish_game(room.id).await? {
        return Err(ServiceError::Conflict);
    }

    let standings = leaderboard(&store.leaderboard(room.id).await?);
    info!(pin = %room.pin, players = standings.len(), "game finished");
    events::broadcast_game_finished(state, &room.pin, standings);
    release_room(state, &room.pin);
    Ok(())
}

/// Drop the broadcast group and every identity bound to a closed room's pin.
///
/// Pins are only unique among open rooms, so a later room may reuse this one.
pub(crate) fn release_room(state: &SharedState, pin: &str) {
    let members = state.channels().close_group(pin);
    let identities = state.identities().forget_pin(pin);
    debug!(pin, members, identities, "released closed room");
}

fn admit(
    state: &SharedState,
    action: LimitedAction,
    connection: ConnectionId,
    advisory: &'static str,
) -> Result<(), ServiceError> {
    if state.rate_limiters().admit(action, connection) {
        Ok(())
    } else {
        debug!(?action, %connection, "rate limited");
        Err(ServiceError::RateLimited(advisory))
    }
}

fn generate_pin() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000u32))
}
