use tracing::debug;

use crate::{
    dto::{
        room::{LeaderboardEntry, QuestionView, ResultsView},
        ws::ServerMessage,
    },
    state::SharedState,
};

/// Closure reason used when a host stayed away past the grace period.
pub const REASON_HOST_TIMEOUT: &str = "host_timeout";

/// Announce a newly joined player to the room.
pub fn broadcast_player_joined(state: &SharedState, pin: &str, name: &str) {
    send_room_event(
        state,
        pin,
        ServerMessage::PlayerJoined {
            name: name.to_owned(),
        },
    );
}

/// Push the body and deadline of a freshly opened question.
pub fn broadcast_question_started(state: &SharedState, pin: &str, question: QuestionView) {
    send_room_event(state, pin, ServerMessage::QuestionStarted(question));
}

/// Push the correct option and the updated leaderboard of a closed question.
pub fn broadcast_question_results(state: &SharedState, pin: &str, results: ResultsView) {
    send_room_event(state, pin, ServerMessage::QuestionResults(results));
}

pub fn broadcast_game_finished(state: &SharedState, pin: &str, leaderboard: Vec<LeaderboardEntry>) {
    send_room_event(state, pin, ServerMessage::GameFinished { leaderboard });
}

/// Tell everyone still connected that the room is gone.
pub fn broadcast_room_closed(state: &SharedState, pin: &str, reason: &str) {
    send_room_event(
        state,
        pin,
        ServerMessage::RoomClosed {
            reason: reason.to_owned(),
        },
    );
}

fn send_room_event(state: &SharedState, pin: &str, message: ServerMessage) {
    let delivered = state.channels().broadcast(pin, &message);
    if delivered == 0 {
        debug!(pin, "room event had no live recipients");
    }
}
