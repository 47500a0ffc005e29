use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle of a room. `FINISHED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    /// Players can join; no question has been asked yet.
    Lobby,
    /// A question is open and answers are accepted until its deadline.
    Question,
    /// The last question is closed and its results are shown.
    Results,
    /// The game is over.
    Finished,
}

impl RoomState {
    /// Persisted representation of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            RoomState::Lobby => "LOBBY",
            RoomState::Question => "QUESTION",
            RoomState::Results => "RESULTS",
            RoomState::Finished => "FINISHED",
        }
    }

    /// Compute the state reached by applying `event`, if the transition is valid.
    pub fn transition(self, event: RoomEvent) -> Result<RoomState, InvalidTransition> {
        let next = match (self, event) {
            (RoomState::Lobby, RoomEvent::OpenQuestion)
            | (RoomState::Results, RoomEvent::OpenQuestion) => RoomState::Question,
            (RoomState::Question, RoomEvent::CloseQuestion) => RoomState::Results,
            (RoomState::Results, RoomEvent::Finish) => RoomState::Finished,
            (from, RoomEvent::Abandon) if from != RoomState::Finished => RoomState::Finished,
            (from, event) => return Err(InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

/// Events driving a room through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Open the current question (`start_game` or `next_question`).
    OpenQuestion,
    /// Close an overdue question and score it.
    CloseQuestion,
    /// Advance past the last question.
    Finish,
    /// Close a room whose host never came back.
    Abandon,
}

/// Error returned when an event cannot be applied to a room.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The state the room was in when the event was received.
    pub from: RoomState,
    /// The rejected event.
    pub event: RoomEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(state: RoomState, event: RoomEvent) -> RoomState {
        state.transition(event).unwrap()
    }

    #[test]
    fn full_happy_path_through_a_game() {
        let state = apply(RoomState::Lobby, RoomEvent::OpenQuestion);
        assert_eq!(state, RoomState::Question);

        let state = apply(state, RoomEvent::CloseQuestion);
        assert_eq!(state, RoomState::Results);

        let state = apply(state, RoomEvent::OpenQuestion);
        assert_eq!(state, RoomState::Question);

        let state = apply(apply(state, RoomEvent::CloseQuestion), RoomEvent::Finish);
        assert_eq!(state, RoomState::Finished);
    }

    #[test]
    fn finished_is_terminal() {
        for event in [
            RoomEvent::OpenQuestion,
            RoomEvent::CloseQuestion,
            RoomEvent::Finish,
            RoomEvent::Abandon,
        ] {
            let err = RoomState::Finished.transition(event).unwrap_err();
            assert_eq!(err.from, RoomState::Finished);
            assert_eq!(err.event, event);
        }
    }

    #[test]
    fn rooms_never_move_backwards() {
        for (state, event) in [
            (RoomState::Question, RoomEvent::OpenQuestion),
            (RoomState::Lobby, RoomEvent::CloseQuestion),
            (RoomState::Results, RoomEvent::CloseQuestion),
            (RoomState::Lobby, RoomEvent::Finish),
            (RoomState::Question, RoomEvent::Finish),
        ] {
            assert!(state.transition(event).is_err(), "{state:?} accepted {event:?}");
        }
    }

    #[test]
    fn any_open_room_can_be_abandoned() {
        for state in [RoomState::Lobby, RoomState::Question, RoomState::Results] {
            assert_eq!(apply(state, RoomEvent::Abandon), RoomState::Finished);
        }
    }

    #[test]
    fn persisted_names_match_serde() {
        for state in [
            RoomState::Lobby,
            RoomState::Question,
            RoomState::Results,
            RoomState::Finished,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }
}
