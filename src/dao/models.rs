use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::state_machine::RoomState;

/// Durable representation of a quiz room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Internal durable identifier.
    pub id: Uuid,
    /// Six digit display code, unique among open rooms.
    pub pin: String,
    /// Secret proving host identity across reconnects.
    pub host_token: Uuid,
    /// Current lifecycle state.
    pub state: RoomState,
    /// `-1` before the game starts, otherwise the index of the current question.
    pub current_question_index: i32,
    /// When the current question was opened.
    pub question_started_at: Option<SystemTime>,
    /// Absolute deadline of the current question.
    pub question_ends_at: Option<SystemTime>,
    /// Whether a host connection is currently registered for the room.
    pub host_connected: bool,
    /// Set when the host connection went away, cleared on reconnect.
    pub host_disconnected_at: Option<SystemTime>,
    pub created_at: SystemTime,
    pub last_activity_at: SystemTime,
    /// Soft-delete marker; closed rooms are invisible to lookups by pin.
    pub closed_at: Option<SystemTime>,
}

impl RoomEntity {
    /// Index of the current question, if the game has started.
    pub fn question_index(&self) -> Option<usize> {
        usize::try_from(self.current_question_index).ok()
    }

    /// Whether the room has not been soft-deleted.
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Durable representation of a participant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    pub room_id: Uuid,
    /// Secret proving player identity across reconnects.
    pub player_token: Uuid,
    /// Display name, already trimmed.
    pub name: String,
    /// Cumulative score; only ever incremented.
    pub score: i64,
    pub connected: bool,
    pub created_at: SystemTime,
    pub last_seen_at: SystemTime,
}

/// A single recorded answer. At most one exists per player and question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    pub room_id: Uuid,
    pub player_token: Uuid,
    pub question_index: i32,
    pub option_index: i32,
    pub answered_at: SystemTime,
}

/// Outcome of the conditional `QUESTION -> RESULTS` write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishQuestionOutcome {
    /// This caller performed the transition; carries the updated room.
    Finished(RoomEntity),
    /// The room is still in `QUESTION` but the deadline has not elapsed.
    NotDue,
    /// Another executor already moved the room out of `QUESTION`.
    AlreadyFinished,
}

/// Outcome of recording an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Recorded,
    /// The player already answered this question; the submission was ignored.
    Duplicate,
    /// The store clock is past the question deadline.
    PastDeadline,
}
