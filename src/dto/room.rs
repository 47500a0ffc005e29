use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{PlayerEntity, RoomEntity},
    dto::to_epoch_seconds,
    state::{questions::Question, state_machine::RoomState},
};

/// One row of a leaderboard or roster.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
    pub connected: bool,
}

impl From<&PlayerEntity> for LeaderboardEntry {
    fn from(player: &PlayerEntity) -> Self {
        Self {
            name: player.name.clone(),
            score: player.score,
            connected: player.connected,
        }
    }
}

/// Build leaderboard rows from players already sorted by the store.
pub fn leaderboard(players: &[PlayerEntity]) -> Vec<LeaderboardEntry> {
    players.iter().map(LeaderboardEntry::from).collect()
}

/// Body of an open question, including its absolute deadline.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct QuestionView {
    pub index: usize,
    pub text: String,
    pub options: Vec<String>,
    /// Deadline as a UNIX timestamp in seconds.
    pub ends_at: f64,
}

impl QuestionView {
    /// View of the question the room currently has open, if its deadline is known.
    pub fn for_room(room: &RoomEntity, index: usize, question: &Question) -> Option<Self> {
        let ends_at = room.question_ends_at?;
        Some(Self {
            index,
            text: question.text.clone(),
            options: question.options.clone(),
            ends_at: to_epoch_seconds(ends_at),
        })
    }
}

/// Outcome of a closed question.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ResultsView {
    pub correct_index: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// Snapshot sent to a reconnecting player.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PlayerHydration {
    pub state: RoomState,
    pub current_question_index: i32,
    /// The player's own cumulative score.
    pub score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsView>,
}

/// Snapshot sent to a reconnecting host, with the full roster.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HostHydration {
    pub state: RoomState,
    pub current_question_index: i32,
    pub players: Vec<LeaderboardEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsView>,
}
