pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    dao::{
        models::{AnswerEntity, AnswerOutcome, FinishQuestionOutcome, PlayerEntity, RoomEntity},
        storage::StorageResult,
    },
    state::state_machine::RoomState,
};

/// Answer submission handed to [`RoomStore::insert_answer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAnswer {
    pub room_id: Uuid,
    pub player_token: Uuid,
    pub question_index: i32,
    pub option_index: i32,
    /// Deadline the store clock is checked against when recording.
    pub deadline: SystemTime,
}

/// Durable source of truth for rooms, players and answers.
///
/// Every timestamp is generated by the backend. Methods taking an expected state
/// are compare-and-set writes: they return `None`/`false` when the stored row no
/// longer matches, and callers must treat that as "someone else got there first".
pub trait RoomStore: Send + Sync {
    /// Insert a fresh room in `LOBBY`. Returns `None` when `pin` is already used by an open room.
    fn create_room(
        &self,
        pin: String,
        host_token: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Look up an open room by pin.
    fn find_open_room(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Move an open room from `from` at `index - 1` into `QUESTION` for `index`, stamping
    /// the deadline. Returns `None` if the room moved on since it was read.
    fn start_question(
        &self,
        room_id: Uuid,
        from: RoomState,
        index: i32,
        duration: Duration,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>>;
    /// Conditionally move `QUESTION(index) -> RESULTS` once the deadline has elapsed.
    fn finish_question(
        &self,
        room_id: Uuid,
        index: i32,
    ) -> BoxFuture<'static, StorageResult<FinishQuestionOutcome>>;
    /// Conditionally move `RESULTS -> FINISHED` and close the room.
    fn finish_game(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Close the room if its host is still disconnected for longer than `grace`.
    fn close_abandoned_room(
        &self,
        room_id: Uuid,
        grace: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Flip the host liveness flag and its disconnection timestamp.
    fn set_host_connected(
        &self,
        room_id: Uuid,
        connected: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Refresh `last_activity_at`.
    fn touch_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<()>>;
    /// Insert a player unless the room already holds `capacity` players.
    fn insert_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        name: String,
        capacity: usize,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn find_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn set_player_connected(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        connected: bool,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn player_count(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>>;
    /// Record an answer once; later submissions for the same question are ignored.
    fn insert_answer(&self, answer: NewAnswer) -> BoxFuture<'static, StorageResult<AnswerOutcome>>;
    fn answers_for_question(
        &self,
        room_id: Uuid,
        question_index: i32,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    /// Add `points` to a player's cumulative score.
    fn add_score(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        points: i64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Players ordered by score descending, ties broken by earliest join.
    fn leaderboard(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    /// Pins of open rooms sitting in `QUESTION` past their deadline.
    fn overdue_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>>;
    /// Open rooms whose host has been disconnected for longer than `grace`.
    fn abandoned_rooms(&self, grace: Duration)
    -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
