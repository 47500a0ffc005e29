//! Process-local [`RoomStore`] used for single-node deployments and tests.
//!
//! A single async mutex serialises every operation, which makes each trait method
//! an atomic read-modify-write just like a conditional `UPDATE` would be.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{NewAnswer, RoomStore};
use crate::{
    dao::{
        clock::{Clock, SystemClock},
        models::{AnswerEntity, AnswerOutcome, FinishQuestionOutcome, PlayerEntity, RoomEntity},
        storage::StorageResult,
    },
    state::state_machine::RoomState,
};

#[derive(Clone)]
pub struct MemoryRoomStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    rooms: HashMap<Uuid, RoomEntity>,
    /// Players per room, kept in join order.
    players: HashMap<Uuid, IndexMap<Uuid, PlayerEntity>>,
    answers: HashMap<(Uuid, i32), IndexMap<Uuid, AnswerEntity>>,
}

impl MemoryState {
    fn open_room_mut(&mut self, room_id: Uuid) -> Option<&mut RoomEntity> {
        self.rooms.get_mut(&room_id).filter(|room| room.is_open())
    }

    fn player_mut(&mut self, room_id: Uuid, player_token: Uuid) -> Option<&mut PlayerEntity> {
        self.players
            .get_mut(&room_id)
            .and_then(|players| players.get_mut(&player_token))
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRoomStore {
    /// Store stamping records with the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Store stamping records with the provided clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                clock,
                state: Mutex::new(MemoryState::default()),
            }),
        }
    }

    fn now(&self) -> SystemTime {
        self.inner.clock.now()
    }

    async fn create_room(&self, pin: String, host_token: Uuid) -> Option<RoomEntity> {
        let mut state = self.inner.state.lock().await;
        if state
            .rooms
            .values()
            .any(|room| room.is_open() && room.pin == pin)
        {
            return None;
        }

        let now = self.now();
        let room = RoomEntity {
            id: Uuid::new_v4(),
            pin,
            host_token,
            state: RoomState::Lobby,
            current_question_index: -1,
            question_started_at: None,
            question_ends_at: None,
            host_connected: true,
            host_disconnected_at: None,
            created_at: now,
            last_activity_at: now,
            closed_at: None,
        };
        state.rooms.insert(room.id, room.clone());
        Some(room)
    }

    async fn find_open_room(&self, pin: String) -> Option<RoomEntity> {
        let state = self.inner.state.lock().await;
        state
            .rooms
            .values()
            .find(|room| room.is_open() && room.pin == pin)
            .cloned()
    }

    async fn start_question(
        &self,
        room_id: Uuid,
        from: RoomState,
        index: i32,
        duration: Duration,
    ) -> Option<RoomEntity> {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let room = state.open_room_mut(room_id)?;
        if room.state != from || room.current_question_index != index - 1 {
            return None;
        }

        room.state = RoomState::Question;
        room.current_question_index = index;
        room.question_started_at = Some(now);
        room.question_ends_at = Some(now + duration);
        room.last_activity_at = now;
        Some(room.clone())
    }

    async fn finish_question(&self, room_id: Uuid, index: i32) -> FinishQuestionOutcome {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let Some(room) = state.open_room_mut(room_id) else {
            return FinishQuestionOutcome::AlreadyFinished;
        };
        if room.state != RoomState::Question || room.current_question_index != index {
            return FinishQuestionOutcome::AlreadyFinished;
        }
        match room.question_ends_at {
            Some(ends_at) if now > ends_at => {
                room.state = RoomState::Results;
                room.last_activity_at = now;
                FinishQuestionOutcome::Finished(room.clone())
            }
            _ => FinishQuestionOutcome::NotDue,
        }
    }

    async fn finish_game(&self, room_id: Uuid) -> bool {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let Some(room) = state.open_room_mut(room_id) else {
            return false;
        };
        if room.state != RoomState::Results {
            return false;
        }
        room.state = RoomState::Finished;
        room.closed_at = Some(now);
        room.last_activity_at = now;
        true
    }

    async fn close_abandoned_room(&self, room_id: Uuid, grace: Duration) -> bool {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        let Some(room) = state.open_room_mut(room_id) else {
            return false;
        };
        if !host_absent_longer_than(room, now, grace) {
            return false;
        }
        room.state = RoomState::Finished;
        room.closed_at = Some(now);
        room.last_activity_at = now;
        true
    }

    async fn set_host_connected(&self, room_id: Uuid, connected: bool) {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        if let Some(room) = state.open_room_mut(room_id) {
            room.host_connected = connected;
            room.host_disconnected_at = if connected { None } else { Some(now) };
            room.last_activity_at = now;
        }
    }

    async fn touch_room(&self, room_id: Uuid) {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        if let Some(room) = state.open_room_mut(room_id) {
            room.last_activity_at = now;
        }
    }

    async fn insert_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        name: String,
        capacity: usize,
    ) -> Option<PlayerEntity> {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        state.open_room_mut(room_id)?;
        let players = state.players.entry(room_id).or_default();
        if players.len() >= capacity || players.contains_key(&player_token) {
            return None;
        }

        let player = PlayerEntity {
            room_id,
            player_token,
            name,
            score: 0,
            connected: true,
            created_at: now,
            last_seen_at: now,
        };
        players.insert(player_token, player.clone());
        Some(player)
    }

    async fn find_player(&self, room_id: Uuid, player_token: Uuid) -> Option<PlayerEntity> {
        let state = self.inner.state.lock().await;
        state
            .players
            .get(&room_id)
            .and_then(|players| players.get(&player_token))
            .cloned()
    }

    async fn set_player_connected(&self, room_id: Uuid, player_token: Uuid, connected: bool) {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        if let Some(player) = state.player_mut(room_id, player_token) {
            player.connected = connected;
            player.last_seen_at = now;
        }
    }

    async fn player_count(&self, room_id: Uuid) -> usize {
        let state = self.inner.state.lock().await;
        state.players.get(&room_id).map_or(0, IndexMap::len)
    }

    async fn insert_answer(&self, answer: NewAnswer) -> AnswerOutcome {
        // Read the clock under the lock so no answer lands after a finalize that saw the deadline pass.
        let mut state = self.inner.state.lock().await;
        let now = self.now();
        if now > answer.deadline {
            return AnswerOutcome::PastDeadline;
        }

        let answers = state
            .answers
            .entry((answer.room_id, answer.question_index))
            .or_default();
        if answers.contains_key(&answer.player_token) {
            return AnswerOutcome::Duplicate;
        }
        answers.insert(
            answer.player_token,
            AnswerEntity {
                room_id: answer.room_id,
                player_token: answer.player_token,
                question_index: answer.question_index,
                option_index: answer.option_index,
                answered_at: now,
            },
        );
        AnswerOutcome::Recorded
    }

    async fn answers_for_question(&self, room_id: Uuid, question_index: i32) -> Vec<AnswerEntity> {
        let state = self.inner.state.lock().await;
        state
            .answers
            .get(&(room_id, question_index))
            .map(|answers| answers.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn add_score(&self, room_id: Uuid, player_token: Uuid, points: i64) {
        let now = self.now();
        let mut state = self.inner.state.lock().await;
        if let Some(player) = state.player_mut(room_id, player_token) {
            player.score += points.max(0);
            player.last_seen_at = now;
        }
    }

    async fn leaderboard(&self, room_id: Uuid) -> Vec<PlayerEntity> {
        let state = self.inner.state.lock().await;
        let mut players: Vec<PlayerEntity> = state
            .players
            .get(&room_id)
            .map(|players| players.values().cloned().collect())
            .unwrap_or_default();
        // Stable sort keeps join order among equal scores.
        players.sort_by(|a, b| b.score.cmp(&a.score));
        players
    }

    async fn overdue_rooms(&self) -> Vec<String> {
        let now = self.now();
        let state = self.inner.state.lock().await;
        state
            .rooms
            .values()
            .filter(|room| {
                room.is_open()
                    && room.state == RoomState::Question
                    && room.question_ends_at.is_some_and(|ends_at| ends_at < now)
            })
            .map(|room| room.pin.clone())
            .collect()
    }

    async fn abandoned_rooms(&self, grace: Duration) -> Vec<RoomEntity> {
        let now = self.now();
        let state = self.inner.state.lock().await;
        state
            .rooms
            .values()
            .filter(|room| room.is_open() && host_absent_longer_than(room, now, grace))
            .cloned()
            .collect()
    }
}

fn host_absent_longer_than(room: &RoomEntity, now: SystemTime, grace: Duration) -> bool {
    if room.host_connected {
        return false;
    }
    room.host_disconnected_at
        .and_then(|since| now.duration_since(since).ok())
        .is_some_and(|absent| absent > grace)
}

impl RoomStore for MemoryRoomStore {
    fn create_room(
        &self,
        pin: String,
        host_token: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.create_room(pin, host_token).await) })
    }

    fn find_open_room(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find_open_room(pin).await) })
    }

    fn start_question(
        &self,
        room_id: Uuid,
        from: RoomState,
        index: i32,
        duration: Duration,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.start_question(room_id, from, index, duration).await) })
    }

    fn finish_question(
        &self,
        room_id: Uuid,
        index: i32,
    ) -> BoxFuture<'static, StorageResult<FinishQuestionOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.finish_question(room_id, index).await) })
    }

    fn finish_game(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.finish_game(room_id).await) })
    }

    fn close_abandoned_room(
        &self,
        room_id: Uuid,
        grace: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.close_abandoned_room(room_id, grace).await) })
    }

    fn set_host_connected(
        &self,
        room_id: Uuid,
        connected: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.set_host_connected(room_id, connected).await;
            Ok(())
        })
    }

    fn touch_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.touch_room(room_id).await;
            Ok(())
        })
    }

    fn insert_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        name: String,
        capacity: usize,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .insert_player(room_id, player_token, name, capacity)
                .await)
        })
    }

    fn find_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.find_player(room_id, player_token).await) })
    }

    fn set_player_connected(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        connected: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_player_connected(room_id, player_token, connected)
                .await;
            Ok(())
        })
    }

    fn player_count(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.player_count(room_id).await) })
    }

    fn insert_answer(&self, answer: NewAnswer) -> BoxFuture<'static, StorageResult<AnswerOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.insert_answer(answer).await) })
    }

    fn answers_for_question(
        &self,
        room_id: Uuid,
        question_index: i32,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.answers_for_question(room_id, question_index).await) })
    }

    fn add_score(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        points: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.add_score(room_id, player_token, points).await;
            Ok(())
        })
    }

    fn leaderboard(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.leaderboard(room_id).await) })
    }

    fn overdue_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.overdue_rooms().await) })
    }

    fn abandoned_rooms(
        &self,
        grace: Duration,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.abandoned_rooms(grace).await) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::clock::ManualClock;

    fn store() -> (MemoryRoomStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MemoryRoomStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn pin_is_unique_among_open_rooms_only() {
        let (store, clock) = store();
        let first = store
            .create_room("123456".into(), Uuid::new_v4())
            .await
            .unwrap();
        assert!(store.create_room("123456".into(), Uuid::new_v4()).await.is_none());

        store.set_host_connected(first.id, false).await;
        clock.advance(Duration::from_secs(11));
        assert!(store.close_abandoned_room(first.id, Duration::from_secs(10)).await);

        assert!(store.find_open_room("123456".into()).await.is_none());
        assert!(store.create_room("123456".into(), Uuid::new_v4()).await.is_some());
    }

    #[tokio::test]
    async fn start_question_requires_expected_state() {
        let (store, clock) = store();
        let room = store.create_room("111111".into(), Uuid::new_v4()).await.unwrap();

        assert!(
            store
                .start_question(room.id, RoomState::Results, 0, Duration::from_secs(15))
                .await
                .is_none()
        );

        let started = store
            .start_question(room.id, RoomState::Lobby, 0, Duration::from_secs(15))
            .await
            .unwrap();
        assert_eq!(started.state, RoomState::Question);
        assert_eq!(started.current_question_index, 0);
        assert_eq!(
            started.question_ends_at,
            Some(clock.now() + Duration::from_secs(15))
        );
    }

    #[tokio::test]
    async fn start_question_only_opens_the_following_index() {
        let (store, clock) = store();
        let room = store.create_room("333333".into(), Uuid::new_v4()).await.unwrap();
        assert!(
            store
                .start_question(room.id, RoomState::Lobby, 1, Duration::from_secs(5))
                .await
                .is_none()
        );

        for index in 0..2 {
            let from = if index == 0 { RoomState::Lobby } else { RoomState::Results };
            store
                .start_question(room.id, from, index, Duration::from_secs(5))
                .await
                .unwrap();
            clock.advance(Duration::from_secs(6));
            assert!(matches!(
                store.finish_question(room.id, index).await,
                FinishQuestionOutcome::Finished(_)
            ));
        }

        // A host that read RESULTS(0) must not reopen question 1 once it has been played.
        assert!(
            store
                .start_question(room.id, RoomState::Results, 1, Duration::from_secs(5))
                .await
                .is_none()
        );
        assert!(
            store
                .start_question(room.id, RoomState::Results, 2, Duration::from_secs(5))
                .await
                .is_some()
        );
    }

    #[tokio::test]
    async fn finish_question_is_a_single_winner_compare_and_set() {
        let (store, clock) = store();
        let room = store.create_room("222222".into(), Uuid::new_v4()).await.unwrap();
        store
            .start_question(room.id, RoomState::Lobby, 0, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            store.finish_question(room.id, 0).await,
            FinishQuestionOutcome::NotDue
        );

        clock.advance(Duration::from_secs(6));
        assert!(matches!(
            store.finish_question(room.id, 0).await,
            FinishQuestionOutcome::Finished(_)
        ));
        assert_eq!(
            store.finish_question(room.id, 0).await,
            FinishQuestionOutcome::AlreadyFinished
        );
    }

    #[tokio::test]
    async fn answers_are_recorded_once_and_only_before_deadline() {
        let (store, clock) = store();
        let room_id = Uuid::new_v4();
        let player = Uuid::new_v4();
        let deadline = clock.now() + Duration::from_secs(10);
        let answer = |option_index| NewAnswer {
            room_id,
            player_token: player,
            question_index: 0,
            option_index,
            deadline,
        };

        assert_eq!(store.insert_answer(answer(1)).await, AnswerOutcome::Recorded);
        assert_eq!(store.insert_answer(answer(2)).await, AnswerOutcome::Duplicate);

        let stored = store.answers_for_question(room_id, 0).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].option_index, 1);

        clock.advance(Duration::from_secs(11));
        let late = NewAnswer {
            player_token: Uuid::new_v4(),
            ..answer(1)
        };
        assert_eq!(store.insert_answer(late).await, AnswerOutcome::PastDeadline);
    }

    #[tokio::test]
    async fn insert_player_respects_capacity() {
        let (store, _clock) = store();
        let room = store.create_room("333333".into(), Uuid::new_v4()).await.unwrap();

        assert!(store.insert_player(room.id, Uuid::new_v4(), "a".into(), 2).await.is_some());
        assert!(store.insert_player(room.id, Uuid::new_v4(), "b".into(), 2).await.is_some());
        assert!(store.insert_player(room.id, Uuid::new_v4(), "c".into(), 2).await.is_none());
        assert_eq!(store.player_count(room.id).await, 2);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_score_then_join_order() {
        let (store, _clock) = store();
        let room = store.create_room("444444".into(), Uuid::new_v4()).await.unwrap();
        let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.insert_player(room.id, alice, "Alice".into(), 10).await;
        store.insert_player(room.id, bob, "Bob".into(), 10).await;
        store.insert_player(room.id, carol, "Carol".into(), 10).await;

        store.add_score(room.id, bob, 1200).await;
        store.add_score(room.id, carol, 1200).await;

        let names: Vec<String> = store
            .leaderboard(room.id)
            .await
            .into_iter()
            .map(|player| player.name)
            .collect();
        assert_eq!(names, ["Bob", "Carol", "Alice"]);
    }

    #[tokio::test]
    async fn abandoned_rooms_wait_for_the_grace_period() {
        let (store, clock) = store();
        let room = store.create_room("555555".into(), Uuid::new_v4()).await.unwrap();
        store.set_host_connected(room.id, false).await;

        clock.advance(Duration::from_secs(30));
        assert!(store.abandoned_rooms(Duration::from_secs(60)).await.is_empty());
        assert!(!store.close_abandoned_room(room.id, Duration::from_secs(60)).await);

        clock.advance(Duration::from_secs(31));
        assert_eq!(store.abandoned_rooms(Duration::from_secs(60)).await.len(), 1);

        store.set_host_connected(room.id, true).await;
        assert!(!store.close_abandoned_room(room.id, Duration::from_secs(60)).await);
    }
}
