use std::{sync::Arc, time::Duration};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::{establish_connection, server_time},
    error::{MongoDaoError, MongoResult},
    models::{
        ANSWER_COLLECTION_NAME, MongoAnswerDocument, MongoPlayerDocument, MongoRoomDocument,
        PLAYER_COLLECTION_NAME, ROOM_COLLECTION_NAME,
    },
};
use crate::{
    dao::{
        models::{AnswerEntity, AnswerOutcome, FinishQuestionOutcome, PlayerEntity, RoomEntity},
        room_store::{NewAnswer, RoomStore},
        storage::StorageResult,
    },
    state::state_machine::RoomState,
};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed [`RoomStore`]. Every timestamp comes from the server clock,
/// either through `$$NOW` in pipeline updates or `hello.localTime` for inserts.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let open_pin = IndexModel::builder()
            .keys(doc! { "pin": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("room_open_pin_idx".to_owned()))
                    .unique(Some(true))
                    .partial_filter_expression(Some(doc! { "open": true }))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(ROOM_COLLECTION_NAME)
            .create_index(open_pin)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "pin",
                source,
            })?;

        let room_state = IndexModel::builder()
            .keys(doc! { "open": 1, "state": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("room_state_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(ROOM_COLLECTION_NAME)
            .create_index(room_state)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "open,state",
                source,
            })?;

        let player_identity = IndexModel::builder()
            .keys(doc! { "room_id": 1, "player_token": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("player_room_token_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(PLAYER_COLLECTION_NAME)
            .create_index(player_identity)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYER_COLLECTION_NAME,
                index: "room_id,player_token",
                source,
            })?;

        let single_answer = IndexModel::builder()
            .keys(doc! { "room_id": 1, "question_index": 1, "player_token": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("answer_once_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();
        database
            .collection::<Document>(ANSWER_COLLECTION_NAME)
            .create_index(single_answer)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ANSWER_COLLECTION_NAME,
                index: "room_id,question_index,player_token",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rooms(&self) -> Collection<MongoRoomDocument> {
        self.database().await.collection(ROOM_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database().await.collection(PLAYER_COLLECTION_NAME)
    }

    async fn answers(&self) -> Collection<MongoAnswerDocument> {
        self.database().await.collection(ANSWER_COLLECTION_NAME)
    }

    /// Current time according to the MongoDB server.
    async fn server_now(&self) -> MongoResult<DateTime> {
        server_time(&self.database().await).await
    }

    async fn create_room(&self, pin: String, host_token: Uuid) -> MongoResult<Option<RoomEntity>> {
        let now = self.server_now().await?;
        let document = MongoRoomDocument::new_lobby(Uuid::new_v4(), pin.clone(), host_token, now);
        match self.rooms().await.insert_one(&document).await {
            Ok(_) => Ok(Some(document.try_into()?)),
            Err(err) if is_duplicate_key(&err) => Ok(None),
            Err(source) => Err(MongoDaoError::CreateRoom { pin, source }),
        }
    }

    async fn find_open_room(&self, pin: String) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc! { "pin": pin.as_str(), "open": true })
            .await
            .map_err(|source| MongoDaoError::LoadRoom {
                pin: pin.clone(),
                source,
            })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn find_room_by_id(&self, id: Uuid) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one(doc! { "_id": id.to_string() })
            .await
            .map_err(|source| MongoDaoError::UpdateRoom { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn update_room(
        &self,
        id: Uuid,
        filter: Document,
        stages: Vec<Document>,
    ) -> MongoResult<Option<RoomEntity>> {
        let document = self
            .rooms()
            .await
            .find_one_and_update(filter, stages)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::UpdateRoom { id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn start_question(
        &self,
        id: Uuid,
        from: RoomState,
        index: i32,
        duration: Duration,
    ) -> MongoResult<Option<RoomEntity>> {
        let duration_ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.update_room(
            id,
            doc! {
                "_id": id.to_string(),
                "open": true,
                "state": from.as_str(),
                "current_question_index": index - 1,
            },
            vec![doc! { "$set": {
                "state": RoomState::Question.as_str(),
                "current_question_index": index,
                "question_started_at": "$$NOW",
                "question_ends_at": { "$add": ["$$NOW", duration_ms] },
                "last_activity_at": "$$NOW",
            }}],
        )
        .await
    }

    async fn finish_question(&self, id: Uuid, index: i32) -> MongoResult<FinishQuestionOutcome> {
        let finished = self
            .update_room(
                id,
                doc! {
                    "_id": id.to_string(),
                    "open": true,
                    "state": RoomState::Question.as_str(),
                    "current_question_index": index,
                    "question_ends_at": { "$ne": null },
                    "$expr": { "$lt": ["$question_ends_at", "$$NOW"] },
                },
                vec![doc! { "$set": {
                    "state": RoomState::Results.as_str(),
                    "last_activity_at": "$$NOW",
                }}],
            )
            .await?;

        if let Some(room) = finished {
            return Ok(FinishQuestionOutcome::Finished(room));
        }

        let still_running = self.find_room_by_id(id).await?.is_some_and(|room| {
            room.is_open()
                && room.state == RoomState::Question
                && room.current_question_index == index
        });
        Ok(if still_running {
            FinishQuestionOutcome::NotDue
        } else {
            FinishQuestionOutcome::AlreadyFinished
        })
    }

    async fn finish_game(&self, id: Uuid) -> MongoResult<bool> {
        let closed = self
            .update_room(
                id,
                doc! { "_id": id.to_string(), "open": true, "state": RoomState::Results.as_str() },
                close_stages(),
            )
            .await?;
        Ok(closed.is_some())
    }

    async fn close_abandoned_room(&self, id: Uuid, grace: Duration) -> MongoResult<bool> {
        let mut filter = abandoned_filter(grace);
        filter.insert("_id", id.to_string());
        let closed = self.update_room(id, filter, close_stages()).await?;
        Ok(closed.is_some())
    }

    async fn set_host_connected(&self, id: Uuid, connected: bool) -> MongoResult<()> {
        let disconnected_at = if connected {
            mongodb::bson::Bson::Null
        } else {
            "$$NOW".into()
        };
        self.rooms()
            .await
            .update_one(
                doc! { "_id": id.to_string(), "open": true },
                vec![doc! { "$set": {
                    "host_connected": connected,
                    "host_disconnected_at": disconnected_at,
                    "last_activity_at": "$$NOW",
                }}],
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom { id, source })?;
        Ok(())
    }

    async fn touch_room(&self, id: Uuid) -> MongoResult<()> {
        self.rooms()
            .await
            .update_one(
                doc! { "_id": id.to_string(), "open": true },
                vec![doc! { "$set": { "last_activity_at": "$$NOW" } }],
            )
            .await
            .map_err(|source| MongoDaoError::UpdateRoom { id, source })?;
        Ok(())
    }

    async fn insert_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        name: String,
        capacity: usize,
    ) -> MongoResult<Option<PlayerEntity>> {
        // Count and insert are separate round-trips; capacity may be exceeded by
        // simultaneous joins on this backend.
        if self.player_count(room_id).await? >= capacity {
            return Ok(None);
        }

        let now = self.server_now().await?;
        let document = MongoPlayerDocument {
            room_id: room_id.to_string(),
            player_token: player_token.to_string(),
            name,
            score: 0,
            connected: true,
            created_at: now,
            last_seen_at: now,
        };
        match self.players().await.insert_one(&document).await {
            Ok(_) => Ok(Some(document.try_into()?)),
            Err(err) if is_duplicate_key(&err) => Ok(None),
            Err(source) => Err(MongoDaoError::Players { room_id, source }),
        }
    }

    async fn find_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
    ) -> MongoResult<Option<PlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(player_filter(room_id, player_token))
            .await
            .map_err(|source| MongoDaoError::Players { room_id, source })?;
        document.map(TryInto::try_into).transpose()
    }

    async fn set_player_connected(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        connected: bool,
    ) -> MongoResult<()> {
        self.players()
            .await
            .update_one(
                player_filter(room_id, player_token),
                vec![doc! { "$set": { "connected": connected, "last_seen_at": "$$NOW" } }],
            )
            .await
            .map_err(|source| MongoDaoError::Players { room_id, source })?;
        Ok(())
    }

    async fn player_count(&self, room_id: Uuid) -> MongoResult<usize> {
        let count = self
            .players()
            .await
            .count_documents(doc! { "room_id": room_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::Players { room_id, source })?;
        Ok(usize::try_from(count).unwrap_or(usize::MAX))
    }

    async fn insert_answer(&self, answer: NewAnswer) -> MongoResult<AnswerOutcome> {
        let now = self.server_now().await?;
        if now > DateTime::from_system_time(answer.deadline) {
            return Ok(AnswerOutcome::PastDeadline);
        }

        let room_id = answer.room_id;
        let document = MongoAnswerDocument {
            room_id: room_id.to_string(),
            player_token: answer.player_token.to_string(),
            question_index: answer.question_index,
            option_index: answer.option_index,
            answered_at: now,
        };
        match self.answers().await.insert_one(&document).await {
            Ok(_) => Ok(AnswerOutcome::Recorded),
            Err(err) if is_duplicate_key(&err) => Ok(AnswerOutcome::Duplicate),
            Err(source) => Err(MongoDaoError::Answers { room_id, source }),
        }
    }

    async fn answers_for_question(
        &self,
        room_id: Uuid,
        question_index: i32,
    ) -> MongoResult<Vec<AnswerEntity>> {
        let documents: Vec<MongoAnswerDocument> = self
            .answers()
            .await
            .find(doc! { "room_id": room_id.to_string(), "question_index": question_index })
            .await
            .map_err(|source| MongoDaoError::Answers { room_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Answers { room_id, source })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn add_score(&self, room_id: Uuid, player_token: Uuid, points: i64) -> MongoResult<()> {
        self.players()
            .await
            .update_one(
                player_filter(room_id, player_token),
                vec![doc! { "$set": {
                    "score": { "$add": ["$score", points.max(0)] },
                    "last_seen_at": "$$NOW",
                }}],
            )
            .await
            .map_err(|source| MongoDaoError::Players { room_id, source })?;
        Ok(())
    }

    async fn leaderboard(&self, room_id: Uuid) -> MongoResult<Vec<PlayerEntity>> {
        let documents: Vec<MongoPlayerDocument> = self
            .players()
            .await
            .find(doc! { "room_id": room_id.to_string() })
            .sort(doc! { "score": -1, "created_at": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::Players { room_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Players { room_id, source })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn overdue_rooms(&self) -> MongoResult<Vec<String>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .await
            .find(doc! {
                "open": true,
                "state": RoomState::Question.as_str(),
                "question_ends_at": { "$ne": null },
                "$expr": { "$lt": ["$question_ends_at", "$$NOW"] },
            })
            .await
            .map_err(|source| MongoDaoError::ScanRooms { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ScanRooms { source })?;
        Ok(documents.into_iter().map(|room| room.pin).collect())
    }

    async fn abandoned_rooms(&self, grace: Duration) -> MongoResult<Vec<RoomEntity>> {
        let documents: Vec<MongoRoomDocument> = self
            .rooms()
            .await
            .find(abandoned_filter(grace))
            .await
            .map_err(|source| MongoDaoError::ScanRooms { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ScanRooms { source })?;
        documents.into_iter().map(TryInto::try_into).collect()
    }
}

fn player_filter(room_id: Uuid, player_token: Uuid) -> Document {
    doc! { "room_id": room_id.to_string(), "player_token": player_token.to_string() }
}

fn abandoned_filter(grace: Duration) -> Document {
    let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
    doc! {
        "open": true,
        "host_connected": false,
        "host_disconnected_at": { "$ne": null },
        "$expr": { "$lt": ["$host_disconnected_at", { "$subtract": ["$$NOW", grace_ms] }] },
    }
}

fn close_stages() -> Vec<Document> {
    vec![doc! { "$set": {
        "state": RoomState::Finished.as_str(),
        "closed_at": "$$NOW",
        "open": false,
        "last_activity_at": "$$NOW",
    }}]
}

fn is_duplicate_key(err: &MongoError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write)) => write.code == DUPLICATE_KEY,
        ErrorKind::Command(command) => command.code == DUPLICATE_KEY,
        _ => false,
    }
}

impl RoomStore for MongoRoomStore {
    fn create_room(
        &self,
        pin: String,
        host_token: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.create_room(pin, host_token).await.map_err(Into::into) })
    }

    fn find_open_room(&self, pin: String) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_open_room(pin).await.map_err(Into::into) })
    }

    fn start_question(
        &self,
        room_id: Uuid,
        from: RoomState,
        index: i32,
        duration: Duration,
    ) -> BoxFuture<'static, StorageResult<Option<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .start_question(room_id, from, index, duration)
                .await
                .map_err(Into::into)
        })
    }

    fn finish_question(
        &self,
        room_id: Uuid,
        index: i32,
    ) -> BoxFuture<'static, StorageResult<FinishQuestionOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.finish_question(room_id, index).await.map_err(Into::into) })
    }

    fn finish_game(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.finish_game(room_id).await.map_err(Into::into) })
    }

    fn close_abandoned_room(
        &self,
        room_id: Uuid,
        grace: Duration,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .close_abandoned_room(room_id, grace)
                .await
                .map_err(Into::into)
        })
    }

    fn set_host_connected(
        &self,
        room_id: Uuid,
        connected: bool,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_host_connected(room_id, connected)
                .await
                .map_err(Into::into)
        })
    }

    fn touch_room(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.touch_room(room_id).await.map_err(Into::into) })
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
            store
                .insert_player(room_id, player_token, name, capacity)
                .await
                .map_err(Into::into)
        })
    }

    fn find_player(
        &self,
        room_id: Uuid,
        player_token: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_player(room_id, player_token)
                .await
                .map_err(Into::into)
        })
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
                .await
                .map_err(Into::into)
        })
    }

    fn player_count(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.player_count(room_id).await.map_err(Into::into) })
    }

    fn insert_answer(&self, answer: NewAnswer) -> BoxFuture<'static, StorageResult<AnswerOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.insert_answer(answer).await.map_err(Into::into) })
    }

    fn answers_for_question(
        &self,
        room_id: Uuid,
        question_index: i32,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .answers_for_question(room_id, question_index)
                .await
                .map_err(Into::into)
        })
    }

    fn add_score(
        &self,
        room_id: Uuid,
        player_token: Uuid,
        points: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .add_score(room_id, player_token, points)
                .await
                .map_err(Into::into)
        })
    }

    fn leaderboard(&self, room_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.leaderboard(room_id).await.map_err(Into::into) })
    }

    fn overdue_rooms(&self) -> BoxFuture<'static, StorageResult<Vec<String>>> {
        let store = self.clone();
        Box::pin(async move { store.overdue_rooms().await.map_err(Into::into) })
    }

    fn abandoned_rooms(
        &self,
        grace: Duration,
    ) -> BoxFuture<'static, StorageResult<Vec<RoomEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.abandoned_rooms(grace).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
