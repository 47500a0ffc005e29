use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{AnswerEntity, PlayerEntity, RoomEntity},
    state::state_machine::RoomState,
};

pub const ROOM_COLLECTION_NAME: &str = "rooms";
pub const PLAYER_COLLECTION_NAME: &str = "players";
pub const ANSWER_COLLECTION_NAME: &str = "answers";

/// Room document. Identifiers are stored as hyphenated strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub pin: String,
    pub host_token: String,
    pub state: RoomState,
    pub current_question_index: i32,
    pub question_started_at: Option<DateTime>,
    pub question_ends_at: Option<DateTime>,
    pub host_connected: bool,
    pub host_disconnected_at: Option<DateTime>,
    pub created_at: DateTime,
    pub last_activity_at: DateTime,
    pub closed_at: Option<DateTime>,
    /// Mirrors `closed_at == null`; the partial unique index on `pin` filters on it.
    pub open: bool,
}

impl MongoRoomDocument {
    pub fn new_lobby(id: Uuid, pin: String, host_token: Uuid, now: DateTime) -> Self {
        Self {
            id: id.to_string(),
            pin,
            host_token: host_token.to_string(),
            state: RoomState::Lobby,
            current_question_index: -1,
            question_started_at: None,
            question_ends_at: None,
            host_connected: true,
            host_disconnected_at: None,
            created_at: now,
            last_activity_at: now,
            closed_at: None,
            open: true,
        }
    }
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(ROOM_COLLECTION_NAME, &value.id)?,
            pin: value.pin,
            host_token: parse_uuid(ROOM_COLLECTION_NAME, &value.host_token)?,
            state: value.state,
            current_question_index: value.current_question_index,
            question_started_at: value.question_started_at.map(DateTime::to_system_time),
            question_ends_at: value.question_ends_at.map(DateTime::to_system_time),
            host_connected: value.host_connected,
            host_disconnected_at: value.host_disconnected_at.map(DateTime::to_system_time),
            created_at: value.created_at.to_system_time(),
            last_activity_at: value.last_activity_at.to_system_time(),
            closed_at: value.closed_at.map(DateTime::to_system_time),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    pub room_id: String,
    pub player_token: String,
    pub name: String,
    pub score: i64,
    pub connected: bool,
    pub created_at: DateTime,
    pub last_seen_at: DateTime,
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> MongoResult<Self> {
        Ok(Self {
            room_id: parse_uuid(PLAYER_COLLECTION_NAME, &value.room_id)?,
            player_token: parse_uuid(PLAYER_COLLECTION_NAME, &value.player_token)?,
            name: value.name,
            score: value.score,
            connected: value.connected,
            created_at: value.created_at.to_system_time(),
            last_seen_at: value.last_seen_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    pub room_id: String,
    pub player_token: String,
    pub question_index: i32,
    pub option_index: i32,
    pub answered_at: DateTime,
}

impl TryFrom<MongoAnswerDocument> for AnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> MongoResult<Self> {
        Ok(Self {
            room_id: parse_uuid(ANSWER_COLLECTION_NAME, &value.room_id)?,
            player_token: parse_uuid(ANSWER_COLLECTION_NAME, &value.player_token)?,
            question_index: value.question_index,
            option_index: value.option_index,
            answered_at: value.answered_at.to_system_time(),
        })
    }
}

fn parse_uuid(collection: &'static str, raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::Corrupted {
        collection,
        reason: format!("invalid identifier `{raw}`: {err}"),
    })
}
