use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB handshake failed after {attempts} attempt(s)")]
    Handshake {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to read MongoDB server time")]
    ServerTime {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to write room `{pin}`")]
    CreateRoom {
        pin: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load room `{pin}`")]
    LoadRoom {
        pin: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to update room `{id}`")]
    UpdateRoom {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to scan rooms")]
    ScanRooms {
        #[source]
        source: MongoError,
    },
    #[error("failed to access players of room `{room_id}`")]
    Players {
        room_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to access answers of room `{room_id}`")]
    Answers {
        room_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("corrupted document in `{collection}`: {reason}")]
    Corrupted {
        collection: &'static str,
        reason: String,
    },
}
