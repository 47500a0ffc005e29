use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::{
    room::{HostHydration, LeaderboardEntry, PlayerHydration, QuestionView, ResultsView},
    validation::{validate_pin, validate_player_name},
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Events accepted from WebSocket clients, framed as `{"event": ..., "data": ...}`.
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a new room; the caller becomes its host.
    CreateRoom,
    JoinRoom(JoinRoomRequest),
    ReconnectHost(HostRequest),
    ReconnectPlayer(PlayerRequest),
    StartGame(HostRequest),
    NextQuestion(HostRequest),
    SubmitAnswer(SubmitAnswerRequest),
}

impl ClientMessage {
    /// Wire name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateRoom => "create_room",
            Self::JoinRoom(_) => "join_room",
            Self::ReconnectHost(_) => "reconnect_host",
            Self::ReconnectPlayer(_) => "reconnect_player",
            Self::StartGame(_) => "start_game",
            Self::NextQuestion(_) => "next_question",
            Self::SubmitAnswer(_) => "submit_answer",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
/// Player request to enter a room.
pub struct JoinRoomRequest {
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
    /// Display name; surrounding whitespace is removed before it is stored.
    #[validate(custom(function = "validate_player_name"))]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
/// Host-scoped request proving ownership of a room.
pub struct HostRequest {
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
    pub host_token: Uuid,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
/// Player-scoped request proving membership of a room.
pub struct PlayerRequest {
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
    pub player_token: Uuid,
}

#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema, Validate)]
/// Answer to the currently open question.
pub struct SubmitAnswerRequest {
    #[validate(custom(function = "validate_pin"))]
    pub pin: String,
    pub player_token: Uuid,
    /// Chosen option index, as a number or a numeric string.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[schema(value_type = i64)]
    pub option: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
/// Events pushed to WebSocket clients, framed as `{"event": ..., "data": ...}`.
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomCreated {
        pin: String,
        host_token: Uuid,
    },
    Joined {
        player_token: Uuid,
    },
    PlayerJoined {
        name: String,
    },
    Reconnected(PlayerHydration),
    HostReconnected(HostHydration),
    QuestionStarted(QuestionView),
    QuestionResults(ResultsView),
    GameFinished {
        leaderboard: Vec<LeaderboardEntry>,
    },
    RoomClosed {
        reason: String,
    },
    /// Generic advisory; the connection stays open.
    Error {
        message: String,
    },
    JoinError {
        message: String,
    },
    ReconnectError {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_adjacently_tagged_events() {
        let token = Uuid::new_v4();
        let message: ClientMessage = serde_json::from_value(json!({
            "event": "start_game",
            "data": { "pin": "123456", "host_token": token }
        }))
        .unwrap();
        match message {
            ClientMessage::StartGame(request) => {
                assert_eq!(request.pin, "123456");
                assert_eq!(request.host_token, token);
            }
            other => panic!("unexpected message {other:?}"),
        }

        let message: ClientMessage =
            serde_json::from_value(json!({ "event": "create_room" })).unwrap();
        assert_eq!(message.name(), "create_room");
    }

    #[test]
    fn answer_option_accepts_numeric_strings() {
        let token = Uuid::new_v4();
        for option in [json!(2), json!("2")] {
            let message: ClientMessage = serde_json::from_value(json!({
                "event": "submit_answer",
                "data": { "pin": "123456", "player_token": token, "option": option }
            }))
            .unwrap();
            let ClientMessage::SubmitAnswer(request) = message else {
                panic!("expected submit_answer");
            };
            assert_eq!(request.option, 2);
        }
    }

    #[test]
    fn rejects_unknown_events_and_bad_tokens() {
        assert!(serde_json::from_value::<ClientMessage>(json!({ "event": "buzz" })).is_err());
        assert!(
            serde_json::from_value::<ClientMessage>(json!({
                "event": "reconnect_player",
                "data": { "pin": "123456", "player_token": "not-a-uuid" }
            }))
            .is_err()
        );
    }

    #[test]
    fn join_request_validation_reports_messages() {
        let request = JoinRoomRequest {
            pin: "12345".into(),
            name: "Alice".into(),
        };
        assert!(request.validate().is_err());

        let request = JoinRoomRequest {
            pin: "123456".into(),
            name: "  ".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn server_messages_use_event_envelope() {
        let value = serde_json::to_value(ServerMessage::RoomClosed {
            reason: "host_timeout".into(),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "event": "room_closed", "data": { "reason": "host_timeout" } })
        );
    }
}
