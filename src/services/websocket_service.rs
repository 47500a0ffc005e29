use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::{hydration, room_service},
    state::{SharedState, channels::ClientConnection, identity::ConnectionId},
};

const SUBMIT_ANSWER: &str = "submit_answer";

/// Which advisory event carries a failure back to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvisoryChannel {
    Error,
    Join,
    Reconnect,
    /// Answers are silently dropped unless rate limited.
    Answer,
}

/// Handle the full lifecycle of one quiz WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to serialize message `{message:?}`");
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    state.channels().register(ClientConnection {
        id: connection,
        tx: outbound_tx.clone(),
    });
    info!(%connection, "client connected");

    // Pings are answered by the transport itself.
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_text(&state, connection, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_)) => {}
            Err(err) => {
                warn!(%connection, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Err(err) = room_service::disconnect(&state, connection).await {
        warn!(%connection, error = %err, "failed to record disconnect");
    }
    info!(%connection, "client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Parse one inbound frame and dispatch it, turning failures into advisories.
pub async fn handle_text(state: &SharedState, connection: ConnectionId, text: &str) {
    let frame = match serde_json::from_str::<Value>(text) {
        Ok(frame) => frame,
        Err(err) => return reject_frame(state, connection, &err),
    };
    let message = match ClientMessage::deserialize(&frame) {
        Ok(message) => message,
        // Answers are dropped without feedback, however they are malformed.
        Err(err) if frame.get("event").and_then(Value::as_str) == Some(SUBMIT_ANSWER) => {
            debug!(%connection, error = %err, "dropped malformed answer");
            return;
        }
        Err(err) => return reject_frame(state, connection, &err),
    };

    let event = message.name();
    let (channel, result) = dispatch(state, connection, message).await;
    if let Err(err) = result {
        report(state, connection, event, channel, err);
    }
}

fn reject_frame(state: &SharedState, connection: ConnectionId, err: &serde_json::Error) {
    debug!(%connection, error = %err, "rejected malformed frame");
    state.channels().send(
        connection,
        ServerMessage::Error {
            message: "Invalid payload".into(),
        },
    );
}

async fn dispatch(
    state: &SharedState,
    connection: ConnectionId,
    message: ClientMessage,
) -> (AdvisoryChannel, Result<(), ServiceError>) {
    match message {
        ClientMessage::CreateRoom => (
            AdvisoryChannel::Error,
            room_service::create_room(state, connection).await.map(drop),
        ),
        ClientMessage::JoinRoom(request) => (
            AdvisoryChannel::Join,
            room_service::join_room(state, connection, request)
                .await
                .map(drop),
        ),
        ClientMessage::ReconnectHost(request) => (
            AdvisoryChannel::Reconnect,
            hydration::reconnect_host(state, connection, request)
                .await
                .map(drop),
        ),
        ClientMessage::ReconnectPlayer(request) => (
            AdvisoryChannel::Reconnect,
            hydration::reconnect_player(state, connection, request)
                .await
                .map(drop),
        ),
        ClientMessage::StartGame(request) => (
            AdvisoryChannel::Error,
            room_service::start_game(state, connection, request)
                .await
                .map(drop),
        ),
        ClientMessage::NextQuestion(request) => (
            AdvisoryChannel::Error,
            room_service::next_question(state, connection, request)
                .await
                .map(drop),
        ),
        ClientMessage::SubmitAnswer(request) => (
            AdvisoryChannel::Answer,
            room_service::submit_answer(state, connection, request)
                .await
                .map(drop),
        ),
    }
}

fn report(
    state: &SharedState,
    connection: ConnectionId,
    event: &'static str,
    channel: AdvisoryChannel,
    err: ServiceError,
) {
    match &err {
        ServiceError::Unavailable(_) | ServiceError::Degraded => {
            warn!(%connection, event, error = %err, "storage failure while handling event");
        }
        _ => debug!(%connection, event, error = %err, "event rejected"),
    }

    if channel == AdvisoryChannel::Answer && !matches!(err, ServiceError::RateLimited(_)) {
        return;
    }
    let Some(message) = err.advisory() else {
        return;
    };
    let advisory = match channel {
        AdvisoryChannel::Join => ServerMessage::JoinError { message },
        AdvisoryChannel::Reconnect => ServerMessage::ReconnectError { message },
        AdvisoryChannel::Error | AdvisoryChannel::Answer => ServerMessage::Error { message },
    };
    state.channels().send(connection, advisory);
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<ServerMessage>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
