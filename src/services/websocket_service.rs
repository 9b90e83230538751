//! WebSocket lifecycle for duel clients: handshake, command loop, teardown.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientCommand, ServerEvent},
    engine::{master::ClientConnection, protocol::CommandOrigin},
    error::ServiceError,
    state::SharedState,
};

/// Handle the full lifecycle for an individual duel WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    // A connection must authenticate before anything else is accepted.
    let handshake_timeout = state.config().handshake_timeout();
    let initial_message = match tokio::time::timeout(handshake_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket authentication timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let command = match ClientCommand::from_json_str(&initial_message) {
        Ok(command) => command,
        Err(err) => {
            warn!(error = %err, "failed to parse handshake message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let ClientCommand::Authenticate {
        user_id,
        username,
        token,
    } = command
    else {
        warn!("first message was not an authenticate command");
        let err =
            ServiceError::Unauthorized("the first message must authenticate the connection".into());
        send_event(
            &outbound_tx,
            &ServerEvent::MatchError {
                error: err.to_string(),
                code: err.code().to_string(),
            },
        );
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    if let Err(err) = state.verifier().verify(user_id, token).await {
        warn!(%user_id, error = %err, "handshake token rejected");
        let err = ServiceError::Unauthorized(err.to_string());
        send_event(
            &outbound_tx,
            &ServerEvent::MatchError {
                error: err.to_string(),
                code: err.code().to_string(),
            },
        );
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let socket_id = Uuid::new_v4();
    state.master().register_connection(ClientConnection {
        socket_id,
        user_id,
        username,
        tx: outbound_tx.clone(),
    });
    send_event(&outbound_tx, &ServerEvent::Authenticated { user_id });

    let origin = CommandOrigin {
        socket: socket_id,
        user_id,
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match ClientCommand::from_json_str(&text) {
                Ok(ClientCommand::Authenticate { .. }) => {
                    warn!(%socket_id, "ignoring duplicate authenticate command");
                }
                Ok(command) => {
                    state.master().dispatch(origin, command).await;
                }
                Err(err) => {
                    warn!(%socket_id, error = %err, "failed to parse client command");
                    send_event(
                        &outbound_tx,
                        &ServerEvent::MatchError {
                            error: err.to_string(),
                            code: "validation_error".into(),
                        },
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%socket_id, "client closed the connection");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%socket_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.master().remove_connection(socket_id);
    finalize(writer_task, outbound_tx).await;
}

/// Serialize an event and push it onto the connection's writer channel.
fn send_event(tx: &mpsc::UnboundedSender<Message>, event: &ServerEvent) {
    match serde_json::to_string(event) {
        Ok(payload) => {
            let _ = tx.send(Message::Text(payload.into()));
        }
        Err(err) => warn!(error = %err, "failed to serialize event `{event:?}`"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
