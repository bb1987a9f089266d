//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, message
//! parsing, session context tracking, and forwarding events to the
//! coordinator. Losing the socket while a room binding is active is
//! reported to the coordinator as a disconnect; a voluntary leave clears
//! the binding without closing the socket.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::coordinator::Coordinator;
use crate::error::AppError;
use crate::message::{ClientMessage, ErrorCode, ServerMessage};
use crate::types::{Identity, RoomCode};

/// Outbound buffer per connection; a peer that falls this far behind
/// starts losing deliveries rather than stalling the room
const PEER_BUFFER: usize = 256;

/// Session context resolved from the join handshake: the authenticated
/// identity and the room it is bound to.
type SessionContext = Option<(Identity, RoomCode)>;

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, spawns the write task, and runs the
/// read loop until the peer closes or errors. Events arriving without a
/// valid session context are answered with an error and otherwise dropped.
pub async fn handle_connection(stream: TcpStream, coordinator: Coordinator) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel for coordinator/server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(PEER_BUFFER);

    // Write task (ServerMessage -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    let mut session: SessionContext = None;

    // Read loop (WebSocket -> coordinator)
    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    if !dispatch(&coordinator, &mut session, &msg_tx, client_msg).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Invalid JSON from {}: {}", peer_addr, e);
                    let _ = msg_tx.send(AppError::Json(e).into()).await;
                }
            },
            Ok(Message::Close(_)) => {
                debug!("Peer {} sent close frame", peer_addr);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Pong is handled automatically by tungstenite
            }
            Ok(_) => {
                // Binary or other message types - ignore
            }
            Err(e) => {
                error!("WebSocket error for {}: {}", peer_addr, e);
                break;
            }
        }
    }

    // Abrupt loss of the socket while still bound to a room
    if let Some((identity, code)) = session.take() {
        coordinator.on_disconnect(&identity, &code);
        info!("{} disconnected from {}", identity, peer_addr);
    }

    // Let the write task flush and close the socket
    drop(msg_tx);
    let _ = write_task.await;

    Ok(())
}

/// Apply one client message to the coordinator
///
/// Returns false when the connection should be closed (rejected join).
async fn dispatch(
    coordinator: &Coordinator,
    session: &mut SessionContext,
    msg_tx: &mpsc::Sender<ServerMessage>,
    msg: ClientMessage,
) -> bool {
    match msg {
        ClientMessage::CreateRoom => {
            let reply = match coordinator.create_room() {
                Ok(code) => ServerMessage::RoomCreated {
                    room_code: code.to_string(),
                },
                Err(e) => e.into(),
            };
            let _ = msg_tx.send(reply).await;
            true
        }
        ClientMessage::CheckRoom { room_code } => {
            let code = RoomCode::from_string(room_code);
            let exists = coordinator.room_exists(&code);
            let _ = msg_tx
                .send(ServerMessage::RoomExists {
                    room_code: code.to_string(),
                    exists,
                })
                .await;
            true
        }
        ClientMessage::Join { name, room_code } => {
            if session.is_some() {
                let _ = msg_tx
                    .send(ServerMessage::Error {
                        code: ErrorCode::AlreadyInRoom,
                        message: "You are already in a room".to_string(),
                    })
                    .await;
                return true;
            }

            let identity = Identity::new(name);
            let code = RoomCode::from_string(room_code);

            // The session layer vouches for the identity; make sure the
            // store knows it before records get stamped
            coordinator.directory().register(&identity);

            if coordinator.on_connect(&identity, &code, msg_tx.clone()) {
                *session = Some((identity, code));
                true
            } else {
                // Either the room vanished or the identity already holds
                // a slot; the connection is refused either way
                let reply = if coordinator.room_exists(&code) {
                    AppError::DuplicateIdentity(identity.to_string())
                } else {
                    AppError::RoomNotFound(code.to_string())
                };
                let _ = msg_tx.send(reply.into()).await;
                false
            }
        }
        ClientMessage::Chat { body } => {
            let Some((identity, code)) = session.as_ref() else {
                let _ = msg_tx
                    .send(ServerMessage::Error {
                        code: ErrorCode::NotInRoom,
                        message: "You are not in a room".to_string(),
                    })
                    .await;
                return true;
            };
            if let Err(e) = coordinator.on_message(identity, code, body) {
                // UnknownSender: structurally impossible after a join, but
                // absorbed here rather than killing the connection
                warn!("Message from {} discarded: {}", identity, e);
            }
            true
        }
        ClientMessage::Leave => {
            match session.take() {
                Some((identity, code)) => {
                    coordinator.on_leave(&identity, &code);
                }
                None => {
                    let _ = msg_tx
                        .send(ServerMessage::Error {
                            code: ErrorCode::NotInRoom,
                            message: "You are not in a room".to_string(),
                        })
                        .await;
                }
            }
            true
        }
    }
}
