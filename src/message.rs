//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization, plus the `ChatRecord`
//! entry stored in room history.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One delivered message, as stored in room history
///
/// Immutable once constructed. The decoration is copied from the identity
/// store at broadcast time; the timestamp is wall-clock at minute
/// resolution. Join/leave notifications use the same shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRecord {
    /// Sender identity
    pub sender: String,
    /// Message body
    pub body: String,
    /// Wall-clock time of acceptance ("%H:%M")
    pub time: String,
    /// Sender's decoration, opaque to the relay
    pub decoration: String,
}

impl ChatRecord {
    /// Construct a record stamped with the current wall-clock time
    pub fn now(sender: impl Into<String>, body: impl Into<String>, decoration: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            time: chrono::Local::now().format("%H:%M").to_string(),
            decoration: decoration.into(),
        }
    }
}

/// Client → Server message
///
/// All messages from client to server. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a new room (does not join it)
    CreateRoom,
    /// Check whether a room code refers to a live room
    CheckRoom { room_code: String },
    /// Join a room under the given identity
    Join { name: String, room_code: String },
    /// Send a chat message to the joined room
    Chat { body: String },
    /// Leave the current room voluntarily
    Leave,
}

/// Server → Client message
///
/// All messages from server to client. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room created successfully
    RoomCreated { room_code: String },
    /// Result of a CheckRoom request
    RoomExists { room_code: String, exists: bool },
    /// Joined a room; carries the history backlog at join time
    Joined {
        room_code: String,
        history: Vec<ChatRecord>,
    },
    /// A chat message or join/leave notification for the room
    Message(ChatRecord),
    /// Error occurred
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
///
/// Represents different error scenarios that can be communicated to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Non-existent room code
    RoomNotFound,
    /// Identity already joined to the room
    DuplicateIdentity,
    /// Attempted chat without joining a room
    NotInRoom,
    /// Already in a room
    AlreadyInRoom,
    /// No unique room code could be generated
    GeneratorExhausted,
    /// Invalid message format
    InvalidMessage,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::RoomNotFound(room_code) => {
                (ErrorCode::RoomNotFound, format!("Room '{}' not found", room_code))
            }
            AppError::DuplicateIdentity(name) => (
                ErrorCode::DuplicateIdentity,
                format!("'{}' is already in the room", name),
            ),
            AppError::GeneratorExhausted { .. } => (
                ErrorCode::GeneratorExhausted,
                "Could not allocate a room code".to_string(),
            ),
            AppError::Json(e) => {
                (ErrorCode::InvalidMessage, format!("Invalid message format: {}", e))
            }
            // Fatal errors are not typically converted (connection closes)
            _ => {
                (ErrorCode::InvalidMessage, "Internal error".to_string())
            }
        };
        ServerMessage::Error { code, message }
    }
}
