//! Error types for the chat relay
//!
//! Defines application-level errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers fatal errors (connection termination), race-class conditions
/// that are absorbed locally (`RoomNotFound` during steady-state event
/// handling), and structural violations surfaced to the immediate caller
/// (`DuplicateIdentity`, `UnknownSender`).
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Room not found with the given code
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Code collision on room creation
    #[error("Room already exists: {0}")]
    AlreadyExists(String),

    /// Identity already occupies a slot in the room
    #[error("Identity '{0}' is already in the room")]
    DuplicateIdentity(String),

    /// Broadcast requested for an identity absent from the identity store
    #[error("Unknown sender: {0}")]
    UnknownSender(String),

    /// No unique room code found within the retry ceiling (fatal:
    /// alphabet/length too small for the current room count)
    #[error("Room code generator exhausted after {attempts} attempts")]
    GeneratorExhausted { attempts: usize },
}
