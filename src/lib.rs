//! Multi-room WebSocket Chat Relay Library
//!
//! A chat relay built with tokio-tungstenite: rooms are created under
//! short generated codes, participants join by code, and messages are
//! broadcast to the room in acceptance order.
//!
//! # Features
//! - Room creation with short uppercase codes (collision-checked)
//! - Joining by code, one active slot per identity per room
//! - In-memory message history, replayed to late joiners
//! - Join/leave notifications stamped with the sender's decoration
//! - Grace-window reclamation of rooms emptied by a disconnect,
//!   so a page reload does not destroy the room
//!
//! # Architecture
//! State lives behind two lock levels:
//! - The [`registry::Registry`] map has its own short-lived lock for
//!   room creation, lookup, and deletion.
//! - Each room sits behind its own mutex, the single critical section
//!   for that room's membership, history, and peers. Events for
//!   different rooms never contend.
//!
//! Locks are never held across an await point: delivery to peers is a
//! non-blocking `try_send`, and the reclaim timer only takes the room
//! lock when it fires.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::{Coordinator, CoordinatorConfig, Directory, Registry, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(Registry::new());
//!     let directory = Arc::new(Directory::new());
//!     let coordinator = Coordinator::new(registry, directory, CoordinatorConfig::default());
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, coordinator.clone()));
//!     }
//! }
//! ```

pub mod coordinator;
pub mod directory;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod types;

// Re-export main types for convenience
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use directory::Directory;
pub use error::AppError;
pub use handler::handle_connection;
pub use message::{ChatRecord, ClientMessage, ErrorCode, ServerMessage};
pub use registry::Registry;
pub use room::Room;
pub use types::{Identity, RoomCode};
