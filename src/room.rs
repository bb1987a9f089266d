//! Room struct definition
//!
//! A room is an ephemeral broadcast group: a member set, the outbound
//! channels of its current connections, and an append-only message history.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::message::{ChatRecord, ServerMessage};
use crate::types::{Identity, RoomCode};

/// Outbound channel for one connection joined to a room.
pub type Peer = mpsc::Sender<ServerMessage>;

/// Multi-member chat room
///
/// All fields are guarded by the per-room lock in the registry; the room
/// itself performs no synchronization. `members` and `names` track the same
/// membership (`members == names.len()` after every completed transition);
/// both are kept because `members` is the emptiness signal the reclaimer
/// checks.
#[derive(Debug)]
pub struct Room {
    /// Logical generation id; a reclaim timer only deletes the room whose
    /// id it captured, never a later room that recycled the code
    pub id: Uuid,
    /// Room code for identification
    pub code: RoomCode,
    /// Count of currently-joined connections
    pub members: usize,
    /// Identities currently joined (one slot per identity)
    names: HashSet<Identity>,
    /// Outbound channel per joined connection
    peers: HashMap<Identity, Peer>,
    /// Delivered messages in acceptance order
    pub history: Vec<ChatRecord>,
    /// Set when the room is logically deleted; operations that resolved
    /// the room before deletion treat a closed room as absent
    closed: bool,
    /// Room creation time
    pub created_at: Instant,
}

impl Room {
    /// Create a new empty room with the given code
    pub fn new(code: RoomCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            members: 0,
            names: HashSet::new(),
            peers: HashMap::new(),
            history: Vec::new(),
            closed: false,
            created_at: Instant::now(),
        }
    }

    /// Check if the room has no members
    pub fn is_empty(&self) -> bool {
        self.members == 0
    }

    /// Check if the room has been logically deleted
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the room as logically deleted
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Check if an identity is currently joined
    pub fn contains(&self, identity: &Identity) -> bool {
        self.names.contains(identity)
    }

    /// Add an identity with its outbound channel
    ///
    /// Rejects a second join for an identity that is still present,
    /// without mutating state.
    pub fn join(&mut self, identity: Identity, peer: Peer) -> Result<(), AppError> {
        if self.names.contains(&identity) {
            return Err(AppError::DuplicateIdentity(identity.to_string()));
        }
        self.peers.insert(identity.clone(), peer);
        self.names.insert(identity);
        self.members += 1;
        Ok(())
    }

    /// Remove an identity from the room
    ///
    /// Returns true if the identity was present. Removing an absent
    /// identity is a no-op (stale disconnect events are expected).
    pub fn remove(&mut self, identity: &Identity) -> bool {
        if !self.names.remove(identity) {
            return false;
        }
        self.peers.remove(identity);
        self.members -= 1;
        true
    }

    /// Append a record to history and deliver it to every current peer
    ///
    /// Delivery is fire-and-forget: a closed or full peer channel is the
    /// transport layer's concern and does not affect the history append.
    pub fn broadcast(&mut self, record: ChatRecord) {
        for peer in self.peers.values() {
            let _ = peer.try_send(ServerMessage::Message(record.clone()));
        }
        self.history.push(record);
    }

    /// Send a message to one joined identity, if present
    pub fn send_to(&self, identity: &Identity, msg: ServerMessage) {
        if let Some(peer) = self.peers.get(identity) {
            let _ = peer.try_send(msg);
        }
    }

    /// Membership invariant check: count matches the name set
    pub fn is_consistent(&self) -> bool {
        self.members == self.names.len() && self.members == self.peers.len()
    }
}
