//! Room registry
//!
//! Single point of truth for room existence. The code→room map sits behind
//! its own short-lived lock, independent of the per-room locks; map
//! operations never touch a room's interior state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::AppError;
use crate::room::Room;
use crate::types::RoomCode;

/// A room behind its per-room exclusive section.
///
/// All membership, history, and peer mutation happens under this lock;
/// it is never held across an await point.
pub type RoomCell = Mutex<Room>;

/// Owns the mapping of room code to live room
///
/// Rooms are exclusively owned by the registry: other components resolve a
/// room by code per operation and hold the `Arc` only for the duration of
/// that operation.
#[derive(Debug, Default)]
pub struct Registry {
    rooms: Mutex<HashMap<RoomCode, Arc<RoomCell>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new empty room under the given code
    ///
    /// The existence check and the insertion happen under one lock
    /// acquisition, so two racing creations of the same code cannot both
    /// succeed.
    pub fn create(&self, code: RoomCode) -> Result<Arc<RoomCell>, AppError> {
        let mut rooms = self.rooms.lock();
        if rooms.contains_key(&code) {
            return Err(AppError::AlreadyExists(code.to_string()));
        }
        let cell = Arc::new(Mutex::new(Room::new(code.clone())));
        rooms.insert(code, Arc::clone(&cell));
        Ok(cell)
    }

    /// Generate a fresh code and insert a room under it
    ///
    /// Candidates are drawn and rechecked against the live set under the
    /// map lock, so a candidate cannot be taken by a concurrent creation
    /// between the check and the insert. Gives up after `max_attempts`
    /// draws rather than looping indefinitely: hitting the ceiling means
    /// the alphabet/length is too small for the live room count.
    pub fn create_with_generated(
        &self,
        length: usize,
        max_attempts: usize,
    ) -> Result<(RoomCode, Arc<RoomCell>), AppError> {
        let mut rooms = self.rooms.lock();
        for _ in 0..max_attempts {
            let code = RoomCode::candidate(length);
            if rooms.contains_key(&code) {
                continue;
            }
            let cell = Arc::new(Mutex::new(Room::new(code.clone())));
            rooms.insert(code.clone(), Arc::clone(&cell));
            return Ok((code, cell));
        }
        Err(AppError::GeneratorExhausted {
            attempts: max_attempts,
        })
    }

    /// Resolve a code to its live room
    pub fn lookup(&self, code: &RoomCode) -> Option<Arc<RoomCell>> {
        self.rooms.lock().get(code).cloned()
    }

    /// Check whether a code refers to a live room
    pub fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.lock().contains_key(code)
    }

    /// Remove a room, dropping its history
    ///
    /// Idempotent: deleting an absent code is a no-op. A deferred reclaim
    /// may fire after an explicit leave already removed the room.
    pub fn delete(&self, code: &RoomCode) {
        if self.rooms.lock().remove(code).is_some() {
            debug!("Room {} deleted", code);
        }
    }

    /// Number of live rooms
    pub fn len(&self) -> usize {
        self.rooms.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.lock().is_empty()
    }
}
