//! Room lifecycle and membership coordinator
//!
//! Applies connection events (join, message, disconnect, leave) to room
//! state and reclaims abandoned rooms. Events for the same room are
//! serialized by that room's lock; events for different rooms proceed in
//! parallel. An emptied room is deleted immediately on a voluntary leave,
//! but a disconnect only arms a grace-window timer that re-checks the room
//! before deleting, so a quick rejoin keeps the room and its history.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{debug, info};
use uuid::Uuid;

use crate::directory::Directory;
use crate::error::AppError;
use crate::message::{ChatRecord, ServerMessage};
use crate::registry::Registry;
use crate::room::Peer;
use crate::types::{Identity, RoomCode};

/// Body of the synthetic notification broadcast on join.
pub const JOINED_BODY: &str = "has entered the room";
/// Body of the synthetic notification broadcast on disconnect/leave.
pub const LEFT_BODY: &str = "has left the room";

/// Coordinator tunables
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Length of generated room codes
    pub code_length: usize,
    /// Retry ceiling for code generation
    pub max_code_attempts: usize,
    /// Grace window between a room emptying via disconnect and its
    /// deletion being re-evaluated
    pub grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            code_length: 4,
            max_code_attempts: 128,
            grace: Duration::from_secs(5),
        }
    }
}

/// The coordinator itself
///
/// Cheap to clone; clones share the registry and directory. Every
/// operation re-resolves its room by code, so no room reference outlives
/// a single call.
#[derive(Debug, Clone)]
pub struct Coordinator {
    registry: Arc<Registry>,
    directory: Arc<Directory>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>, directory: Arc<Directory>, config: CoordinatorConfig) -> Self {
        Self {
            registry,
            directory,
            config,
        }
    }

    /// The identity store this coordinator stamps records from
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Create a new empty room under a freshly generated code
    pub fn create_room(&self) -> Result<RoomCode, AppError> {
        let (code, _) = self
            .registry
            .create_with_generated(self.config.code_length, self.config.max_code_attempts)?;
        info!("Created room {}", code);
        Ok(code)
    }

    /// Check whether a code refers to a live room
    pub fn room_exists(&self, code: &RoomCode) -> bool {
        self.registry.contains(code)
    }

    /// Handle a connect event: join the identity to the room
    ///
    /// Returns false if the join did not happen, signalling the transport
    /// to refuse the connection. A vanished room (deleted between the
    /// join request and the socket-level connect) is a benign race and is
    /// only logged; a duplicate identity is a rejection by design, so one
    /// identity cannot occupy two slots in the same room.
    ///
    /// On success the joiner's channel first receives the history backlog,
    /// then the joined notification along with the rest of the room.
    pub fn on_connect(&self, identity: &Identity, code: &RoomCode, peer: Peer) -> bool {
        let Some(cell) = self.registry.lookup(code) else {
            debug!("Connect for {} dropped: room {} is gone", identity, code);
            return false;
        };
        let Some(decoration) = self.directory.lookup(identity) else {
            debug!("Connect dropped: identity {} unknown", identity);
            return false;
        };

        let mut room = cell.lock();
        if room.is_closed() {
            debug!("Connect for {} dropped: room {} is gone", identity, code);
            return false;
        }

        // Backlog snapshot predates the joined notification
        let history = room.history.clone();
        if let Err(e) = room.join(identity.clone(), peer) {
            debug!("Connect for {} to {} rejected: {}", identity, code, e);
            return false;
        }
        room.send_to(
            identity,
            ServerMessage::Joined {
                room_code: code.to_string(),
                history,
            },
        );
        room.broadcast(ChatRecord::now(identity.as_str(), JOINED_BODY, decoration));

        info!("{} joined room {}", identity, code);
        true
    }

    /// Handle a chat message: append to history and fan out to the room
    ///
    /// A vanished room is absorbed as a benign race. An identity absent
    /// from the store is surfaced as `UnknownSender`; the message is
    /// neither appended nor delivered.
    pub fn on_message(&self, identity: &Identity, code: &RoomCode, body: String) -> Result<(), AppError> {
        let Some(cell) = self.registry.lookup(code) else {
            debug!("Message from {} dropped: room {} is gone", identity, code);
            return Ok(());
        };
        let decoration = self
            .directory
            .lookup(identity)
            .ok_or_else(|| AppError::UnknownSender(identity.to_string()))?;

        let record = ChatRecord::now(identity.as_str(), body, decoration);
        let mut room = cell.lock();
        if room.is_closed() {
            debug!("Message from {} dropped: room {} is gone", identity, code);
            return Ok(());
        }
        room.broadcast(record);
        debug!("{} said something in {}", identity, code);
        Ok(())
    }

    /// Handle an abrupt connection loss
    ///
    /// Removes the identity and broadcasts the left notification. If this
    /// empties the room, the room is not deleted now: a reclaim is armed
    /// instead, so a page reload or brief network loss can rejoin before
    /// the grace window closes.
    pub fn on_disconnect(&self, identity: &Identity, code: &RoomCode) {
        let Some(cell) = self.registry.lookup(code) else {
            return;
        };
        // Last-known decoration, captured before any state removal
        let decoration = self.directory.lookup(identity).unwrap_or_default();

        let mut room = cell.lock();
        if room.is_closed() || !room.remove(identity) {
            return;
        }
        room.broadcast(ChatRecord::now(identity.as_str(), LEFT_BODY, decoration));
        info!("{} has left the room {}", identity, code);

        if room.is_empty() {
            let room_id = room.id;
            drop(room);
            self.schedule_reclaim(code.clone(), room_id);
        }
    }

    /// Handle a voluntary leave
    ///
    /// Same membership mutation as a disconnect, but an emptied room is
    /// deleted synchronously: the departure is deliberate and no
    /// reconnection is anticipated.
    pub fn on_leave(&self, identity: &Identity, code: &RoomCode) {
        let Some(cell) = self.registry.lookup(code) else {
            return;
        };
        let decoration = self.directory.lookup(identity).unwrap_or_default();

        let mut room = cell.lock();
        if room.is_closed() || !room.remove(identity) {
            return;
        }
        room.broadcast(ChatRecord::now(identity.as_str(), LEFT_BODY, decoration));
        info!("{} has left the room {}", identity, code);

        if room.is_empty() {
            room.close();
            drop(room);
            self.registry.delete(code);
        }
    }

    /// Arm a one-shot reclaim timer for an emptied room
    ///
    /// The timer holds no lock while waiting. There is no cancellation on
    /// rejoin: correctness comes from the fresh re-check at fire time.
    fn schedule_reclaim(&self, code: RoomCode, room_id: Uuid) {
        debug!("Reclaim scheduled for room {}", code);
        let this = self.clone();
        tokio::spawn(async move {
            time::sleep(this.config.grace).await;
            this.reclaim(&code, room_id);
        });
    }

    /// Re-check an emptied room after the grace window
    ///
    /// Deletes the room only if the code still resolves to the same room
    /// generation and it is still empty. A room that filled up again, was
    /// already deleted, or was recreated under a recycled code is left
    /// alone.
    fn reclaim(&self, code: &RoomCode, room_id: Uuid) {
        let Some(cell) = self.registry.lookup(code) else {
            return;
        };
        let mut room = cell.lock();
        if room.id != room_id || room.is_closed() || !room.is_empty() {
            return;
        }
        room.close();
        drop(room);
        self.registry.delete(code);
        info!("Deleting empty room {} after delay", code);
    }

    /// Membership invariant probe, used by tests
    #[cfg(test)]
    fn is_consistent(&self, code: &RoomCode) -> bool {
        self.registry
            .lookup(code)
            .map(|cell| cell.lock().is_consistent())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn setup(grace: Duration) -> (Coordinator, Arc<Registry>, Arc<Directory>) {
        let registry = Arc::new(Registry::new());
        let directory = Arc::new(Directory::new());
        let coordinator = Coordinator::new(
            Arc::clone(&registry),
            Arc::clone(&directory),
            CoordinatorConfig {
                grace,
                ..Default::default()
            },
        );
        (coordinator, registry, directory)
    }

    fn peer() -> (Peer, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(64)
    }

    fn join(coordinator: &Coordinator, name: &str, code: &RoomCode) -> mpsc::Receiver<ServerMessage> {
        let identity = Identity::new(name);
        coordinator.directory().register(&identity);
        let (tx, rx) = peer();
        assert!(coordinator.on_connect(&identity, code, tx));
        rx
    }

    fn recv_record(rx: &mut mpsc::Receiver<ServerMessage>) -> ChatRecord {
        match rx.try_recv().unwrap() {
            ServerMessage::Message(record) => record,
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_room_and_exists() {
        let (coordinator, _registry, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();

        assert!(coordinator.room_exists(&code));
        assert!(!coordinator.room_exists(&RoomCode::from_string("NOPE")));
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let (coordinator, registry, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();
        let alice = Identity::new("alice");
        coordinator.directory().register(&alice);

        let (tx1, _rx1) = peer();
        assert!(coordinator.on_connect(&alice, &code, tx1));

        // Second connect for the same identity is rejected without
        // touching membership
        let (tx2, _rx2) = peer();
        assert!(!coordinator.on_connect(&alice, &code, tx2));

        let cell = registry.lookup(&code).unwrap();
        assert_eq!(cell.lock().members, 1);
        assert!(coordinator.is_consistent(&code));
    }

    #[tokio::test]
    async fn test_connect_to_missing_room_dropped() {
        let (coordinator, _, _) = setup(Duration::from_secs(5));
        let alice = Identity::new("alice");
        coordinator.directory().register(&alice);

        let (tx, _rx) = peer();
        assert!(!coordinator.on_connect(&alice, &RoomCode::from_string("GONE"), tx));
    }

    #[tokio::test]
    async fn test_unregistered_identity_cannot_connect() {
        let (coordinator, _, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();

        let (tx, _rx) = peer();
        assert!(!coordinator.on_connect(&Identity::new("ghost"), &code, tx));
    }

    #[tokio::test]
    async fn test_joiner_receives_backlog_then_notifications() {
        let (coordinator, _, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();

        let _alice_rx = join(&coordinator, "alice", &code);
        coordinator
            .on_message(&Identity::new("alice"), &code, "hello".to_string())
            .unwrap();

        let mut bob_rx = join(&coordinator, "bob", &code);

        // Backlog first: alice's join notification and her message
        match bob_rx.try_recv().unwrap() {
            ServerMessage::Joined { room_code, history } => {
                assert_eq!(room_code, code.to_string());
                assert_eq!(history.len(), 2);
                assert_eq!(history[0].body, JOINED_BODY);
                assert_eq!(history[1].body, "hello");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        // Then bob's own join notification
        let record = recv_record(&mut bob_rx);
        assert_eq!(record.sender, "bob");
        assert_eq!(record.body, JOINED_BODY);
    }

    #[tokio::test]
    async fn test_message_ordering() {
        let (coordinator, registry, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();
        let mut alice_rx = join(&coordinator, "alice", &code);
        let mut bob_rx = join(&coordinator, "bob", &code);

        for body in ["m1", "m2", "m3"] {
            coordinator
                .on_message(&Identity::new("alice"), &code, body.to_string())
                .unwrap();
        }

        let cell = registry.lookup(&code).unwrap();
        let history: Vec<String> = cell.lock().history.iter().map(|r| r.body.clone()).collect();
        assert_eq!(
            history,
            vec![JOINED_BODY, JOINED_BODY, "m1", "m2", "m3"]
        );

        // Every joined connection observes the chat messages in order
        // (skip the join notifications each receiver saw)
        for rx in [&mut alice_rx, &mut bob_rx] {
            let mut seen = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                if let ServerMessage::Message(record) = msg {
                    if record.body.starts_with('m') {
                        seen.push(record.body);
                    }
                }
            }
            assert_eq!(seen, vec!["m1", "m2", "m3"]);
        }
    }

    #[tokio::test]
    async fn test_unknown_sender_discarded() {
        let (coordinator, registry, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();
        let _rx = join(&coordinator, "alice", &code);

        let err = coordinator
            .on_message(&Identity::new("ghost"), &code, "boo".to_string())
            .unwrap_err();
        assert!(matches!(err, AppError::UnknownSender(_)));

        let cell = registry.lookup(&code).unwrap();
        assert_eq!(cell.lock().history.len(), 1); // just alice's join
    }

    #[tokio::test]
    async fn test_message_to_missing_room_absorbed() {
        let (coordinator, _, _) = setup(Duration::from_secs(5));
        let alice = Identity::new("alice");
        coordinator.directory().register(&alice);

        coordinator
            .on_message(&alice, &RoomCode::from_string("GONE"), "hi".to_string())
            .unwrap();
    }

    #[tokio::test]
    async fn test_leave_empties_room_deletes_immediately() {
        let (coordinator, _, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();
        let _rx = join(&coordinator, "alice", &code);

        coordinator.on_leave(&Identity::new("alice"), &code);
        assert!(!coordinator.room_exists(&code));
    }

    #[tokio::test]
    async fn test_leave_with_remaining_members_keeps_room() {
        let (coordinator, registry, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();
        let _alice_rx = join(&coordinator, "alice", &code);
        let mut bob_rx = join(&coordinator, "bob", &code);

        coordinator.on_leave(&Identity::new("alice"), &code);
        assert!(coordinator.room_exists(&code));

        let cell = registry.lookup(&code).unwrap();
        assert_eq!(cell.lock().members, 1);
        assert!(coordinator.is_consistent(&code));

        // Bob saw the left notification
        let mut last = None;
        while let Ok(msg) = bob_rx.try_recv() {
            if let ServerMessage::Message(record) = msg {
                last = Some(record);
            }
        }
        let last = last.unwrap();
        assert_eq!(last.sender, "alice");
        assert_eq!(last.body, LEFT_BODY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_deletes_only_after_grace() {
        let grace = Duration::from_secs(5);
        let (coordinator, _, _) = setup(grace);
        let code = coordinator.create_room().unwrap();
        let _rx = join(&coordinator, "alice", &code);

        coordinator.on_disconnect(&Identity::new("alice"), &code);

        // Still present right after the disconnect
        assert!(coordinator.room_exists(&code));

        // Not yet deleted just before the window closes
        time::sleep(grace - Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert!(coordinator.room_exists(&code));

        time::sleep(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert!(!coordinator.room_exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_within_grace_keeps_room_and_history() {
        let grace = Duration::from_secs(5);
        let (coordinator, registry, _) = setup(grace);
        let code = coordinator.create_room().unwrap();
        let alice = Identity::new("alice");

        let _rx = join(&coordinator, "alice", &code);
        coordinator
            .on_message(&alice, &code, "before the drop".to_string())
            .unwrap();
        coordinator.on_disconnect(&alice, &code);

        // Rejoin before the window closes
        time::sleep(Duration::from_secs(2)).await;
        let (tx, _rx2) = peer();
        assert!(coordinator.on_connect(&alice, &code, tx));

        // Let the stale reclaim fire; the re-check must see the rejoin
        time::sleep(grace).await;
        tokio::task::yield_now().await;

        assert!(coordinator.room_exists(&code));
        let cell = registry.lookup(&code).unwrap();
        let room = cell.lock();
        assert_eq!(room.members, 1);
        assert!(room.history.iter().any(|r| r.body == "before the drop"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reclaim_spares_recycled_code() {
        let grace = Duration::from_secs(5);
        let (coordinator, registry, _) = setup(grace);
        let code = coordinator.create_room().unwrap();

        // Empty the room via disconnect: reclaim armed for this generation
        let _rx = join(&coordinator, "alice", &code);
        coordinator.on_disconnect(&Identity::new("alice"), &code);

        // Bob passes through and deletes the room synchronously
        time::sleep(Duration::from_secs(1)).await;
        let _bob_rx = join(&coordinator, "bob", &code);
        coordinator.on_leave(&Identity::new("bob"), &code);
        assert!(!coordinator.room_exists(&code));

        // Recycle the code before the stale timer fires
        registry.create(code.clone()).unwrap();

        time::sleep(grace).await;
        tokio::task::yield_now().await;

        // The stale reclaim saw a different room generation and backed off
        assert!(coordinator.room_exists(&code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_after_room_gone_is_noop() {
        let grace = Duration::from_secs(5);
        let (coordinator, registry, _) = setup(grace);
        let code = coordinator.create_room().unwrap();
        let _rx = join(&coordinator, "alice", &code);

        coordinator.on_disconnect(&Identity::new("alice"), &code);
        registry.delete(&code);

        time::sleep(grace + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(!coordinator.room_exists(&code));
    }

    #[tokio::test]
    async fn test_double_disconnect_is_noop() {
        let (coordinator, registry, _) = setup(Duration::from_secs(5));
        let code = coordinator.create_room().unwrap();
        let _alice_rx = join(&coordinator, "alice", &code);
        let _bob_rx = join(&coordinator, "bob", &code);
        let alice = Identity::new("alice");

        coordinator.on_disconnect(&alice, &code);
        coordinator.on_disconnect(&alice, &code);

        let cell = registry.lookup(&code).unwrap();
        assert_eq!(cell.lock().members, 1);
        assert!(coordinator.is_consistent(&code));
    }

    #[tokio::test]
    async fn test_interleaved_events_keep_membership_consistent() {
        let (coordinator, _, _) = setup(Duration::from_secs(60));
        let code = coordinator.create_room().unwrap();

        let _a = join(&coordinator, "alice", &code);
        let _b = join(&coordinator, "bob", &code);
        let _c = join(&coordinator, "carol", &code);
        coordinator.on_disconnect(&Identity::new("bob"), &code);
        coordinator.on_leave(&Identity::new("carol"), &code);
        coordinator.on_disconnect(&Identity::new("carol"), &code); // stale
        let _b2 = join(&coordinator, "bob", &code);

        assert!(coordinator.is_consistent(&code));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_parallel_events_keep_membership_consistent() {
        let (coordinator, registry, _) = setup(Duration::from_secs(60));
        let code = coordinator.create_room().unwrap();

        // One member stays joined so the churn below never empties the room
        let _anchor_rx = join(&coordinator, "anchor", &code);

        let mut handles = Vec::new();
        for worker in 0..32 {
            let coordinator = coordinator.clone();
            let code = code.clone();
            handles.push(tokio::spawn(async move {
                let identity = Identity::new(format!("user-{}", worker));
                coordinator.directory().register(&identity);
                for round in 0..50 {
                    let (tx, _rx) = mpsc::channel(64);
                    if coordinator.on_connect(&identity, &code, tx) {
                        coordinator
                            .on_message(&identity, &code, format!("round {}", round))
                            .unwrap();
                        if round % 2 == 0 {
                            coordinator.on_disconnect(&identity, &code);
                        } else {
                            coordinator.on_leave(&identity, &code);
                        }
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Every worker left again; only the anchor remains, and the
        // count still matches the name and peer sets
        assert!(coordinator.is_consistent(&code));
        let cell = registry.lookup(&code).unwrap();
        assert_eq!(cell.lock().members, 1);
    }
}
