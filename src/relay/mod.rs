//! Per-project rooms that cache a project snapshot and fan events out to
//! every other connection in the room.
//!
//! Each room owns one broadcast channel. Frames are encoded once and tagged
//! with the connection that caused them, so a member never receives its own
//! event back. Server-originated events carry no origin and reach everyone.
//!
//! Events are applied to the cache under one mutex in arrival order. Two
//! `code-change` events for the same file leave whichever was applied last.

mod protocol;
mod socket;

pub use protocol::{CodeChange, RelayEvent};
pub use socket::relay_socket;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::RelayConfig;
use crate::types::ProjectSnapshot;

/// Identifies one connection within the relay.
pub type ConnectionId = u64;

#[derive(Debug, Clone)]
struct Envelope {
    origin: Option<ConnectionId>,
    frame: Arc<str>,
}

struct Room {
    cache: Option<ProjectSnapshot>,
    sender: broadcast::Sender<Envelope>,
    members: HashMap<ConnectionId, String>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            cache: None,
            sender,
            members: HashMap::new(),
        }
    }

    fn send(&self, origin: Option<ConnectionId>, event: &RelayEvent) {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode {} event: {e}", event.name());
                return;
            }
        };
        // No receivers is fine: the room may be empty for server events.
        let _ = self.sender.send(Envelope {
            origin,
            frame: frame.into(),
        });
    }
}

/// What a member receives from its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Frame(Arc<str>),
    /// The receiver fell behind and this many frames were dropped. The
    /// connection should be resynced with [`Relay::resync`].
    Lagged(u64),
}

/// A connection's place in a room. Hand it back to [`Relay::leave`].
pub struct Membership {
    pub room_id: String,
    pub user_id: String,
    id: ConnectionId,
    receiver: broadcast::Receiver<Envelope>,
}

impl Membership {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next frame sent by someone else, or `None` once the room is gone.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == Some(self.id) => continue,
                Ok(envelope) => return Some(Delivery::Frame(envelope.frame)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        "Connection {} in room {} lagged, skipped {skipped} frame(s)",
                        self.id,
                        self.room_id
                    );
                    return Some(Delivery::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub rooms: usize,
    pub connections: usize,
}

pub struct Relay {
    config: RelayConfig,
    rooms: Mutex<HashMap<String, Room>>,
    next_id: AtomicU64,
}

impl Relay {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            rooms: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection, creating the room on first join.
    pub fn join(&self, room_id: &str, user_id: &str) -> Membership {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let room = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(self.config.broadcast_capacity));
        room.members.insert(id, user_id.to_string());

        tracing::info!(
            "User {} joined room {} ({} connection(s))",
            user_id,
            room_id,
            room.members.len()
        );

        Membership {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            id,
            receiver: room.sender.subscribe(),
        }
    }

    pub fn leave(&self, membership: Membership) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let Some(room) = rooms.get_mut(&membership.room_id) else {
            return;
        };
        room.members.remove(&membership.id);

        tracing::info!("User {} left room {}", membership.user_id, membership.room_id);

        if room.members.is_empty() && self.config.evict_idle_rooms {
            rooms.remove(&membership.room_id);
            tracing::debug!("Evicted idle room {}", membership.room_id);
        }
    }

    /// Seeds the cache of a room that has none yet. Returns false if the
    /// room is unknown or already cached.
    pub fn seed(&self, room_id: &str, snapshot: ProjectSnapshot) -> bool {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        match rooms.get_mut(room_id) {
            Some(room) if room.cache.is_none() => {
                room.cache = Some(snapshot);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn cached(&self, room_id: &str) -> Option<ProjectSnapshot> {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.get(room_id).and_then(|room| room.cache.clone())
    }

    /// The full room state, for a connection that missed frames.
    #[must_use]
    pub fn resync(&self, room_id: &str) -> RelayEvent {
        RelayEvent::ProjectData(self.cached(room_id))
    }

    /// Applies an event from a member and forwards it to the others.
    ///
    /// Returns the reply owed to the sender alone, if any.
    pub fn apply(
        &self,
        room_id: &str,
        origin: ConnectionId,
        event: RelayEvent,
    ) -> Option<RelayEvent> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let room = rooms.get_mut(room_id)?;

        tracing::debug!("Room {} event {} from connection {}", room_id, event.name(), origin);

        match event {
            RelayEvent::RequestProjectData => Some(RelayEvent::ProjectData(room.cache.clone())),
            RelayEvent::ShareProjectData(snapshot) => {
                room.cache = Some(snapshot.clone());
                room.send(Some(origin), &RelayEvent::ProjectData(Some(snapshot)));
                None
            }
            RelayEvent::ProjectData(_) | RelayEvent::Error(_) => {
                tracing::debug!("Ignoring server-only event from connection {origin}");
                None
            }
            event => {
                update_cache(&mut room.cache, &event);
                room.send(Some(origin), &event);
                None
            }
        }
    }

    /// Applies a server-side mutation to the room cache and sends it to
    /// every member. A room with no members is left alone.
    pub fn publish(&self, room_id: &str, event: RelayEvent) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let Some(room) = rooms.get_mut(room_id) else {
            return;
        };
        update_cache(&mut room.cache, &event);
        room.send(None, &event);
    }

    #[must_use]
    pub fn stats(&self) -> RelayStats {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        RelayStats {
            rooms: rooms.len(),
            connections: rooms.values().map(|r| r.members.len()).sum(),
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

fn update_cache(cache: &mut Option<ProjectSnapshot>, event: &RelayEvent) {
    match event {
        RelayEvent::ProjectData(Some(snapshot)) | RelayEvent::ShareProjectData(snapshot) => {
            *cache = Some(snapshot.clone());
        }
        _ => {}
    }

    let Some(snapshot) = cache.as_mut() else {
        return;
    };
    match event {
        RelayEvent::CodeChange(change) => {
            if let Some(file) = snapshot.files.iter_mut().find(|f| f.id == change.file_id) {
                file.content.clone_from(&change.content);
                file.updated_at = Utc::now();
            }
        }
        RelayEvent::FileCreated(file) => {
            if let Some(existing) = snapshot.files.iter_mut().find(|f| f.id == file.id) {
                *existing = file.clone();
            } else {
                snapshot.files.push(file.clone());
            }
        }
        RelayEvent::FileDeleted(file_id) => snapshot.files.retain(|f| &f.id != file_id),
        RelayEvent::NewMessage(message) => {
            if !snapshot.messages.iter().any(|m| m.id == message.id) {
                snapshot.messages.push(message.clone());
            }
        }
        _ => {}
    }
}
