//! In-memory bookkeeping of which connections sit in which room.
//!
//! Each room owns one async mutex. Holding a [`RoomGuard`] is the room-scoped
//! critical section: membership, lifecycle and the persist-then-broadcast step
//! of the relay all happen under it, so broadcasts into one room never
//! interleave while other rooms proceed untouched.

use std::{
    collections::HashMap,
    ops::{Deref, DerefMut},
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::{mapref::entry::Entry, DashMap};
use time::OffsetDateTime;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::db::Role;

use super::{Lifecycle, RelayError, ServerEvent};

pub type ConnectionId = Uuid;

/// Write half of a connection as seen by the room: an unbounded queue drained
/// by the connection's socket writer.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

struct Member {
    role: Role,
    outbox: Outbox,
}

pub struct RoomState {
    lifecycle: Lifecycle,
    members: HashMap<ConnectionId, Member>,
    // when the last member left; cleared on attach
    empty_since: Option<Instant>,
    last_timestamp: Option<OffsetDateTime>,
    // set under the lock right before the entry leaves the map
    evicted: bool,
}

impl RoomState {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::WaitingForAgent,
            members: HashMap::new(),
            empty_since: None,
            last_timestamp: None,
            evicted: false,
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    /// How long the room has been without members, if it is empty now.
    pub fn empty_for(&self) -> Option<Duration> {
        self.empty_since.map(|since| since.elapsed())
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn has_member(&self, conn: ConnectionId) -> bool {
        self.members.contains_key(&conn)
    }

    #[cfg(test)]
    fn count_role(&self, role: Role) -> usize {
        self.members.values().filter(|member| member.role == role).count()
    }

    /// Queues `event` for every member; returns how many queues accepted it.
    /// Members whose socket already went away are skipped, not removed.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.members
            .values()
            .filter(|member| member.outbox.send(event.clone()).is_ok())
            .count()
    }

    pub fn send_to(&self, conn: ConnectionId, event: ServerEvent) -> bool {
        self.members
            .get(&conn)
            .is_some_and(|member| member.outbox.send(event).is_ok())
    }

    /// Wall-clock time, clamped so timestamps never go backwards in this room.
    pub fn next_timestamp(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let stamp = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }
}

/// Exclusive access to one room. Dropping it ends the critical section.
pub struct RoomGuard {
    room_id: String,
    handle: Arc<Mutex<RoomState>>,
    state: OwnedMutexGuard<RoomState>,
}

impl RoomGuard {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }
}

impl Deref for RoomGuard {
    type Target = RoomState;

    fn deref(&self) -> &RoomState {
        &self.state
    }
}

impl DerefMut for RoomGuard {
    fn deref_mut(&mut self) -> &mut RoomState {
        &mut self.state
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Mutex<RoomState>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent join. Visitors create the room on first join; agents may
    /// only enter a room a visitor already opened.
    pub async fn attach(
        &self,
        room_id: &str,
        conn: ConnectionId,
        role: Role,
        outbox: Outbox,
    ) -> Result<RoomGuard, RelayError> {
        let mut room = self.open(room_id, role).await?;
        room.members.insert(conn, Member { role, outbox });
        room.empty_since = None;
        debug!(room_id, %conn, %role, members = room.members.len(), "connection attached");
        Ok(room)
    }

    /// Removes `conn` from the room. Absent rooms and absent connections are
    /// not an error. Returns the still-locked room so the caller can react to
    /// what is left.
    pub async fn detach(&self, room_id: &str, conn: ConnectionId) -> Option<RoomGuard> {
        let mut room = self.lock(room_id).await?;
        if room.members.remove(&conn).is_some() {
            debug!(room_id, %conn, members = room.members.len(), "connection detached");
            if room.members.is_empty() {
                room.empty_since = Some(Instant::now());
            }
        }
        self.evict_if_idle(&mut room);
        Some(room)
    }

    pub async fn broadcast(&self, room_id: &str, event: &ServerEvent) -> usize {
        match self.lock(room_id).await {
            Some(room) => room.broadcast(event),
            None => 0,
        }
    }

    pub async fn lock(&self, room_id: &str) -> Option<RoomGuard> {
        loop {
            let handle = self.rooms.get(room_id)?.value().clone();
            let state = handle.clone().lock_owned().await;
            if state.evicted {
                continue;
            }

            return Some(RoomGuard {
                room_id: room_id.to_owned(),
                handle,
                state,
            });
        }
    }

    /// Drops the room from the map once it is closed and nobody is left.
    pub fn evict_if_idle(&self, room: &mut RoomGuard) -> bool {
        if room.evicted || !room.members.is_empty() || !room.lifecycle.is_closed() {
            return false;
        }

        room.evicted = true;
        self.rooms
            .remove_if(&room.room_id, |_, current| Arc::ptr_eq(current, &room.handle));
        debug!(room_id = %room.room_id, "room evicted");
        true
    }

    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    async fn open(&self, room_id: &str, role: Role) -> Result<RoomGuard, RelayError> {
        loop {
            // The map shard lock must be released before awaiting the room lock.
            let handle = match role {
                Role::Visitor => match self.rooms.entry(room_id.to_owned()) {
                    Entry::Occupied(entry) => entry.get().clone(),
                    Entry::Vacant(entry) => {
                        debug!(room_id, "room created");
                        entry.insert(Arc::new(Mutex::new(RoomState::new()))).clone()
                    }
                },
                Role::Agent => match self.rooms.get(room_id) {
                    Some(entry) => entry.value().clone(),
                    None => return Err(RelayError::RoomNotFound(room_id.to_owned())),
                },
            };

            let state = handle.clone().lock_owned().await;
            if state.evicted {
                continue;
            }

            return Ok(RoomGuard {
                room_id: room_id.to_owned(),
                handle,
                state,
            });
        }
    }
}
