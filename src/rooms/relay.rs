use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::{ChatMessage, RecordUpdate, Role},
    store::{ChatStore, StoreError},
};

use super::{ConnectionId, Lifecycle, Outbox, RelayError, RoomGuard, RoomRegistry, ServerEvent};

/// One accepted socket. The role is fixed when the transport accepts the
/// connection and never changes afterwards.
pub struct Connection {
    id: ConnectionId,
    role: Role,
    outbox: Outbox,
    room: Option<String>,
}

impl Connection {
    pub fn new(role: Role, outbox: Outbox) -> Self {
        Self {
            id: Uuid::now_v7(),
            role,
            outbox,
            room: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn room(&self) -> Option<&str> {
        self.room.as_deref()
    }

    /// Direct reply to this connection only, e.g. an error for the event it sent.
    pub fn notify(&self, event: ServerEvent) -> bool {
        self.outbox.send(event).is_ok()
    }

    fn ensure_joined(&self, room_id: &str) -> Result<(), RelayError> {
        if self.room() == Some(room_id) {
            Ok(())
        } else {
            Err(RelayError::Forbidden("connection has not joined this room"))
        }
    }
}

/// Validates inbound events against the room lifecycle, persists messages and
/// fans them out to the room.
pub struct Relay<S> {
    store: S,
    registry: Arc<RoomRegistry>,
    feedback_grace: Option<Duration>,
}

impl<S: ChatStore> Relay<S> {
    /// `feedback_grace` is how long an empty room may wait for feedback before
    /// it is closed as abandoned; `None` waits forever.
    pub fn new(store: S, registry: Arc<RoomRegistry>, feedback_grace: Option<Duration>) -> Self {
        Self {
            store,
            registry,
            feedback_grace,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub async fn lifecycle(&self, room_id: &str) -> Option<Lifecycle> {
        self.registry.lock(room_id).await.map(|room| room.lifecycle())
    }

    pub async fn join_room(&self, conn: &mut Connection, room_id: &str) -> Result<Lifecycle, RelayError> {
        let mut room = self
            .registry
            .attach(room_id, conn.id, conn.role, conn.outbox.clone())
            .await?;

        let went_live = conn.role == Role::Agent && room.lifecycle_mut().agent_attached();
        let state = room.lifecycle();
        room.send_to(
            conn.id,
            ServerEvent::Joined {
                room_id: room_id.to_owned(),
                state,
            },
        );
        if went_live {
            let delivered = room.broadcast(&ServerEvent::AgentConnected);
            info!(room_id, delivered, "agent connected, session live");
        }
        drop(room);

        // One room per connection: leave the previous one only after the new
        // attach succeeded, and never while holding two room locks.
        if let Some(previous) = conn.room.replace(room_id.to_owned()) {
            if previous != room_id {
                self.leave(conn.id, &previous).await;
            }
        }

        Ok(state)
    }

    /// Persists then broadcasts. Both happen inside the room's critical
    /// section so the stored order is the order every member observes.
    pub async fn send_message(
        &self,
        conn: &Connection,
        room_id: &str,
        claimed_sender: Option<Role>,
        text: &str,
    ) -> Result<ChatMessage, RelayError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RelayError::InvalidMessage);
        }
        if claimed_sender.is_some_and(|sender| sender != conn.role) {
            return Err(RelayError::Forbidden("sender does not match connection role"));
        }
        conn.ensure_joined(room_id)?;

        let mut room = self
            .registry
            .lock(room_id)
            .await
            .ok_or_else(|| RelayError::RoomNotFound(room_id.to_owned()))?;

        let state = room.lifecycle();
        if !state.accepts_messages() {
            return Err(RelayError::SessionClosed(state));
        }

        let message = ChatMessage {
            id: Uuid::now_v7(),
            user_id: room_id.to_owned(),
            sender: conn.role,
            text: text.to_owned(),
            timestamp: room.next_timestamp(),
        };

        if let Err(err) = self.store.append_message(&message).await {
            warn!(room_id, error = %err, "message not persisted, dropping");
            return Err(RelayError::StoreUnavailable(err));
        }

        let delivered = room.broadcast(&ServerEvent::ReceiveMessage(message.clone()));
        debug!(room_id, sender = %message.sender, delivered, "message relayed");
        Ok(message)
    }

    pub async fn end_chat(&self, conn: &Connection, room_id: &str) -> Result<(), RelayError> {
        if conn.role != Role::Agent {
            return Err(RelayError::Forbidden("only an agent can end a chat"));
        }
        conn.ensure_joined(room_id)?;

        let mut room = self
            .registry
            .lock(room_id)
            .await
            .ok_or_else(|| RelayError::RoomNotFound(room_id.to_owned()))?;

        room.lifecycle_mut().end_chat(conn.role)?;
        let delivered = room.broadcast(&ServerEvent::ChatEnded);
        room.lifecycle_mut().request_feedback()?;
        info!(room_id, delivered, "chat ended by agent, awaiting feedback");
        Ok(())
    }

    /// Records the visitor's rating on their session record and closes the
    /// room. Works without a live socket, e.g. from the HTTP surface.
    pub async fn submit_feedback(&self, visitor_id: &str, label: &str) -> Result<(), RelayError> {
        let label = label.trim();
        if label.is_empty() {
            return Err(RelayError::InvalidMessage);
        }

        let mut room = self
            .registry
            .lock(visitor_id)
            .await
            .ok_or_else(|| RelayError::RoomNotFound(visitor_id.to_owned()))?;
        room.lifecycle().ensure_feedback_pending()?;

        // Scoped to this visitor's record: one phone number may own several.
        match self.store.update_record(visitor_id, &RecordUpdate::feedback(label)).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(RelayError::RecordNotFound(visitor_id.to_owned())),
            Err(err) => return Err(RelayError::StoreUnavailable(err)),
        }

        room.lifecycle_mut().feedback_recorded()?;
        room.broadcast(&ServerEvent::ChatClosed);
        info!(room_id = visitor_id, feedback = label, "feedback recorded, session closed");
        self.registry.evict_if_idle(&mut room);
        Ok(())
    }

    /// Socket variant of [`Relay::submit_feedback`]: only the visitor side of
    /// the room may rate it.
    pub async fn submit_feedback_from(&self, conn: &Connection, room_id: &str, label: &str) -> Result<(), RelayError> {
        if conn.role != Role::Visitor {
            return Err(RelayError::Forbidden("only the visitor can submit feedback"));
        }
        conn.ensure_joined(room_id)?;
        self.submit_feedback(room_id, label).await
    }

    /// Unconditional detach. Does not end the chat, even for an agent.
    pub async fn on_disconnect(&self, conn: &mut Connection) {
        if let Some(room_id) = conn.room.take() {
            self.leave(conn.id, &room_id).await;
        }
    }

    pub async fn history(&self, room_id: &str) -> Result<Vec<ChatMessage>, RelayError> {
        self.store
            .list_messages(room_id)
            .await
            .map_err(RelayError::StoreUnavailable)
    }

    async fn leave(&self, conn: ConnectionId, room_id: &str) {
        let Some(room) = self.registry.detach(room_id, conn).await else {
            return;
        };

        if room.is_empty() && room.lifecycle() == Lifecycle::FeedbackPending {
            self.schedule_abandon(&room);
        }
    }

    fn schedule_abandon(&self, room: &RoomGuard) {
        let Some(grace) = self.feedback_grace else {
            return;
        };

        let registry = Arc::clone(&self.registry);
        let room_id = room.room_id().to_owned();
        debug!(room_id, ?grace, "room empty while awaiting feedback");

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            let Some(mut room) = registry.lock(&room_id).await else {
                return;
            };
            // A rejoin in the meantime restarts the clock; the leave that
            // followed it scheduled its own check.
            let idle_long_enough = room.empty_for().is_some_and(|idle| idle >= grace);
            if idle_long_enough && room.lifecycle_mut().abandon() {
                info!(room_id, "feedback abandoned, session closed");
                registry.evict_if_idle(&mut room);
            }
        });
    }
}
