use std::fmt;

use serde::Serialize;

use crate::db::Role;

use super::RelayError;

/// Server-owned phase of a chat session. Every connection in a room sees the
/// same value because it lives in the room's locked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    WaitingForAgent,
    Live,
    Ended,
    FeedbackPending,
    Closed,
}

impl Lifecycle {
    pub fn accepts_messages(self) -> bool {
        matches!(self, Lifecycle::WaitingForAgent | Lifecycle::Live)
    }

    /// Only a closed room may be evicted from the registry.
    pub fn is_closed(self) -> bool {
        self == Lifecycle::Closed
    }

    /// Returns `true` when this attach took the session live.
    /// A second agent joining a live room changes nothing.
    pub fn agent_attached(&mut self) -> bool {
        if *self == Lifecycle::WaitingForAgent {
            *self = Lifecycle::Live;
            true
        } else {
            false
        }
    }

    pub fn end_chat(&mut self, initiator: Role) -> Result<(), RelayError> {
        if initiator != Role::Agent {
            return Err(RelayError::Forbidden("only an agent can end a chat"));
        }
        self.expect(Lifecycle::Live, "end the chat")?;
        *self = Lifecycle::Ended;
        Ok(())
    }

    /// `Ended` is transient: it flips to `FeedbackPending` as soon as the
    /// end has been announced.
    pub fn request_feedback(&mut self) -> Result<(), RelayError> {
        self.expect(Lifecycle::Ended, "request feedback")?;
        *self = Lifecycle::FeedbackPending;
        Ok(())
    }

    pub fn ensure_feedback_pending(self) -> Result<(), RelayError> {
        self.expect(Lifecycle::FeedbackPending, "submit feedback")
    }

    pub fn feedback_recorded(&mut self) -> Result<(), RelayError> {
        self.ensure_feedback_pending()?;
        *self = Lifecycle::Closed;
        Ok(())
    }

    /// Visitor left without rating. Returns `true` if the session closed.
    pub fn abandon(&mut self) -> bool {
        if *self == Lifecycle::FeedbackPending {
            *self = Lifecycle::Closed;
            true
        } else {
            false
        }
    }

    fn expect(self, expected: Lifecycle, action: &'static str) -> Result<(), RelayError> {
        if self == expected {
            Ok(())
        } else {
            Err(RelayError::InvalidState { action, state: self })
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Lifecycle::WaitingForAgent => "waiting for an agent",
            Lifecycle::Live => "live",
            Lifecycle::Ended => "ended",
            Lifecycle::FeedbackPending => "awaiting feedback",
            Lifecycle::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_happy_path() {
        let mut state = Lifecycle::WaitingForAgent;
        assert!(state.accepts_messages());

        assert!(state.agent_attached());
        assert_eq!(state, Lifecycle::Live);
        assert!(state.accepts_messages());

        state.end_chat(Role::Agent).unwrap();
        assert_eq!(state, Lifecycle::Ended);
        assert!(!state.accepts_messages());

        state.request_feedback().unwrap();
        assert_eq!(state, Lifecycle::FeedbackPending);

        state.feedback_recorded().unwrap();
        assert_eq!(state, Lifecycle::Closed);
        assert!(state.is_closed());
    }

    #[test]
    fn second_agent_attach_is_a_no_op() {
        let mut state = Lifecycle::Live;
        assert!(!state.agent_attached());
        assert_eq!(state, Lifecycle::Live);

        let mut ended = Lifecycle::FeedbackPending;
        assert!(!ended.agent_attached());
        assert_eq!(ended, Lifecycle::FeedbackPending);
    }

    #[test]
    fn visitor_cannot_end_chat() {
        let mut state = Lifecycle::Live;
        let err = state.end_chat(Role::Visitor).unwrap_err();
        assert!(matches!(err, RelayError::Forbidden(_)));
        assert_eq!(state, Lifecycle::Live);
    }

    #[test]
    fn end_chat_requires_live_session() {
        let mut state = Lifecycle::WaitingForAgent;
        let err = state.end_chat(Role::Agent).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidState { state: Lifecycle::WaitingForAgent, .. }
        ));
    }

    #[test]
    fn feedback_only_once_and_only_after_end() {
        let mut live = Lifecycle::Live;
        assert!(matches!(
            live.feedback_recorded(),
            Err(RelayError::InvalidState { state: Lifecycle::Live, .. })
        ));

        let mut state = Lifecycle::FeedbackPending;
        state.feedback_recorded().unwrap();
        assert!(matches!(
            state.feedback_recorded(),
            Err(RelayError::InvalidState { state: Lifecycle::Closed, .. })
        ));
    }

    #[test]
    fn abandon_only_closes_pending_feedback() {
        let mut live = Lifecycle::Live;
        assert!(!live.abandon());
        assert_eq!(live, Lifecycle::Live);

        let mut pending = Lifecycle::FeedbackPending;
        assert!(pending.abandon());
        assert_eq!(pending, Lifecycle::Closed);
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Lifecycle::WaitingForAgent).unwrap(),
            "\"waiting_for_agent\""
        );
    }
}
