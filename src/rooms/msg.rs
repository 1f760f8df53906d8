use serde::{Deserialize, Serialize};

use crate::db::{ChatMessage, Role};

use super::{Lifecycle, RelayError};

/// Frames a client may send over its socket.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinRoom {
        #[serde(alias = "roomId")]
        room_id: String,
    },
    SendMessage {
        #[serde(alias = "roomId")]
        room_id: String,
        /// Optional claim; must match the connection's role when present.
        #[serde(default)]
        sender: Option<Role>,
        text: String,
    },
    EndChat {
        #[serde(alias = "roomId")]
        room_id: String,
    },
    SubmitFeedback {
        #[serde(alias = "roomId")]
        room_id: String,
        feedback: String,
    },
    Ping,
}

/// Frames pushed to clients, either to the whole room or to one connection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Joined { room_id: String, state: Lifecycle },
    AgentConnected,
    ReceiveMessage(ChatMessage),
    ChatEnded,
    ChatClosed,
    Error { code: &'static str, message: String },
    Pong,
}

impl ServerEvent {
    pub fn bad_event(err: &serde_json::Error) -> Self {
        ServerEvent::Error {
            code: "bad_event",
            message: err.to_string(),
        }
    }
}

impl From<&RelayError> for ServerEvent {
    fn from(err: &RelayError) -> Self {
        ServerEvent::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
