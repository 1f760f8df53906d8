mod error;
mod lifecycle;
mod msg;
mod registry;
mod relay;
mod room;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use error::RelayError;
pub use lifecycle::Lifecycle;
pub use msg::{ClientEvent, ServerEvent};
pub use registry::{ConnectionId, Outbox, RoomGuard, RoomRegistry, RoomState};
pub use relay::{Connection, Relay};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::relay_ws))
        .route("/api/messages/{user_id}", get(room::history))
}
