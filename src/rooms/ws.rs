use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;
use tracing::{debug, info, warn};

use crate::{db::Role, session::AGENT_EMAIL, AppRelay, AppResult};

use super::{ClientEvent, Connection, RelayError, ServerEvent};

/// Upgrades to a relay socket. The role comes from the login session at
/// accept time: a session carrying an agent login is an agent, anything else
/// is a visitor.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn relay_ws(
    State(relay): State<Arc<AppRelay>>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let role = session_role(&session).await?;
    Ok(ws.on_upgrade(move |stream| serve(stream, relay, role)).into_response())
}

async fn session_role(session: &Session) -> Result<Role, tower_sessions::session::Error> {
    Ok(match session.get::<String>(AGENT_EMAIL).await? {
        Some(_) => Role::Agent,
        None => Role::Visitor,
    })
}

async fn serve(stream: WebSocket, relay: Arc<AppRelay>, role: Role) {
    let (mut sender, mut receiver) = stream.split();
    let (outbox, mut inbox) = mpsc::unbounded_channel::<ServerEvent>();
    let mut conn = Connection::new(role, outbox);
    info!(connection = %conn.id(), %role, "connection accepted");

    let mut writer = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "unserializable event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // A frame already being handled runs to completion even if the peer is
    // gone; only the next read notices the disconnect.
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_frame(&relay, &mut conn, text.as_str()).await,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = &mut writer => break,
        }
    }

    relay.on_disconnect(&mut conn).await;
    writer.abort();
    info!(connection = %conn.id(), %role, "connection closed");
}

async fn handle_frame(relay: &AppRelay, conn: &mut Connection, frame: &str) {
    let event = match serde_json::from_str::<ClientEvent>(frame) {
        Ok(event) => event,
        Err(err) => {
            debug!(connection = %conn.id(), error = %err, "malformed frame");
            conn.notify(ServerEvent::bad_event(&err));
            return;
        }
    };

    let result = match event {
        ClientEvent::JoinRoom { room_id } => relay.join_room(conn, &room_id).await.map(drop),
        ClientEvent::SendMessage { room_id, sender, text } => {
            relay.send_message(conn, &room_id, sender, &text).await.map(drop)
        }
        ClientEvent::EndChat { room_id } => relay.end_chat(conn, &room_id).await,
        ClientEvent::SubmitFeedback { room_id, feedback } => {
            relay.submit_feedback_from(conn, &room_id, &feedback).await
        }
        ClientEvent::Ping => {
            conn.notify(ServerEvent::Pong);
            Ok(())
        }
    };

    if let Err(err) = result {
        match &err {
            RelayError::StoreUnavailable(_) => warn!(connection = %conn.id(), error = %err, "event failed"),
            _ => debug!(connection = %conn.id(), error = %err, "event rejected"),
        }
        conn.notify(ServerEvent::from(&err));
    }
}
