use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{db::ChatMessage, AppRelay, AppResult};

#[derive(Serialize)]
pub(crate) struct HistoryResponse {
    messages: Vec<ChatMessage>,
}

/// Full transcript of one room, oldest first.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn history(
    Path(user_id): Path<String>,
    State(relay): State<Arc<AppRelay>>,
) -> AppResult<Json<HistoryResponse>> {
    let messages = relay.history(&user_id).await?;
    Ok(Json(HistoryResponse { messages }))
}
