use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_sessions::Session;
use tracing::info;

use crate::{
    auth::require_agent,
    db::{Intake, RecordUpdate, SessionRecord},
    store::{ChatStore, SqliteStore, StoreError},
    AppRelay, AppResult,
};

#[derive(Serialize)]
pub(crate) struct SubmitResponse {
    message: &'static str,
    user_id: String,
}

/// Stores a visitor's intake form. The returned `user_id` doubles as the
/// visitor's room id.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn submit(
    State(store): State<SqliteStore>,
    Json(intake): Json<Intake>,
) -> AppResult<(StatusCode, Json<SubmitResponse>)> {
    let record = store.insert_intake(&intake).await?;
    info!(user_id = %record.id, "intake submitted");

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            message: "submitted",
            user_id: record.id,
        }),
    ))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn list_users(
    State(store): State<SqliteStore>,
    session: Session,
) -> AppResult<Json<Vec<SessionRecord>>> {
    require_agent(&session).await?;
    Ok(Json(store.list_records().await?))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn get_user(
    Path(id): Path<String>,
    State(store): State<SqliteStore>,
    session: Session,
) -> AppResult<Json<SessionRecord>> {
    require_agent(&session).await?;
    let record = store.find_record(&id).await?.ok_or(StoreError::NotFound(id))?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub(crate) struct FeedbackRequest {
    #[serde(alias = "userId")]
    user_id: String,
    feedback: String,
}

/// HTTP twin of the socket `submit_feedback` event; closes the session.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_feedback(
    State(relay): State<Arc<AppRelay>>,
    Json(FeedbackRequest { user_id, feedback }): Json<FeedbackRequest>,
) -> AppResult<Json<Value>> {
    relay.submit_feedback(&user_id, &feedback).await?;
    Ok(Json(json!({ "message": "feedback recorded" })))
}

#[derive(Deserialize)]
pub(crate) struct FinalMessageRequest {
    number: String,
    #[serde(alias = "finalMessage")]
    final_message: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_final_message(
    State(store): State<SqliteStore>,
    Json(FinalMessageRequest { number, final_message }): Json<FinalMessageRequest>,
) -> AppResult<Json<Value>> {
    store
        .update_by_number(&number, &RecordUpdate::final_message(final_message))
        .await?;
    Ok(Json(json!({ "message": "final message recorded" })))
}
