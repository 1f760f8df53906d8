use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::info;

use crate::{config::Config, session::AGENT_EMAIL, AppResult};

use super::AuthError;

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    pub(crate) email: String,
    pub(crate) password: String,
}

#[derive(Serialize)]
pub(crate) struct LoginResponse {
    email: String,
}

#[debug_handler(state = crate::AppState)]
pub async fn login(
    State(config): State<Arc<Config>>,
    session: Session,
    Json(LoginRequest { email, password }): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    if !email.trim().eq_ignore_ascii_case(&config.agent_email) || password != config.agent_password {
        return Err(AuthError::InvalidCredentials.into());
    }

    session.cycle_id().await?;
    session.insert(AGENT_EMAIL, &config.agent_email).await?;
    info!(email = %config.agent_email, "agent logged in");

    Ok(Json(LoginResponse { email: config.agent_email.clone() }))
}
