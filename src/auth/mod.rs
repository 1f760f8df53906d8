use axum::{routing::post, Router};
use thiserror::Error;
use tower_sessions::Session;

use crate::{session::AGENT_EMAIL, AppResult, AppState};

mod login;
mod logout;

pub use login::login;
pub use logout::logout;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("agent login required")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
}

/// Email of the logged-in agent, or [`AuthError::Unauthorized`].
pub async fn require_agent(session: &Session) -> AppResult<String> {
    match session.get::<String>(AGENT_EMAIL).await? {
        Some(email) => Ok(email),
        None => Err(AuthError::Unauthorized.into()),
    }
}
