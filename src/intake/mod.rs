mod records;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/submit", post(records::submit))
        .route("/api/admin/users", get(records::list_users))
        .route("/api/admin/user/{id}", get(records::get_user))
        .route("/api/update-feedback", post(records::update_feedback))
        .route("/api/update-final-message", post(records::update_final_message))
}
