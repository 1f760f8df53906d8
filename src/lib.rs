pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod intake;
pub mod rooms;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};
use tracing::warn;

pub use appresult::{AppError, AppResult};
use config::Config;
use rooms::{Relay, RoomRegistry};
use store::SqliteStore;

pub type AppRelay = Relay<SqliteStore>;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: SqliteStore,
    pub relay: Arc<AppRelay>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, config: Config) -> Self {
        let store = SqliteStore::new(db_pool);
        let relay = Relay::new(store.clone(), Arc::new(RoomRegistry::default()), config.feedback_grace);
        AppState {
            store,
            relay: Arc::new(relay),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.config.session_idle_minutes,
        )));
    let cors = cors_layer(&state.config.cors_allow_origins);

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(intake::router())
        .merge(rooms::router())
        .with_state(state)
        .layer(session_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}
