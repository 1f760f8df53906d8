use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use helpdesk_relay::{
    config::Config,
    db::{self, Role},
    rooms::{Connection, Lifecycle},
    router,
    store::ChatStore,
    AppState,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::unbounded_channel;
use tower::ServiceExt;

fn config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_owned(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        db_max_connections: 1,
        agent_email: "agent@example.com".to_owned(),
        agent_password: "hunter2".to_owned(),
        session_idle_minutes: 5,
        feedback_grace: Some(Duration::from_secs(60)),
        cors_allow_origins: vec!["http://localhost:3000".to_owned()],
    }
}

async fn app() -> (Router, AppState) {
    let state = AppState::new(db::connect_in_memory().await.unwrap(), config());
    (router(state.clone()), state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }
    request.body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn submit(app: &Router, name: &str, number: &str) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/submit",
            json!({
                "name": name,
                "number": number,
                "email": "alice@example.com",
                "organization": "Acme Labs",
                "service": "Water Testing",
                "subService": "Drinking Water"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    body["user_id"].as_str().unwrap().to_owned()
}

async fn login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "email": "agent@example.com", "password": "hunter2" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_owned()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _) = app().await;

    let response = app.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn submitted_visitor_starts_with_empty_history() {
    let (app, _) = app().await;
    let user_id = submit(&app, "Alice", "5550100100").await;

    let response = app
        .oneshot(get(&format!("/api/messages/{user_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "messages": [] }));
}

#[tokio::test]
async fn admin_routes_require_agent_login() {
    let (app, _) = app().await;

    let response = app.clone().oneshot(get("/api/admin/users", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(post_json(
            "/api/auth/login",
            json!({ "email": "agent@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logged_in_agent_lists_and_reads_records() {
    let (app, _) = app().await;
    let first = submit(&app, "Alice", "5550100100").await;
    let second = submit(&app, "Bob", "5550100200").await;
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(get("/api/admin/users", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let records = json_body(response).await;
    let ids: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, [second.as_str(), first.as_str()]);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/admin/user/{first}"), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = json_body(response).await;
    assert_eq!(record["name"], "Alice");
    assert_eq!(record["sub_service"], "Drinking Water");

    let response = app
        .oneshot(get("/api/admin/user/nobody", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn final_message_updates_by_number() {
    let (app, state) = app().await;
    let user_id = submit(&app, "Alice", "5550100100").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/update-final-message",
            json!({ "number": "5550100100", "final_message": "Quote sent" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = state.store.find_record(&user_id).await.unwrap().unwrap();
    assert_eq!(record.final_message.as_deref(), Some("Quote sent"));

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/update-final-message",
            json!({ "number": "5550100100", "finalMessage": "Revised quote" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let record = state.store.find_record(&user_id).await.unwrap().unwrap();
    assert_eq!(record.final_message.as_deref(), Some("Revised quote"));

    let response = app
        .oneshot(post_json(
            "/api/update-final-message",
            json!({ "number": "0000000000", "final_message": "Quote sent" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feedback_over_http_closes_an_ended_chat() {
    let (app, state) = app().await;
    let user_id = submit(&app, "Alice", "5550100100").await;

    let (visitor_tx, _visitor_rx) = unbounded_channel();
    let (agent_tx, _agent_rx) = unbounded_channel();
    let mut visitor = Connection::new(Role::Visitor, visitor_tx);
    let mut agent = Connection::new(Role::Agent, agent_tx);
    state.relay.join_room(&mut visitor, &user_id).await.unwrap();
    state.relay.join_room(&mut agent, &user_id).await.unwrap();

    let early = app
        .clone()
        .oneshot(post_json(
            "/api/update-feedback",
            json!({ "user_id": user_id, "feedback": "Good" }),
        ))
        .await
        .unwrap();
    assert_eq!(early.status(), StatusCode::CONFLICT);

    state.relay.end_chat(&agent, &user_id).await.unwrap();
    assert_eq!(state.relay.lifecycle(&user_id).await, Some(Lifecycle::FeedbackPending));

    let response = app
        .oneshot(post_json(
            "/api/update-feedback",
            json!({ "userId": user_id, "feedback": "Good" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = state.store.find_record(&user_id).await.unwrap().unwrap();
    assert_eq!(record.feedback.as_deref(), Some("Good"));
    assert_eq!(state.relay.lifecycle(&user_id).await, Some(Lifecycle::Closed));
}

#[tokio::test]
async fn logout_drops_agent_access() {
    let (app, _) = app().await;
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get("/api/admin/users", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
