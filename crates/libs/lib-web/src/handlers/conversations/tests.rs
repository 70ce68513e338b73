use crate::chat::{ServerEvent, SessionHandle};
use crate::server::create_router;
use crate::test_support::{seeded_db, test_state, token_for, AGENT, LISTING_ID, OUTSIDER, TENANT};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn hello_request() -> Value {
    json!({
        "receiver_id": AGENT.id(),
        "receiver_kind": "agent",
        "listing_id": LISTING_ID,
        "content": "Hello"
    })
}

/// App with one conversation the tenant opened with "Hello".
async fn app_with_conversation() -> (Router, crate::server::AppState, i64) {
    let state = test_state(seeded_db().await);
    let app = create_router(state.clone(), vec![]);
    let tenant = token_for(TENANT, "Tomás Tenant");

    let (status, body) = call(&app, "POST", "/api/conversations", Some(&tenant), Some(hello_request())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();
    (app, state, id)
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = create_router(test_state(seeded_db().await), vec![]);

    let (status, body) = call(&app, "GET", "/api/conversations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "Authentication");

    let (status, _) = call(&app, "GET", "/api/conversations", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_conversation_and_reuse() {
    let (app, _state, id) = app_with_conversation().await;
    let tenant = token_for(TENANT, "Tomás Tenant");
    let agent = token_for(AGENT, "Dana Realty");

    let (status, body) = call(&app, "GET", "/api/conversations", Some(&tenant), None).await;
    assert_eq!(status, StatusCode::OK);
    let view = &body[0];
    assert_eq!(view["id"], id);
    assert_eq!(view["unread_count"], 0);
    assert_eq!(view["last_message"]["content"], "Hello");
    assert_eq!(view["listing"]["title"], "Two-bedroom flat in Alfama");
    let names: Vec<&str> = view["participants"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["display_name"].as_str())
        .collect();
    assert!(names.contains(&"Dana Realty"));
    assert!(names.contains(&"Tomás Tenant"));

    let reply = json!({
        "receiver_id": TENANT.id(),
        "receiver_kind": "user",
        "listing_id": LISTING_ID,
        "content": "Yes, still available"
    });
    let (status, body) = call(&app, "POST", "/api/conversations", Some(&agent), Some(reply)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["unread_count"], 1);
}

#[tokio::test]
async fn test_create_conversation_rejections() {
    let app = create_router(test_state(seeded_db().await), vec![]);
    let tenant = token_for(TENANT, "Tomás Tenant");

    let mut unknown_listing = hello_request();
    unknown_listing["listing_id"] = json!(999);
    let (status, _) = call(&app, "POST", "/api/conversations", Some(&tenant), Some(unknown_listing)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut unknown_receiver = hello_request();
    unknown_receiver["receiver_id"] = json!(4242);
    let (status, _) = call(&app, "POST", "/api/conversations", Some(&tenant), Some(unknown_receiver)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let to_self = json!({"receiver_id": TENANT.id(), "receiver_kind": "user", "listing_id": LISTING_ID, "content": "me"});
    let (status, body) = call(&app, "POST", "/api/conversations", Some(&tenant), Some(to_self)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "Validation");

    let mut empty = hello_request();
    empty["content"] = json!("   ");
    let (status, _) = call(&app, "POST", "/api/conversations", Some(&tenant), Some(empty)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = call(&app, "GET", "/api/conversations", Some(&tenant), None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_pull_history_clears_unread() {
    let (app, _state, id) = app_with_conversation().await;
    let agent = token_for(AGENT, "Dana Realty");

    let (_, body) = call(&app, "GET", "/api/conversations/unread-count", Some(&agent), None).await;
    assert_eq!(body["unread_count"], 1);

    let uri = format!("/api/conversations/{}/messages", id);
    let (status, body) = call(&app, "GET", &uri, Some(&agent), None).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body.as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["content"], "Hello");
    assert_eq!(messages[0]["read"], true);
    assert_eq!(messages[0]["sender"]["participant"], json!({"kind": "user", "id": 1}));

    let (_, body) = call(&app, "GET", "/api/conversations/unread-count", Some(&agent), None).await;
    assert_eq!(body["unread_count"], 0);
}

#[tokio::test]
async fn test_post_message_and_mark_read() {
    let (app, _state, id) = app_with_conversation().await;
    let tenant = token_for(TENANT, "Tomás Tenant");
    let agent = token_for(AGENT, "Dana Realty");

    let uri = format!("/api/conversations/{}/messages", id);
    let (status, body) = call(&app, "POST", &uri, Some(&agent), Some(json!({"content": "Viewing on Friday?"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["receiver"], json!({"kind": "user", "id": 1}));
    assert_eq!(body["read"], false);

    let (_, body) = call(&app, "GET", "/api/conversations/unread-count", Some(&tenant), None).await;
    assert_eq!(body["unread_count"], 1);

    let read_uri = format!("/api/conversations/{}/read", id);
    let (status, body) = call(&app, "PUT", &read_uri, Some(&tenant), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked_read"], 1);

    let (_, body) = call(&app, "PUT", &read_uri, Some(&tenant), None).await;
    assert_eq!(body["marked_read"], 0);

    let (_, body) = call(&app, "GET", "/api/conversations/unread-count", Some(&tenant), None).await;
    assert_eq!(body["unread_count"], 0);
    // the agent's own unread message is untouched by the tenant's read
    let (_, body) = call(&app, "GET", "/api/conversations/unread-count", Some(&agent), None).await;
    assert_eq!(body["unread_count"], 1);
}

#[tokio::test]
async fn test_rest_send_pushes_to_online_receiver() {
    let (app, state, id) = app_with_conversation().await;
    let agent = token_for(AGENT, "Dana Realty");

    let (tenant_session, mut tenant_rx) = SessionHandle::new(TENANT);
    state.registry.register(tenant_session).await;

    let uri = format!("/api/conversations/{}/messages", id);
    let (status, _) = call(&app, "POST", &uri, Some(&agent), Some(json!({"content": "Sent over REST"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    match tenant_rx.recv().await {
        Some(ServerEvent::NewMessage { conversation_id, message }) => {
            assert_eq!(conversation_id, id);
            assert_eq!(message.content, "Sent over REST");
        }
        other => panic!("expected new_message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_outsider_is_forbidden() {
    let (app, _state, id) = app_with_conversation().await;
    let outsider = token_for(OUTSIDER, "Acme Lettings");

    let uri = format!("/api/conversations/{}/messages", id);
    let (status, body) = call(&app, "GET", &uri, Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "Authorization");

    let (status, _) = call(&app, "POST", &uri, Some(&outsider), Some(json!({"content": "hi"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app, "DELETE", &format!("/api/conversations/{}", id), Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_delete_conversation() {
    let (app, _state, id) = app_with_conversation().await;
    let agent = token_for(AGENT, "Dana Realty");
    let tenant = token_for(TENANT, "Tomás Tenant");

    let (status, body) = call(&app, "DELETE", &format!("/api/conversations/{}", id), Some(&agent), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_messages"], 1);

    let uri = format!("/api/conversations/{}/messages", id);
    let (status, body) = call(&app, "GET", &uri, Some(&tenant), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NotFound");

    let (_, body) = call(&app, "GET", "/api/conversations", Some(&tenant), None).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_health_is_public_and_stamped() {
    let app = create_router(test_state(seeded_db().await), vec![]);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
