use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use waypoint_backend::auth::{AuthError, CredentialVerifier, DiscordOAuth, DiscordProfile, TokenSigner};
use waypoint_backend::directory::Directory;
use waypoint_backend::mailer::{LogMailer, Mailer};
use waypoint_backend::pending::PendingAuthStore;
use waypoint_backend::session::SessionTicketIssuer;
use waypoint_backend::stats::StatsSampler;
use waypoint_backend::{AppState, create_app};

struct StubDiscord;

#[async_trait]
impl DiscordOAuth for StubDiscord {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://discord.test/authorize?state={state}")
    }

    async fn exchange_code(&self, _code: &str) -> Result<DiscordProfile, AuthError> {
        Err(AuthError::Provider("stub".to_string()))
    }
}

/// Helper to create a test app over an in-memory database
async fn setup_test_app() -> axum::Router {
    let db = waypoint_db::Database::open_in_memory()
        .await
        .expect("Failed to create in-memory database");
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);
    let state = Arc::new(AppState {
        db: db.clone(),
        directory: Directory::new(),
        stats: StatsSampler::new(60_000),
        pending: PendingAuthStore::new(),
        verifier: CredentialVerifier::new(db.clone(), TokenSigner::new("test-secret")),
        sessions: SessionTicketIssuer::new(db),
        discord: Arc::new(StubDiscord),
        mailer,
    });
    let config = waypoint_backend::config::Config::default();
    create_app(state, config.request_body_limit, config.request_timeout, None)
}

/// Helper to send a request and get response
async fn send_request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder().uri(uri).method(method);

    if let Some(token) = auth_token {
        request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = if let Some(json_body) = body {
        request_builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json_body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    let json = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

#[tokio::test]
async fn test_error_response_format_for_failed_login() {
    // GIVEN: An empty database
    let app = setup_test_app().await;

    // WHEN: Logging in with unknown credentials
    let (status, body) = send_request(
        app,
        "POST",
        "/users/login",
        Some(json!({ "email": "nobody@example.com", "password": "hunter22" })),
        None,
    )
    .await;

    // THEN: Should return 401 with a JSON error
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // AND: The message does not say which part was wrong
    assert!(body.get("error").is_some(), "Response should have 'error' field");
    assert_eq!(body["error"], "User does not exist or wrong password");
}

#[tokio::test]
async fn test_error_response_for_missing_bearer_token() {
    // GIVEN: An empty database
    let app = setup_test_app().await;

    // WHEN: Requesting a protected route without a token, then with garbage
    let (status, body) = send_request(app.clone(), "GET", "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let (status, body) = send_request(app, "GET", "/users/me", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn test_error_response_for_malformed_server_address() {
    // GIVEN: An empty database
    let app = setup_test_app().await;

    // WHEN: Posting a heartbeat for a bad address
    let (status, body) = send_request(app, "POST", "/servers/1.2.3.4", None, None).await;

    // THEN: The message shows the expected format
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Address must contain IP and port (i.e. 127.0.0.1:7777)"
    );
}

#[tokio::test]
async fn test_error_response_for_session_lookup() {
    // GIVEN: An empty database
    let app = setup_test_app().await;

    // WHEN: Resolving a session against a port-less address
    let (status, body) = send_request(
        app.clone(),
        "GET",
        "/servers/not-an-address/sessions/whatever",
        None,
        None,
    )
    .await;

    // THEN: Should return 400 with the validation message
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad server IP:port passed");

    // AND: An unknown (address, session) pair is a plain 404
    let (status, body) = send_request(
        app,
        "GET",
        "/servers/1.2.3.4:7777/sessions/whatever",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn test_error_response_for_validation_failure() {
    // GIVEN: An empty database
    let app = setup_test_app().await;

    // WHEN: Registering with a name containing invalid characters
    let (status, body) = send_request(
        app,
        "POST",
        "/users",
        Some(json!({ "name": "bad name!", "email": "a@b.com", "password": "hunter22" })),
        None,
    )
    .await;

    // THEN: Should return 400 with a field-specific message
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error_msg = body["error"].as_str().unwrap();
    assert!(
        error_msg.contains("Name") || error_msg.contains("name"),
        "Error message: {}",
        error_msg
    );
}

#[tokio::test]
async fn test_error_responses_do_not_leak_internals() {
    // GIVEN: An empty database
    let app = setup_test_app().await;

    // WHEN: Hitting a representative set of failure paths
    let failures = [
        send_request(app.clone(), "GET", "/users/login-discord", None, None).await,
        send_request(app.clone(), "GET", "/users/me", None, Some("garbage")).await,
        send_request(
            app.clone(),
            "POST",
            "/users/login",
            Some(json!({ "email": "nobody@example.com", "password": "x" })),
            None,
        )
        .await,
        send_request(
            app,
            "GET",
            "/users/login-discord/callback?state=abc&code=xyz",
            None,
            None,
        )
        .await,
    ];

    // THEN: No body mentions SQL, file paths or panics
    for (status, body) in failures {
        assert!(status.is_client_error(), "expected 4xx, got {status}");
        let text = body.to_string().to_lowercase();
        assert!(!text.contains("sqlite"), "leaked internals: {text}");
        assert!(!text.contains("panic"), "leaked internals: {text}");
        assert!(!text.contains(".rs"), "leaked internals: {text}");
    }
}
