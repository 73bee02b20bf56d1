//! End-to-end login flow tests
//!
//! Drives the full router with a cookie-keeping client against a fake
//! identity provider served on an ephemeral port, so the real HTTP token
//! exchange client is exercised.

use axum::{
    extract::{Form, Query},
    http::{
        header::{LOCATION, ORIGIN, SET_COOKIE},
        HeaderValue, StatusCode,
    },
    routing::{get, post},
    Json, Router,
};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clinic_auth::prelude::*;

const CALLBACK_URL: &str = "https://clinic.example.com/api/oauth/google/callback";

/// Counts calls made to the fake provider
#[derive(Default)]
struct ProviderCalls {
    token: AtomicUsize,
    tokeninfo: AtomicUsize,
    /// Delay applied to the first `/token` call only
    first_token_delay: Duration,
}

/// Fake Google: accepts `good-code` only and vouches for user 42
async fn spawn_provider(calls: Arc<ProviderCalls>) -> String {
    let token_calls = Arc::clone(&calls);
    let info_calls = calls;

    let router = Router::new()
        .route(
            "/token",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let calls = Arc::clone(&token_calls);
                async move {
                    if calls.token.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(calls.first_token_delay).await;
                    }
                    if form.get("code").map(String::as_str) == Some("good-code")
                        && form.get("redirect_uri").map(String::as_str) == Some(CALLBACK_URL)
                        && form.get("client_secret").map(String::as_str) == Some("test-secret")
                    {
                        (StatusCode::OK, Json(json!({ "id_token": "tok" })))
                    } else {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "error": "invalid_grant" })),
                        )
                    }
                }
            }),
        )
        .route(
            "/tokeninfo",
            get(move |Query(query): Query<HashMap<String, String>>| {
                let calls = Arc::clone(&info_calls);
                async move {
                    calls.tokeninfo.fetch_add(1, Ordering::SeqCst);
                    if query.get("id_token").map(String::as_str) == Some("tok") {
                        (StatusCode::OK, Json(json!({ "sub": "42", "email": "a@b.com" })))
                    } else {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(json!({ "error": "invalid_token" })),
                        )
                    }
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake provider");
    let addr = listener.local_addr().expect("provider address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake provider");
    });

    format!("http://{addr}")
}

struct Harness {
    server: TestServer,
    store: Arc<MemorySessionStore>,
    calls: Arc<ProviderCalls>,
}

impl Harness {
    async fn new(configure: impl FnOnce(&mut ClinicAuthConfig)) -> Self {
        Self::with_provider(ProviderCalls::default(), configure).await
    }

    async fn with_provider(
        calls: ProviderCalls,
        configure: impl FnOnce(&mut ClinicAuthConfig),
    ) -> Self {
        let calls = Arc::new(calls);
        let provider = spawn_provider(Arc::clone(&calls)).await;

        let mut config = ClinicAuthConfig::default();
        config.session.secure_cookies = false;
        config.oauth2.google.client_id = Some("test-client".to_string());
        config.oauth2.google.client_secret = Some("test-secret".to_string());
        config.oauth2.google.redirect_uri = Some(CALLBACK_URL.to_string());
        config.oauth2.google.token_url = format!("{provider}/token");
        config.oauth2.google.tokeninfo_url = format!("{provider}/tokeninfo");
        configure(&mut config);

        let store = Arc::new(MemorySessionStore::new());
        let state = AppState::with_store(config, store.clone()).expect("app state");

        let mut server = TestServer::new(router(&state)).expect("test server");
        server.save_cookies();

        Self {
            server,
            store,
            calls,
        }
    }

    async fn configured() -> Self {
        Self::new(|_| {}).await
    }

    /// Start a login and return the provider URL's query parameters
    async fn login(&self, to: &str, origin: &'static str) -> HashMap<String, String> {
        let response = self
            .server
            .get("/api/oauth/google/login")
            .add_query_param("to", to)
            .add_header(ORIGIN, HeaderValue::from_static(origin))
            .await;
        response.assert_status(StatusCode::FOUND);

        let location = response.header(LOCATION);
        let url = url::Url::parse(location.to_str().expect("ascii location")).expect("absolute location");
        url.query_pairs().into_owned().collect()
    }

    async fn callback(&self, code: &str, state: &str) -> axum_test::TestResponse {
        self.server
            .get("/api/oauth/google/callback")
            .add_query_param("code", code)
            .add_query_param("state", state)
            .await
    }

    async fn session_value(&self, session_cookie: &str, key: &str) -> Option<Value> {
        let id: SessionId = session_cookie.parse().ok()?;
        let data = self.store.load(&id).await.ok()??;
        data.data.get(key).cloned()
    }
}

#[tokio::test]
async fn test_me_requires_login() {
    let harness = Harness::configured().await;

    let response = harness.server.get("/api/auth/me").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    response.assert_json(&json!({ "message": "Please login (10001)" }));

    assert!(response.headers().get(SET_COOKIE).is_none());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_full_login_flow() {
    let harness = Harness::configured().await;

    // leg 1
    let response = harness
        .server
        .get("/api/oauth/google/login")
        .add_query_param("to", "https://app.example.com/dashboard")
        .add_header(ORIGIN, HeaderValue::from_static("https://app.example.com"))
        .await;
    response.assert_status(StatusCode::FOUND);

    let pending_session = response.cookie("CLINIC_SESSION").value().to_string();
    let location = url::Url::parse(response.header(LOCATION).to_str().unwrap()).unwrap();
    let params: HashMap<String, String> = location.query_pairs().into_owned().collect();

    assert_eq!(params["redirect_uri"], CALLBACK_URL);
    assert_eq!(params["client_id"], "test-client");
    assert_eq!(
        harness.session_value(&pending_session, "oauth_state").await,
        Some(Value::String(params["state"].clone()))
    );
    assert_eq!(
        harness.session_value(&pending_session, "oauth_redirect").await,
        Some(json!("https://app.example.com/dashboard"))
    );

    // leg 2
    let response = harness.callback("good-code", &params["state"]).await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header(LOCATION), "https://app.example.com/dashboard");

    // session fixation defense: the pending session id is retired
    let authenticated_session = response.cookie("CLINIC_SESSION").value().to_string();
    assert_ne!(authenticated_session, pending_session);
    assert!(harness.session_value(&pending_session, "user").await.is_none());
    assert!(harness.session_value(&authenticated_session, "oauth_state").await.is_none());
    assert!(harness.session_value(&authenticated_session, "oauth_redirect").await.is_none());

    let response = harness.server.get("/api/auth/me").await;
    response.assert_status_ok();
    response.assert_json(&json!({
        "id": "42",
        "email": "a@b.com",
        "name": "",
        "picture": "",
    }));

    assert_eq!(harness.calls.token.load(Ordering::SeqCst), 1);
    assert_eq!(harness.calls.tokeninfo.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_replayed_callback_is_rejected() {
    let harness = Harness::configured().await;
    let params = harness
        .login("https://app.example.com/dashboard", "https://app.example.com")
        .await;

    harness
        .callback("good-code", &params["state"])
        .await
        .assert_status(StatusCode::FOUND);

    let replay = harness.callback("good-code", &params["state"]).await;
    replay.assert_status(StatusCode::BAD_REQUEST);
    replay.assert_json(&json!({ "message": "Invalid OAuth state" }));
    assert_eq!(harness.calls.token.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_state_mismatch_never_reaches_provider() {
    let harness = Harness::configured().await;
    let params = harness
        .login("https://app.example.com/dashboard", "https://app.example.com")
        .await;

    let forged = format!("{}0", &params["state"][..63]);
    let forged = if forged == params["state"] {
        format!("{}1", &params["state"][..63])
    } else {
        forged
    };

    harness
        .callback("good-code", &forged)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // the pending state was consumed by the failed attempt
    harness
        .callback("good-code", &params["state"])
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(harness.calls.token.load(Ordering::SeqCst), 0);
    assert_eq!(harness.calls.tokeninfo.load(Ordering::SeqCst), 0);
    harness.server.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_callback_without_login() {
    let harness = Harness::configured().await;

    harness
        .callback("good-code", "whatever")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.calls.token.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logout_ends_session() {
    let harness = Harness::configured().await;
    let params = harness
        .login("https://app.example.com/dashboard", "https://app.example.com")
        .await;
    harness
        .callback("good-code", &params["state"])
        .await
        .assert_status(StatusCode::FOUND);
    harness.server.get("/api/auth/me").await.assert_status_ok();

    let response = harness.server.get("/api/auth/logout").await;
    response.assert_status_ok();
    response.assert_json(&json!({ "ok": true }));

    harness.server.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
    assert!(harness.store.is_empty());

    // idempotent
    let again = harness.server.get("/api/auth/logout").await;
    again.assert_status_ok();
    again.assert_json(&json!({ "ok": true }));
}

#[tokio::test]
async fn test_login_without_client_id() {
    let harness = Harness::new(|config| config.oauth2.google.client_id = None).await;

    let response = harness.server.get("/api/oauth/google/login").await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.assert_json(&json!({ "message": "Google OAuth not configured" }));

    assert!(response.headers().get(SET_COOKIE).is_none());
    assert!(response.headers().get(LOCATION).is_none());
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_foreign_target_falls_back_to_root() {
    let harness = Harness::configured().await;
    let params = harness
        .login("https://evil.example.net/phish", "https://app.example.com")
        .await;

    let response = harness.callback("good-code", &params["state"]).await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(response.header(LOCATION), "/");
}

#[tokio::test]
async fn test_dev_origin_target_is_honoured() {
    let harness = Harness::configured().await;
    let params = harness
        .login("http://localhost:5173/patients", "http://localhost:5173")
        .await;

    let response = harness.callback("good-code", &params["state"]).await;
    assert_eq!(response.header(LOCATION), "http://localhost:5173/patients");
}

#[tokio::test]
async fn test_json_mode_and_legacy_state_parameter() {
    let harness = Harness::configured().await;

    let response = harness
        .server
        .get("/api/oauth/google/login")
        .add_query_param("state", "https://app.example.com/records")
        .add_query_param("json", "TRUE")
        .add_header(ORIGIN, HeaderValue::from_static("https://app.example.com"))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let url = url::Url::parse(body["url"].as_str().expect("url field")).unwrap();
    assert!(url.as_str().starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(params["access_type"], "offline");
    assert_eq!(params["prompt"], "consent");
    assert_eq!(params["scope"], "openid email profile");

    let response = harness.callback("good-code", &params["state"]).await;
    assert_eq!(response.header(LOCATION), "https://app.example.com/records");
}

#[tokio::test]
async fn test_rejected_code_is_provider_error() {
    let harness = Harness::configured().await;
    let params = harness
        .login("https://app.example.com/dashboard", "https://app.example.com")
        .await;

    let response = harness.callback("stale-code", &params["state"]).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(
        body["message"],
        "Failed to exchange OAuth code: HTTP 400 Bad Request: invalid_grant"
    );

    assert_eq!(harness.calls.tokeninfo.load(Ordering::SeqCst), 0);
    harness.server.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provider_reported_error() {
    let harness = Harness::configured().await;
    let params = harness
        .login("https://app.example.com/dashboard", "https://app.example.com")
        .await;

    let response = harness
        .server
        .get("/api/oauth/google/callback")
        .add_query_param("error", "access_denied")
        .add_query_param("state", &params["state"])
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(harness.calls.token.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_provider() {
    let harness = Harness::configured().await;
    harness
        .server
        .get("/api/oauth/myspace/login")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_synthesized_callback_url() {
    let harness = Harness::new(|config| config.oauth2.google.redirect_uri = None).await;

    let response = harness
        .server
        .get("/api/oauth/google/login")
        .add_header(
            axum::http::HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_static("https"),
        )
        .await;
    let location = url::Url::parse(response.header(LOCATION).to_str().unwrap()).unwrap();
    let params: HashMap<String, String> = location.query_pairs().into_owned().collect();
    assert_eq!(
        params["redirect_uri"],
        "https://localhost:8080/api/oauth/google/callback"
    );
}

#[tokio::test]
async fn test_timed_out_callback_still_consumes_state() {
    let slow = ProviderCalls {
        first_token_delay: Duration::from_millis(800),
        ..ProviderCalls::default()
    };
    let harness = Harness::with_provider(slow, |config| {
        config.server.request_timeout_ms = 400;
        config.oauth2.google.timeout_ms = 2_000;
    })
    .await;

    let params = harness.login("https://app.example.com/", "https://app.example.com").await;

    let response = harness.callback("good-code", &params["state"]).await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    // the nonce was used up even though the request never finished
    let replay = harness.callback("good-code", &params["state"]).await;
    replay.assert_status(StatusCode::BAD_REQUEST);
    replay.assert_json(&json!({ "message": "Invalid OAuth state" }));

    harness.server.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(harness.calls.token.load(Ordering::SeqCst), 1);
}
