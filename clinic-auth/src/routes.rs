//! Router assembly
//!
//! All routes live under `server.base_path` (default `/api`):
//!
//! | Route                         | Handler                 |
//! |-------------------------------|-------------------------|
//! | `GET /oauth/{provider}/login`    | [`initiate_oauth`]        |
//! | `GET /oauth/{provider}/callback` | [`handle_oauth_callback`] |
//! | `GET /auth/me`                   | [`handlers::me`]          |
//! | `GET, POST /auth/logout`         | [`handlers::logout`]      |

use axum::{
    http::{header::SET_COOKIE, HeaderValue, Method, StatusCode},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::CorsSettings;
use crate::handlers;
use crate::middleware::SessionLayer;
use crate::oauth2::handlers::{handle_oauth_callback, initiate_oauth};
use crate::state::AppState;

/// Build the complete application router
#[must_use]
pub fn router(state: &AppState) -> Router {
    let api = Router::new()
        .route("/oauth/{provider}/login", get(initiate_oauth))
        .route("/oauth/{provider}/callback", get(handle_oauth_callback))
        .route("/auth/me", get(handlers::me))
        .route("/auth/logout", get(handlers::logout).post(handlers::logout))
        // inside the session layer so a timed-out request is still persisted
        .layer(TimeoutLayer::with_status_code(
            StatusCode::INTERNAL_SERVER_ERROR,
            state.config().server.request_timeout(),
        ))
        .layer(SessionLayer::new(state))
        .with_state(state.clone());

    let base_path = state.config().server.normalized_base_path();
    let app = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(&base_path, api)
    };

    app.layer(cors_layer(&state.config().cors))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the browser client; credentials are always allowed
fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let origins = if settings.allows_any() {
        AllowOrigin::mirror_request()
    } else {
        let list: Vec<HeaderValue> = settings
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(%origin, error = %e, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(list)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .expose_headers([SET_COOKIE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClinicAuthConfig;
    use axum::http::header;
    use axum_test::TestServer;

    fn server(config: ClinicAuthConfig) -> TestServer {
        let state = AppState::new(config).unwrap();
        TestServer::new(router(&state)).unwrap()
    }

    #[tokio::test]
    async fn test_routes_are_nested_under_base_path() {
        let server = server(ClinicAuthConfig::default());
        server.get("/api/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
        server.get("/auth/me").await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_base_path_mounts_at_root() {
        let mut config = ClinicAuthConfig::default();
        config.server.base_path = "/".to_string();
        let server = server(config);
        server.get("/auth/me").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cors_mirrors_origin_with_credentials() {
        let server = server(ClinicAuthConfig::default());
        let response = server
            .get("/api/auth/me")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://app.example.com"))
            .await;

        assert_eq!(
            response.header(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            "https://app.example.com"
        );
        assert_eq!(response.header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS), "true");
    }

    #[tokio::test]
    async fn test_cors_restricted_list() {
        let mut config = ClinicAuthConfig::default();
        config.cors.allowed_origins = vec!["https://clinic.example.com".to_string()];
        let server = server(config);

        let response = server
            .get("/api/auth/me")
            .add_header(header::ORIGIN, HeaderValue::from_static("https://evil.example.net"))
            .await;
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
