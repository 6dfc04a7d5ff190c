// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{assessment, certificate, health},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Assessment routes require a bearer token.
/// * Certificate verification and health are public.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let assessment_routes = Router::new()
        .route("/{assessment_id}/start", post(assessment::start_assessment))
        .route("/{assessment_id}/submit", post(assessment::submit_assessment))
        .route("/{assessment_id}/attempts", get(assessment::list_attempts))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let certificate_routes = Router::new().route("/{code}", get(certificate::verify_certificate));

    Router::new()
        .route("/health", get(health::health_handler))
        .nest("/api/assessments", assessment_routes)
        .nest("/api/certificates", certificate_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::{config::Config, notify::LogNotifier, store::MemoryStore, utils::jwt::sign_jwt};

    fn app() -> Router {
        let config = Config {
            database_url: "memory".to_string(),
            jwt_secret: "router_secret".to_string(),
            rust_log: "error".to_string(),
            port: 0,
            certificate_base_url: url::Url::parse("http://localhost:3000").unwrap(),
            notify_webhook_url: None,
            allowed_origins: vec!["http://localhost:3000".to_string(), "not a header\n".to_string()],
        };
        create_router(AppState {
            store: Arc::new(MemoryStore::new()),
            notifier: Arc::new(LogNotifier),
            config,
        })
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let response = app()
            .oneshot(
                Request::post("/api/assessments/1/start")
                    .header("Authorization", "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Invalid token");
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler() {
        let token = sign_jwt(3, "router_secret", 60).unwrap();
        let response = app()
            .oneshot(
                Request::post("/api/assessments/1/start")
                    .header("Authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_certificate_lookup_is_public() {
        let response = app()
            .oneshot(Request::get("/api/certificates/CERT-000000000000").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
