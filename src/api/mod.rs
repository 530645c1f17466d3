// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderName, Request},
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{auth::require_auth, models::LocalUserId, state::AppState};

pub mod health;
pub mod users;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    // Every route in here runs only after the gateway reached `Bound`.
    let v1_routes = Router::new()
        .route("/users/me", get(users::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.gateway),
            require_auth,
        ))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .nest("/v1", v1_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id
                )
            }),
        )
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            MakeRequestUuid,
        ))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        users::get_current_user
    ),
    components(
        schemas(
            LocalUserId,
            users::UserMeResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Users", description = "Authenticated user identity")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::Response;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::reconciler::test_stores::FailingStore;
    use crate::auth::verifier::test_tokens::{self, ISSUER, SECRET};
    use crate::auth::{Gateway, IdentityReconciler, TokenVerifier};
    use crate::storage::{InMemoryUserStore, UserStore};

    fn state_with(store: Arc<dyn UserStore>, expose_details: bool) -> AppState {
        let gateway = Gateway::new(
            TokenVerifier::new(test_tokens::trust()),
            IdentityReconciler::new(store),
        )
        .with_error_details(expose_details);
        AppState::new(Arc::new(gateway))
    }

    fn app() -> Router {
        router(state_with(Arc::new(InMemoryUserStore::new()), true))
    }

    /// Signed against the wall clock, since the middleware uses real time.
    fn live_token(sub: &str, email: &str, exp_offset: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "sub": sub,
            "email": email,
            "iat": now,
            "exp": now + exp_offset,
            "iss": ISSUER,
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn me_request(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/v1/users/me");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let _ = app().into_make_service();
    }

    #[tokio::test]
    async fn liveness_is_public() {
        let response = app()
            .oneshot(Request::get("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn readiness_reports_store_status() {
        let response = app()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["checks"]["user_store"], "ok");
        assert!(body["checks"].get("jwks").is_none());

        let degraded = router(state_with(Arc::new(FailingStore::default()), true));
        let response = degraded
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "degraded");
    }

    #[tokio::test]
    async fn protected_route_requires_header() {
        let response = app().oneshot(me_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "unauthorized");
    }

    #[tokio::test]
    async fn authenticated_request_returns_local_user() {
        let store = Arc::new(InMemoryUserStore::new());
        let app = router(state_with(store.clone(), true));
        let token = live_token("user_42", "u42@example.com", 600);

        let first = app.clone().oneshot(me_request(Some(&token))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = json_body(first).await;
        assert_eq!(first["email"], "u42@example.com");

        let second = app.oneshot(me_request(Some(&token))).await.unwrap();
        let second = json_body(second).await;
        assert_eq!(first["user_id"], second["user_id"]);

        let stored = store.find_by_subject("user_42").unwrap().unwrap();
        assert_eq!(first["user_id"], json!(stored.id.to_string()));
        assert_eq!(store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_token_gets_details_when_enabled() {
        let token = live_token("user_1", "u1@example.com", -3600);

        let response = app().oneshot(me_request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "invalid_or_expired_token");
        assert!(body.get("details").is_some());

        let quiet = router(state_with(Arc::new(InMemoryUserStore::new()), false));
        let response = quiet.oneshot(me_request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error_code"], "invalid_or_expired_token");
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn store_failure_is_500() {
        let app = router(state_with(Arc::new(FailingStore::default()), true));
        let token = live_token("user_1", "u1@example.com", 600);

        let response = app.oneshot(me_request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error_code"], "failed_to_sync_user");
    }

    #[tokio::test]
    async fn rejection_body_never_echoes_token() {
        let token = live_token("user_1", "u1@example.com", -3600);
        let response = app().oneshot(me_request(Some(&token))).await.unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!body.contains(&token));
    }

    #[test]
    fn openapi_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
        assert!(doc.paths.paths.contains_key("/v1/users/me"));
    }
}
