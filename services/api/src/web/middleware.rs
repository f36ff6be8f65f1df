//! services/api/src/web/middleware.rs
//!
//! Request guards for customer and admin routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::{AppState, CustomerId};

pub const CUSTOMER_HEADER: &str = "x-customer-id";
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Middleware that extracts the customer id from the `x-customer-id` header.
///
/// If present, inserts a `CustomerId` into request extensions for handlers to use.
/// If missing or blank, returns 401 Unauthorized.
pub async fn require_customer(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let customer_id = req
        .headers()
        .get(CUSTOMER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    req.extensions_mut().insert(CustomerId(customer_id));
    Ok(next.run(req).await)
}

/// Middleware that only lets requests carrying the configured admin token through.
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        warn!("Admin request refused: no admin token is configured.");
        return Err(StatusCode::FORBIDDEN);
    };

    let presented = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if presented != expected {
        warn!("Admin request refused: invalid token.");
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryLedger, MemoryThresholds};
    use crate::config::Config;
    use ambassador_core::{
        AccrualEngine, PortError, PortResult, Submission, SubmissionAck, SubmissionGateway,
        SystemClock, ThresholdConfig,
    };
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http,
        middleware::{from_fn, from_fn_with_state},
        routing::get,
        Extension, Router,
    };
    use tower::util::ServiceExt;

    struct UnusedGateway;

    #[async_trait]
    impl SubmissionGateway for UnusedGateway {
        async fn submit_viewing(&self, _submission: &Submission) -> PortResult<SubmissionAck> {
            Err(PortError::Unexpected("not expected in middleware tests".to_string()))
        }
    }

    fn app_state(admin_token: Option<&str>) -> Arc<AppState> {
        let admin_token = admin_token.map(str::to_string);
        let config = Config::from_lookup(|key| match key {
            "POINT_API_URL" => Some("https://points.example".to_string()),
            "ADMIN_TOKEN" => admin_token.clone(),
            _ => None,
        })
        .unwrap();
        let thresholds = ThresholdConfig {
            duration50: 30,
            duration100: 60,
            milestone50_enabled: true,
            cooldown_secs: 3600,
        };
        let store = Arc::new(MemoryThresholds::new(thresholds));
        let engine = AccrualEngine::new(
            store.clone(),
            Arc::new(MemoryLedger::new()),
            Arc::new(UnusedGateway),
            Arc::new(SystemClock),
            thresholds,
        );
        Arc::new(AppState {
            engine,
            thresholds: store,
            config: Arc::new(config),
        })
    }

    fn customer_app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(CustomerId(id)): Extension<CustomerId>| async move { id }),
            )
            .layer(from_fn(require_customer))
    }

    fn admin_app(admin_token: Option<&str>) -> Router {
        let state = app_state(admin_token);
        Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(from_fn_with_state(state.clone(), require_admin))
            .with_state(state)
    }

    fn request(uri: &str, header: Option<(&str, &str)>) -> Request {
        let mut builder = http::Request::builder().uri(uri);
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn customer_header_is_required() {
        let response = customer_app()
            .oneshot(request("/whoami", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = customer_app()
            .oneshot(request("/whoami", Some((CUSTOMER_HEADER, "   "))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn customer_id_is_trimmed_and_passed_on() {
        let response = customer_app()
            .oneshot(request("/whoami", Some((CUSTOMER_HEADER, " 0812345678 "))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"0812345678");
    }

    #[tokio::test]
    async fn admin_routes_are_closed_without_a_configured_token() {
        let response = admin_app(None)
            .oneshot(request("/admin", Some((ADMIN_TOKEN_HEADER, "anything"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_token_must_match() {
        let response = admin_app(Some("s3cret"))
            .oneshot(request("/admin", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = admin_app(Some("s3cret"))
            .oneshot(request("/admin", Some((ADMIN_TOKEN_HEADER, "guess"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = admin_app(Some("s3cret"))
            .oneshot(request("/admin", Some((ADMIN_TOKEN_HEADER, "s3cret"))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
