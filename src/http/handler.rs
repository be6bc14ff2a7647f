//! Request handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};

use crate::ratelimit::RateLimiter;
use crate::reasons::{ReasonProvider, Reply};

/// Message sent to throttled clients.
pub const THROTTLE_REASON: &str = "Too many requests. Calm down.";

/// Shared state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: Arc<RateLimiter>,
    pub reasons: Arc<ReasonProvider>,
}

impl AppState {
    /// Bundle the limiter and reason provider for the router.
    pub fn new(rate_limiter: Arc<RateLimiter>, reasons: Arc<ReasonProvider>) -> Self {
        Self {
            rate_limiter,
            reasons,
        }
    }
}

/// Body of a 429 response.
#[derive(Debug, Serialize)]
struct ThrottleBody {
    reason: &'static str,
    retry_after: u64,
}

/// Answer with a reason, unless the client is over its limit.
pub async fn reason_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let client = addr.ip().to_string();

    let decision = state.rate_limiter.check_now(&client);
    if !decision.admitted {
        warn!(
            client = %client,
            retry_after = decision.retry_after_secs,
            "Client throttled"
        );
        return throttled_response(decision.retry_after_secs);
    }

    let reply = state.reasons.pick(&mut rand::thread_rng());
    info!(client = %client, status = reply.status, reason = %reply.reason, "Response");
    reply_response(reply)
}

/// Liveness probe. Not rate limited.
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn throttled_response(retry_after: u64) -> Response {
    let body = ThrottleBody {
        reason: THROTTLE_REASON,
        retry_after,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

fn reply_response(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::NOT_ACCEPTABLE);
    (status, Json(reply)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::router;
    use crate::ratelimit::{ManualClock, RateLimiterConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    fn test_app(clock: &ManualClock, sigh_probability: f64) -> Router {
        let config = RateLimiterConfig::new(3, 10.0, 60.0).unwrap();
        let limiter = RateLimiter::with_clock(config, Arc::new(clock.clone()));
        let reasons = ReasonProvider::new(
            vec!["No.".to_string(), "Nope.".to_string()],
            sigh_probability,
        )
        .unwrap();
        router(AppState::new(Arc::new(limiter), Arc::new(reasons)))
    }

    fn request_from(path: &str, peer: &str) -> Request<Body> {
        let addr: SocketAddr = peer.parse().unwrap();
        let mut request = Request::builder().uri(path).body(Body::empty()).unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_gets_reason() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 0.0);

        let response = app
            .oneshot(request_from("/", "10.0.0.1:5000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = json_body(response).await;
        let reason = body["reason"].as_str().unwrap();
        assert!(reason == "No." || reason == "Nope.");
        assert!(body.get("sigh").is_none());
    }

    #[tokio::test]
    async fn test_any_path_gets_reason() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 0.0);

        let response = app
            .oneshot(request_from("/please/can/i", "10.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_sigh_reply_is_ok() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 1.0);

        let response = app
            .oneshot(request_from("/", "10.0.0.1:5000"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["sigh"], true);
        assert_eq!(body["reason"], crate::reasons::SIGH_REASON);
    }

    #[tokio::test]
    async fn test_over_limit_is_throttled_with_retry_after() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 0.0);

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request_from("/", "10.0.0.1:5000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
            clock.advance(1.0);
        }

        let response = app
            .clone()
            .oneshot(request_from("/", "10.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
        let body = json_body(response).await;
        assert_eq!(body["reason"], THROTTLE_REASON);
        assert_eq!(body["retry_after"], 60);

        clock.advance(27.0);
        let response = app
            .oneshot(request_from("/", "10.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "33");
    }

    #[tokio::test]
    async fn test_clients_identified_by_ip_not_port() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 0.0);

        for port in 5000..5003 {
            let peer = format!("10.0.0.1:{}", port);
            let response = app.clone().oneshot(request_from("/", &peer)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
        }

        let response = app
            .clone()
            .oneshot(request_from("/", "10.0.0.1:6000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app
            .oneshot(request_from("/", "10.0.0.2:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_health_is_not_rate_limited() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 0.0);

        for _ in 0..10 {
            let response = app
                .clone()
                .oneshot(request_from("/health", "10.0.0.1:5000"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["status"], "healthy");
        }

        let response = app
            .oneshot(request_from("/", "10.0.0.1:5000"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_non_get_is_rejected() {
        let clock = ManualClock::new(0.0);
        let app = test_app(&clock, 0.0);

        let mut request = request_from("/", "10.0.0.1:5000");
        *request.method_mut() = axum::http::Method::POST;

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
