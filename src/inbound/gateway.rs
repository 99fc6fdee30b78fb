use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::domain::events::EventEnvelope;
use crate::domain::ports::RoutingError;
use crate::inbound::rate_limiter::RateLimiter;
use crate::inbound::router::{EventRouter, RouteOutcome};
use crate::outbound::webhook::hmac_signer::{VerificationError, WebhookVerifier};

/// Everything the inbound endpoint needs per request
#[derive(Clone)]
pub struct GatewayState {
    pub verifier: Arc<WebhookVerifier>,
    pub router: Arc<EventRouter>,
    pub limiter: RateLimiter,
    pub max_body_bytes: usize,
}

/// Why the gateway refused a request
#[derive(Debug, thiserror::Error)]
pub enum GatewayRejection {
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Verification failed: {0}")]
    Unauthorized(#[from] VerificationError),

    #[error("Body is not an event envelope: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Routing(#[from] RoutingError),
}

impl IntoResponse for GatewayRejection {
    fn into_response(self) -> Response {
        match self {
            GatewayRejection::RateLimited { retry_after } => {
                let seconds = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({"error": "rate_limit_exceeded"})),
                )
                    .into_response();
                if let Ok(value) = HeaderValue::from_str(&seconds.max(1).to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            GatewayRejection::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({"error": "payload_too_large"})),
            )
                .into_response(),
            GatewayRejection::Unauthorized(e) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized", "reason": e.reason()})),
            )
                .into_response(),
            GatewayRejection::InvalidPayload(_) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_payload"})),
            )
                .into_response(),
            GatewayRejection::Routing(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response(),
        }
    }
}

/// Mount the inbound webhook endpoint at `path` (POST only)
pub fn routes(path: &str, state: GatewayState) -> Router {
    Router::new()
        .route(path, post(receive_webhook))
        .with_state(state)
}

async fn receive_webhook(
    State(state): State<GatewayState>,
    request: Request,
) -> Result<Json<serde_json::Value>, GatewayRejection> {
    let client_ip = client_ip(&request);

    if let Err(limited) = state.limiter.check(&client_ip).await {
        warn!(client_ip = %client_ip, "Inbound webhook rate limited");
        return Err(GatewayRejection::RateLimited {
            retry_after: limited.retry_after,
        });
    }

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| GatewayRejection::PayloadTooLarge {
            limit: state.max_body_bytes,
        })?;

    // verify over the raw bytes exactly as received
    if let Err(e) = state.verifier.verify_headers(&parts.headers, &body) {
        warn!(client_ip = %client_ip, reason = e.reason(), error = %e, "Rejected inbound webhook");
        return Err(e.into());
    }

    let envelope: EventEnvelope = serde_json::from_slice(&body).map_err(|e| {
        warn!(client_ip = %client_ip, error = %e, "Verified body is not an event envelope");
        GatewayRejection::InvalidPayload(e.to_string())
    })?;

    match state.router.route(&envelope).await {
        Ok(RouteOutcome::Routed { handler, failed, .. }) => {
            info!(
                event_type = %envelope.event_type,
                source_id = %envelope.source_id,
                handler = handler,
                failed_channels = failed,
                "Inbound webhook processed"
            );
        }
        Ok(RouteOutcome::Unhandled) => {}
        Err(e) => {
            error!(event_type = %envelope.event_type, error = %e, "Failed to route inbound webhook");
            return Err(e.into());
        }
    }

    Ok(Json(json!({"success": true})))
}

fn client_ip(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
