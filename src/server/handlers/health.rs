use axum::{Json, extract::State};
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    gateway_enabled: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        gateway_enabled: state.gateway_enabled,
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let state = AppState::in_memory(false);
        let Json(response) = health_check(State(state)).await;

        assert_eq!(response.status, "ok");
        assert_eq!(response.service, "xtsystems-bridge");
        assert!(!response.gateway_enabled);
    }
}
