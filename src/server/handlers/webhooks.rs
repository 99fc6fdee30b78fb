use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::outbound::webhook::schemas::DeliveryAttempt;
use crate::outbound::webhook::subscription::{
    NewSubscription, SubscriptionUpdate, WebhookSubscription,
};
use crate::server::AppState;
use crate::server::responses::ApiError;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/tenants/{tenant_id}/webhooks",
            get(list_webhooks).post(create_webhook),
        )
        .route(
            "/api/tenants/{tenant_id}/webhooks/{id}",
            get(get_webhook).patch(update_webhook).delete(delete_webhook),
        )
        .route(
            "/api/tenants/{tenant_id}/webhooks/{id}/deliveries",
            get(list_deliveries),
        )
        .route(
            "/api/tenants/{tenant_id}/webhooks/{id}/test",
            post(test_webhook),
        )
        .route("/api/tenants/{tenant_id}/events", post(emit_event))
}

/// Registration body; omitted policy fields take the configured defaults
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    #[serde(default)]
    name: Option<String>,
    target_url: String,
    subscribed_events: Vec<String>,
    #[serde(default)]
    secret: Option<String>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    retry_limit: Option<u32>,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    custom_headers: HashMap<String, String>,
}

/// Returned once, at registration; later reads never include the secret
#[derive(Debug, Serialize)]
pub struct CreatedWebhook {
    #[serde(flatten)]
    webhook: WebhookSubscription,
    secret: String,
}

#[derive(Debug, Deserialize)]
pub struct EmitEventRequest {
    event_type: String,
    #[serde(default)]
    data: Value,
}

async fn list_webhooks(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Json<Vec<WebhookSubscription>> {
    Json(state.dispatcher.registry().list(&tenant_id).await)
}

async fn create_webhook(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreatedWebhook>), ApiError> {
    let input = NewSubscription {
        name: body.name,
        target_url: body.target_url,
        subscribed_events: body.subscribed_events,
        secret: body.secret,
        active: body.active.unwrap_or(true),
        retry_limit: body.retry_limit.unwrap_or(state.defaults.retry_limit),
        timeout_seconds: body.timeout_seconds.unwrap_or(state.defaults.timeout_seconds),
        custom_headers: body.custom_headers,
    };

    let webhook = state.dispatcher.registry().create(&tenant_id, input).await?;
    let secret = webhook.secret.clone();
    Ok((StatusCode::CREATED, Json(CreatedWebhook { webhook, secret })))
}

async fn get_webhook(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
) -> Result<Json<WebhookSubscription>, ApiError> {
    Ok(Json(state.dispatcher.registry().get(&id, &tenant_id).await?))
}

async fn update_webhook(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
    Json(update): Json<SubscriptionUpdate>,
) -> Result<Json<WebhookSubscription>, ApiError> {
    Ok(Json(
        state
            .dispatcher
            .registry()
            .update(&id, &tenant_id, update)
            .await?,
    ))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.dispatcher.registry().delete(&id, &tenant_id).await?;
    state.delivery_log.forget(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_deliveries(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
) -> Result<Json<Vec<DeliveryAttempt>>, ApiError> {
    // ownership check before exposing history
    state.dispatcher.registry().get(&id, &tenant_id).await?;
    Ok(Json(state.delivery_log.history(&id).await?))
}

async fn test_webhook(
    State(state): State<AppState>,
    Path((tenant_id, id)): Path<(String, String)>,
) -> Result<Json<DeliveryAttempt>, ApiError> {
    Ok(Json(state.dispatcher.test_delivery(&id, &tenant_id).await?))
}

async fn emit_event(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(body): Json<EmitEventRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.event_type.trim().is_empty() {
        return Err(ApiError::Invalid("event_type must not be empty".to_string()));
    }

    info!(tenant_id = %tenant_id, event_type = %body.event_type, "Event emitted");
    // fire-and-forget: the handle is dropped, deliveries keep running
    let _ = state
        .dispatcher
        .dispatch(&body.event_type, body.data, &tenant_id)
        .await;

    Ok((StatusCode::ACCEPTED, Json(json!({"accepted": true}))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use axum::response::Response;
    use tower::ServiceExt;

    fn app() -> Router {
        routes().with_state(AppState::in_memory(false))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn registration(name: &str) -> Value {
        json!({
            "name": name,
            "target_url": "https://bot.example.com/webhooks/xtsystems",
            "subscribed_events": ["ticket.created"]
        })
    }

    #[tokio::test]
    async fn test_create_returns_secret_once() {
        let app = app();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/tenants/company-1/webhooks",
                registration("discord"),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created = json_body(response).await;
        assert_eq!(created["secret"].as_str().map(str::len), Some(64));
        assert_eq!(created["retry_limit"], 3);
        assert_eq!(created["timeout_seconds"], 30);
        let id = created["id"].as_str().unwrap().to_string();

        let fetched = app
            .oneshot(
                Request::get(format!("/api/tenants/company-1/webhooks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        assert!(json_body(fetched).await.get("secret").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_conflict() {
        let app = app();
        for expected in [StatusCode::CREATED, StatusCode::CONFLICT] {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/tenants/company-1/webhooks",
                    registration("discord"),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_invalid_registration_is_unprocessable() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/tenants/company-1/webhooks",
                json!({"target_url": "not a url", "subscribed_events": ["ticket.created"]}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_see_or_delete() {
        let app = app();
        let created = json_body(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/api/tenants/company-1/webhooks",
                    registration("discord"),
                ))
                .await
                .unwrap(),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::delete(format!("/api/tenants/company-2/webhooks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(
                Request::delete(format!("/api/tenants/company-1/webhooks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_delete_drops_delivery_history() {
        let state = AppState::in_memory(false);
        let app = routes().with_state(state.clone());
        let created = json_body(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/api/tenants/company-1/webhooks",
                    registration("discord"),
                ))
                .await
                .unwrap(),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();
        state
            .delivery_log
            .append(DeliveryAttempt::failed(
                uuid::Uuid::new_v4(),
                id.clone(),
                "ticket.created".to_string(),
                json!({}),
                1,
                Some(500),
                "Destination answered with status 500".to_string(),
            ))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::delete(format!("/api/tenants/company-1/webhooks/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.delivery_log.history(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patch_deactivates() {
        let app = app();
        let created = json_body(
            app.clone()
                .oneshot(json_request(
                    "POST",
                    "/api/tenants/company-1/webhooks",
                    registration("discord"),
                ))
                .await
                .unwrap(),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .oneshot(json_request(
                "PATCH",
                &format!("/api/tenants/company-1/webhooks/{id}"),
                json!({"active": false}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["active"], false);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_accepted() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/tenants/company-1/events",
                json!({"event_type": "ticket.created", "data": {"ticketId": 1}}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_emit_requires_event_type() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/api/tenants/company-1/events",
                json!({"event_type": " "}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_deliveries_of_unknown_webhook() {
        let response = app()
            .oneshot(
                Request::get("/api/tenants/company-1/webhooks/missing/deliveries")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
