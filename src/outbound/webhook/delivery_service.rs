use crate::domain::events::{EventEnvelope, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::domain::ports::DeliveryLog;
use crate::outbound::webhook::hmac_signer::HmacSigner;
use crate::outbound::webhook::http_client::{DeliveryClient, DeliveryRequest, HttpClientError};
use crate::outbound::webhook::retry_strategy::RetryStrategy;
use crate::outbound::webhook::schemas::DeliveryAttempt;
use crate::outbound::webhook::subscription::{WebhookSubscription, is_forwardable_header};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Envelope serialized exactly once; the same bytes are signed and sent
/// to every recipient and on every attempt.
#[derive(Debug, Clone)]
pub struct PreparedEvent {
    pub event_id: Uuid,
    pub envelope: EventEnvelope,
    pub body: Bytes,
}

impl PreparedEvent {
    pub fn new(envelope: EventEnvelope) -> Result<Self, serde_json::Error> {
        let body = Bytes::from(envelope.to_json()?);
        Ok(Self {
            event_id: Uuid::new_v4(),
            envelope,
            body,
        })
    }
}

/// Sends one event to one subscription with bounded exponential backoff.
///
/// Every attempt is appended to the [`DeliveryLog`] before the next one is
/// scheduled, and every sequence ends in exactly one terminal record.
pub struct DeliveryService {
    client: Arc<dyn DeliveryClient>,

    log: Arc<dyn DeliveryLog>,

    retry_strategy: RetryStrategy,

    /// Bytes of response body kept in the log
    response_body_limit: usize,
}

impl DeliveryService {
    pub fn new(client: Arc<dyn DeliveryClient>, log: Arc<dyn DeliveryLog>) -> Self {
        Self {
            client,
            log,
            retry_strategy: RetryStrategy::default(),
            response_body_limit: 1024,
        }
    }

    /// Override the retry strategy.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn with_response_body_limit(mut self, limit: usize) -> Self {
        self.response_body_limit = limit;
        self
    }

    /// Run a full delivery sequence and return its terminal record.
    ///
    /// Never fails: errors become log records.
    pub async fn send_with_retry(
        &self,
        subscription: &WebhookSubscription,
        event: &PreparedEvent,
    ) -> DeliveryAttempt {
        let retry_limit = subscription.retry_limit.max(1);
        let mut last_error = String::new();
        let mut attempts_made = 0;

        for attempt_number in 1..=retry_limit {
            attempts_made = attempt_number;
            let request = self.build_request(subscription, event);

            match self.client.deliver(&request).await {
                Ok(response) => {
                    info!(
                        webhook_id = %subscription.id,
                        event_id = %event.event_id,
                        event_type = %event.envelope.event_type,
                        attempt = attempt_number,
                        status_code = response.status,
                        response_time_ms = response.response_time_ms,
                        "Webhook delivered successfully"
                    );
                    let record = DeliveryAttempt::delivered(
                        event.event_id,
                        subscription.id.clone(),
                        event.envelope.event_type.clone(),
                        event.envelope.data.clone(),
                        attempt_number,
                        response.status,
                        response.body,
                    )
                    .truncate_body(self.response_body_limit);
                    self.record(record.clone()).await;
                    return record;
                }
                Err(e) => {
                    warn!(
                        webhook_id = %subscription.id,
                        event_id = %event.event_id,
                        attempt = attempt_number,
                        max_attempts = retry_limit,
                        error = %e,
                        "Webhook delivery attempt failed"
                    );
                    let failed = self.failed_record(subscription, event, attempt_number, &e);
                    last_error = failed.error.clone().unwrap_or_default();
                    self.record(failed).await;

                    if e.is_authentication_failure() {
                        warn!(
                            webhook_id = %subscription.id,
                            "Destination rejected our signature, not retrying"
                        );
                        break;
                    }
                }
            }

            if attempt_number < retry_limit {
                tokio::time::sleep(self.retry_strategy.delay_after(attempt_number - 1)).await;
            }
        }

        error!(
            webhook_id = %subscription.id,
            event_id = %event.event_id,
            event_type = %event.envelope.event_type,
            attempts = attempts_made,
            error = %last_error,
            "Webhook delivery permanently failed"
        );
        let record = DeliveryAttempt::exhausted(
            event.event_id,
            subscription.id.clone(),
            event.envelope.event_type.clone(),
            event.envelope.data.clone(),
            attempts_made,
            format!("Failed after {attempts_made} attempt(s): {last_error}"),
        )
        .truncate_body(self.response_body_limit);
        self.record(record.clone()).await;
        record
    }

    /// Sign the shared body for this subscription at the current time
    fn build_request(&self, subscription: &WebhookSubscription, event: &PreparedEvent) -> DeliveryRequest {
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let signature = HmacSigner::new(subscription.secret.as_str()).sign(timestamp, &event.body);

        let mut headers: Vec<(String, String)> = subscription
            .custom_headers
            .iter()
            .filter(|(k, v)| is_forwardable_header(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.push((SIGNATURE_HEADER.to_string(), signature));
        headers.push((TIMESTAMP_HEADER.to_string(), timestamp.to_string()));

        DeliveryRequest {
            url: subscription.target_url.clone(),
            headers,
            body: event.body.clone(),
            timeout: Duration::from_secs(subscription.timeout_seconds.max(1)),
        }
    }

    fn failed_record(
        &self,
        subscription: &WebhookSubscription,
        event: &PreparedEvent,
        attempt_number: u32,
        err: &HttpClientError,
    ) -> DeliveryAttempt {
        let mut record = DeliveryAttempt::failed(
            event.event_id,
            subscription.id.clone(),
            event.envelope.event_type.clone(),
            event.envelope.data.clone(),
            attempt_number,
            err.status(),
            attempt_error(err),
        );
        if let HttpClientError::ResponseError { body, .. } = err {
            record.response_body = Some(body.clone());
        }
        record.truncate_body(self.response_body_limit)
    }

    async fn record(&self, attempt: DeliveryAttempt) {
        if let Err(e) = self.log.append(attempt).await {
            error!(error = %e, "Failed to append delivery attempt to log");
        }
    }
}

/// Error text for the log; the response body is stored separately
fn attempt_error(err: &HttpClientError) -> String {
    match err {
        HttpClientError::ResponseError { status, .. } => {
            format!("Destination answered with status {status}")
        }
        other => other.to_string(),
    }
}
