use crate::domain::events::{EventEnvelope, event_types};
use crate::outbound::webhook::delivery_service::{DeliveryService, PreparedEvent};
use crate::outbound::webhook::registry::{RegistryError, WebhookRegistry};
use crate::outbound::webhook::schemas::DeliveryAttempt;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// Resolves subscribers for an event and fans delivery out to them.
#[derive(Clone)]
pub struct EventDispatcher {
    registry: WebhookRegistry,
    delivery: Arc<DeliveryService>,
}

/// Handle on one dispatch wave.
///
/// Dropping it leaves deliveries running in the background; awaiting
/// [`DispatchHandle::wait`] yields every recipient's terminal record.
#[derive(Debug)]
pub struct DispatchHandle {
    task: Option<JoinHandle<Vec<DeliveryAttempt>>>,
}

impl DispatchHandle {
    fn empty() -> Self {
        Self { task: None }
    }

    pub async fn wait(self) -> Vec<DeliveryAttempt> {
        let Some(task) = self.task else {
            return Vec::new();
        };
        match task.await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Dispatch task failed");
                Vec::new()
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to serialize event envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventDispatcher {
    pub fn new(registry: WebhookRegistry, delivery: Arc<DeliveryService>) -> Self {
        Self { registry, delivery }
    }

    pub fn registry(&self) -> &WebhookRegistry {
        &self.registry
    }

    /// Emit an event to every matching active subscription of a tenant.
    ///
    /// Returns once deliveries are scheduled; failures are logged, never
    /// returned to the emitting operation.
    pub async fn dispatch(&self, event_type: &str, data: Value, tenant_id: &str) -> DispatchHandle {
        let subscriptions = self.registry.find(event_type, tenant_id).await;
        if subscriptions.is_empty() {
            debug!(event_type = %event_type, tenant_id = %tenant_id, "No subscribers for event");
            return DispatchHandle::empty();
        }

        let event = match PreparedEvent::new(EventEnvelope::new(event_type, data, tenant_id)) {
            Ok(event) => Arc::new(event),
            Err(e) => {
                error!(event_type = %event_type, error = %e, "Failed to serialize event envelope, dropping");
                return DispatchHandle::empty();
            }
        };

        info!(
            event_id = %event.event_id,
            event_type = %event_type,
            tenant_id = %tenant_id,
            recipients = subscriptions.len(),
            "Dispatching event"
        );

        let delivery = self.delivery.clone();
        let task = tokio::spawn(async move {
            let mut branches = JoinSet::new();
            for subscription in subscriptions {
                let delivery = delivery.clone();
                let event = event.clone();
                branches.spawn(async move { delivery.send_with_retry(&subscription, &event).await });
            }

            let mut records = Vec::with_capacity(branches.len());
            while let Some(joined) = branches.join_next().await {
                match joined {
                    Ok(record) => records.push(record),
                    Err(e) => error!(error = %e, "Delivery branch panicked"),
                }
            }

            let delivered = records.iter().filter(|r| r.is_delivered()).count();
            info!(
                event_id = %event.event_id,
                delivered = delivered,
                exhausted = records.len() - delivered,
                "Dispatch complete"
            );
            records
        });

        DispatchHandle { task: Some(task) }
    }

    /// Send a synthetic test event to one subscription and wait for the outcome.
    ///
    /// Runs even when the subscription is inactive.
    pub async fn test_delivery(&self, id: &str, tenant_id: &str) -> Result<DeliveryAttempt, DispatchError> {
        let subscription = self.registry.get(id, tenant_id).await?;
        let envelope = EventEnvelope::new(
            event_types::WEBHOOK_TEST,
            json!({
                "webhookId": subscription.id,
                "message": "Test delivery from XTSystems",
            }),
            tenant_id,
        );
        let event = PreparedEvent::new(envelope)?;

        info!(webhook_id = %id, tenant_id = %tenant_id, "Sending test delivery");
        Ok(self.delivery.send_with_retry(&subscription, &event).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::DeliveryLog;
    use crate::infrastructure::delivery_log::InMemoryDeliveryLog;
    use crate::outbound::webhook::http_client::{
        DeliveryClient, DeliveryRequest, DeliveryResponse, HttpClientError,
    };
    use crate::outbound::webhook::schemas::AttemptOutcome;
    use crate::outbound::webhook::subscription::NewSubscription;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fake transport routing by URL: hosts containing "fail" always answer 500
    #[derive(Default)]
    struct RoutingClient {
        calls: Mutex<HashMap<String, Vec<Instant>>>,
    }

    #[async_trait]
    impl DeliveryClient for RoutingClient {
        async fn send(&self, request: &DeliveryRequest) -> Result<DeliveryResponse, HttpClientError> {
            self.calls
                .lock()
                .unwrap()
                .entry(request.url.clone())
                .or_default()
                .push(Instant::now());
            let status = if request.url.contains("fail") { 500 } else { 200 };
            Ok(DeliveryResponse {
                status,
                body: String::new(),
                response_time_ms: 1,
            })
        }
    }

    struct Fixture {
        dispatcher: EventDispatcher,
        client: Arc<RoutingClient>,
        log: Arc<InMemoryDeliveryLog>,
    }

    fn fixture() -> Fixture {
        let client = Arc::new(RoutingClient::default());
        let log = Arc::new(InMemoryDeliveryLog::new());
        let delivery = Arc::new(DeliveryService::new(client.clone(), log.clone()));
        Fixture {
            dispatcher: EventDispatcher::new(WebhookRegistry::new(), delivery),
            client,
            log,
        }
    }

    fn input(url: &str) -> NewSubscription {
        NewSubscription::new(url, vec!["ticket.created".to_string()])
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_subscribers_is_a_noop() {
        let fx = fixture();
        let records = fx
            .dispatcher
            .dispatch("ticket.created", json!({}), "company-1")
            .await
            .wait()
            .await;

        assert!(records.is_empty());
        assert!(fx.client.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_isolates_failing_recipients() {
        let fx = fixture();
        let registry = fx.dispatcher.registry();
        let mut ok_ids = Vec::new();
        let mut failing_ids = Vec::new();
        for i in 0..3 {
            let sub = registry
                .create("company-1", input(&format!("https://ok-{i}.example.com/hook")))
                .await
                .unwrap();
            ok_ids.push(sub.id);
        }
        for i in 0..2 {
            let sub = registry
                .create("company-1", input(&format!("https://fail-{i}.example.com/hook")))
                .await
                .unwrap();
            failing_ids.push(sub.id);
        }

        let started = Instant::now();
        let records = fx
            .dispatcher
            .dispatch("ticket.created", json!({"ticketId": 1}), "company-1")
            .await
            .wait()
            .await;

        assert_eq!(records.len(), 5);
        assert_eq!(records.iter().filter(|r| r.is_delivered()).count(), 3);
        assert_eq!(
            records
                .iter()
                .filter(|r| r.outcome == AttemptOutcome::Exhausted)
                .count(),
            2
        );

        for id in &ok_ids {
            let terminal = fx.log.terminal_outcomes(id).await.unwrap();
            assert_eq!(terminal.len(), 1);
            assert!(terminal[0].is_delivered());
        }
        for id in &failing_ids {
            let terminal = fx.log.terminal_outcomes(id).await.unwrap();
            assert_eq!(terminal.len(), 1);
            assert_eq!(terminal[0].outcome, AttemptOutcome::Exhausted);
            assert_eq!(fx.log.history(id).await.unwrap().len(), 4);
        }

        // successful recipients were not held back by the failing ones' backoff
        let calls = fx.client.calls.lock().unwrap();
        for (url, times) in calls.iter() {
            if url.contains("ok-") {
                assert_eq!(times.len(), 1);
                assert_eq!(times[0], started);
            } else {
                assert_eq!(times.len(), 3);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recipients_share_one_envelope() {
        let fx = fixture();
        let registry = fx.dispatcher.registry();
        registry
            .create("company-1", input("https://a.example.com/hook"))
            .await
            .unwrap();
        registry
            .create("company-1", input("https://b.example.com/hook"))
            .await
            .unwrap();

        let records = fx
            .dispatcher
            .dispatch("ticket.created", json!({"ticketId": 9}), "company-1")
            .await
            .wait()
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_id, records[1].event_id);
        assert!(records.iter().all(|r| r.payload == json!({"ticketId": 9})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_still_delivers() {
        let fx = fixture();
        let sub = fx
            .dispatcher
            .registry()
            .create("company-1", input("https://a.example.com/hook"))
            .await
            .unwrap();

        drop(
            fx.dispatcher
                .dispatch("ticket.created", json!({}), "company-1")
                .await,
        );

        for _ in 0..100 {
            if !fx.log.terminal_outcomes(&sub.id).await.unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("fire-and-forget delivery never completed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_delivery_targets_one_subscription_even_if_inactive() {
        let fx = fixture();
        let registry = fx.dispatcher.registry();
        let target = registry
            .create("company-1", input("https://a.example.com/hook").inactive())
            .await
            .unwrap();
        registry
            .create("company-1", input("https://b.example.com/hook"))
            .await
            .unwrap();

        let record = fx
            .dispatcher
            .test_delivery(&target.id, "company-1")
            .await
            .unwrap();

        assert!(record.is_delivered());
        assert_eq!(record.event_type, event_types::WEBHOOK_TEST);
        let calls = fx.client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls.contains_key("https://a.example.com/hook"));
    }

    #[tokio::test]
    async fn test_test_delivery_unknown_webhook() {
        let fx = fixture();
        let result = fx.dispatcher.test_delivery("missing", "company-1").await;

        assert!(matches!(
            result,
            Err(DispatchError::Registry(RegistryError::NotFound { .. }))
        ));
    }
}
