use crate::domain::events::{EventEnvelope, event_types};
use crate::domain::ports::{EventHandler, Notification, RoutingError};

/// Acknowledges `webhook.test` pings sent from the XTSystems dashboard
#[derive(Debug, Default)]
pub struct TestEventHandler;

impl EventHandler for TestEventHandler {
    fn event_types(&self) -> Vec<&'static str> {
        vec![event_types::WEBHOOK_TEST]
    }

    fn render(&self, envelope: &EventEnvelope) -> Result<Notification, RoutingError> {
        let mut notification = Notification::new("Webhook test received")
            .line(format!("Source: {}", envelope.source_id));
        if let Some(message) = envelope.data.get("message").and_then(|m| m.as_str()) {
            notification = notification.line(message);
        }
        Ok(notification)
    }

    fn name(&self) -> &'static str {
        "TestEventHandler"
    }
}
