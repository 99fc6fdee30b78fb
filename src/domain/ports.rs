/*
   This module specifies the API by which external collaborators (chat
   destinations, delivery history storage) plug into the bridge.
*/

use crate::domain::events::EventEnvelope;
use crate::outbound::webhook::schemas::DeliveryAttempt;
use async_trait::async_trait;

/// Error raised while turning an envelope into a notification
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("Malformed `{event_type}` payload: {reason}")]
    MalformedPayload { event_type: String, reason: String },
}

/// Error raised by a chat destination
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Destination {channel_id} rejected notification: status={status}")]
    Rejected { channel_id: String, status: u16 },

    #[error("Failed to reach destination {channel_id}: {reason}")]
    Unreachable { channel_id: String, reason: String },
}

/// Error raised by a delivery log backend
#[derive(Debug, thiserror::Error)]
pub enum DeliveryLogError {
    #[error("Delivery log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A rendered, destination-agnostic message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub lines: Vec<String>,
    pub url: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
            url: None,
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Plain-text rendering used by chat destinations
    pub fn to_text(&self) -> String {
        let mut text = format!("**{}**", self.title);
        for line in &self.lines {
            text.push('\n');
            text.push_str(line);
        }
        if let Some(url) = &self.url {
            text.push('\n');
            text.push_str(url);
        }
        text
    }
}

/// Trait for rendering inbound events of known types
pub trait EventHandler: Send + Sync {
    fn event_types(&self) -> Vec<&'static str>;

    fn render(&self, envelope: &EventEnvelope) -> Result<Notification, RoutingError>;

    fn name(&self) -> &'static str {
        "UnnamedHandler"
    }
}

/// Trait for a destination that can receive notifications by channel id
#[async_trait]
pub trait ChannelNotifier: Send + Sync {
    async fn notify(&self, channel_id: &str, notification: &Notification)
    -> Result<(), NotifyError>;
}

/// Append-only record of delivery attempts
#[async_trait]
pub trait DeliveryLog: Send + Sync {
    async fn append(&self, attempt: DeliveryAttempt) -> Result<(), DeliveryLogError>;

    async fn history(&self, webhook_id: &str) -> Result<Vec<DeliveryAttempt>, DeliveryLogError>;

    /// Delivered-or-exhausted records for one webhook
    async fn terminal_outcomes(
        &self,
        webhook_id: &str,
    ) -> Result<Vec<DeliveryAttempt>, DeliveryLogError> {
        Ok(self
            .history(webhook_id)
            .await?
            .into_iter()
            .filter(|attempt| attempt.outcome.is_terminal())
            .collect())
    }

    /// Release history kept for a deleted webhook. Durable logs keep their records.
    async fn forget(&self, _webhook_id: &str) -> Result<(), DeliveryLogError> {
        Ok(())
    }
}
