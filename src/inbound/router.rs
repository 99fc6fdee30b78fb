use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::domain::events::EventEnvelope;
use crate::domain::ports::{ChannelNotifier, EventHandler, RoutingError};
use crate::inbound::channel_map::ChannelMap;

/// Result of routing one verified envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A handler rendered the event; counts per destination channel
    Routed {
        handler: &'static str,
        notified: usize,
        failed: usize,
    },

    /// No handler registered for this event type
    Unhandled,
}

/// Routes verified envelopes to their handler and on to destination channels
pub struct EventRouter {
    handlers: HashMap<&'static str, Arc<dyn EventHandler>>,
    channels: Arc<ChannelMap>,
    notifier: Arc<dyn ChannelNotifier>,
}

impl EventRouter {
    pub fn new(channels: Arc<ChannelMap>, notifier: Arc<dyn ChannelNotifier>) -> Self {
        Self {
            handlers: HashMap::new(),
            channels,
            notifier,
        }
    }

    /// Register a handler for every event type it declares
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        for event_type in handler.event_types() {
            if let Some(previous) = self.handlers.insert(event_type, handler.clone()) {
                warn!(
                    event_type = %event_type,
                    replaced = previous.name(),
                    handler = handler.name(),
                    "Replacing registered event handler"
                );
            }
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Render the envelope and notify every mapped channel.
    ///
    /// Channel failures are logged and counted; only a render failure is an error.
    pub async fn route(&self, envelope: &EventEnvelope) -> Result<RouteOutcome, RoutingError> {
        let Some(handler) = self.handlers.get(envelope.event_type.as_str()) else {
            info!(
                event_type = %envelope.event_type,
                source_id = %envelope.source_id,
                "Unhandled event type, acknowledging"
            );
            return Ok(RouteOutcome::Unhandled);
        };

        let notification = handler.render(envelope)?;
        let channels = self.channels.resolve(&envelope.event_type);
        if channels.is_empty() {
            warn!(event_type = %envelope.event_type, "No destination channels configured");
        }

        let results = join_all(
            channels
                .iter()
                .map(|channel_id| self.notifier.notify(channel_id, &notification)),
        )
        .await;

        let mut failed = 0;
        for (channel_id, result) in channels.iter().zip(results) {
            if let Err(e) = result {
                failed += 1;
                error!(
                    event_type = %envelope.event_type,
                    channel_id = %channel_id,
                    error = %e,
                    "Failed to notify channel"
                );
            }
        }

        info!(
            event_type = %envelope.event_type,
            handler = handler.name(),
            channels = channels.len(),
            failed = failed,
            "Event routed"
        );
        Ok(RouteOutcome::Routed {
            handler: handler.name(),
            notified: channels.len() - failed,
            failed,
        })
    }
}
