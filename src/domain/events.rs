use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Header carrying the `sha256=<hex>` signature of a delivery
/// (`X-XTSystems-Signature`; header names are case-insensitive).
pub const SIGNATURE_HEADER: &str = "x-xtsystems-signature";

/// Header carrying the Unix timestamp (seconds) that was signed.
pub const TIMESTAMP_HEADER: &str = "x-xtsystems-timestamp";

/// User agent sent with every outbound delivery.
pub const USER_AGENT: &str = "XTSystems/1.0";

/// Event types emitted by XTSystems.
pub mod event_types {
    pub const TICKET_CREATED: &str = "ticket.created";
    pub const TICKET_UPDATED: &str = "ticket.updated";
    pub const TICKET_ASSIGNED: &str = "ticket.assigned";
    pub const TICKET_CLOSED: &str = "ticket.closed";
    pub const TICKET_COMMENT_ADDED: &str = "ticket.comment_added";
    pub const WEBHOOK_TEST: &str = "webhook.test";
}

/// Signed event payload exchanged over the webhook wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_type: String,

    pub data: Value,

    /// Originating tenant (company) identifier
    pub source_id: String,

    /// Unix seconds at send time
    pub timestamp: i64,
}

impl EventEnvelope {
    /// Build an envelope stamped with the current time
    pub fn new(event_type: impl Into<String>, data: Value, source_id: impl Into<String>) -> Self {
        Self::with_timestamp(
            event_type,
            data,
            source_id,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
    }

    pub fn with_timestamp(
        event_type: impl Into<String>,
        data: Value,
        source_id: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            source_id: source_id.into(),
            timestamp,
        }
    }

    /// Serialize to the canonical JSON byte sequence that is signed and sent
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
