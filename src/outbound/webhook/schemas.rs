use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Response status recorded when a delivery is given up on
pub const UNDELIVERABLE_STATUS: u16 = 0;

/// One append-only delivery log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAttempt {
    pub id: Uuid,

    /// Originating event instance (one per dispatch call)
    pub event_id: Uuid,

    pub webhook_id: String,

    pub event_type: String,

    pub payload: Value,

    pub attempt_number: u32,

    pub outcome: AttemptOutcome,

    pub response_status: Option<u16>,

    /// Truncated response body
    pub response_body: Option<String>,

    pub error: Option<String>,

    #[serde(with = "time::serde::rfc3339::option")]
    pub delivered_at: Option<OffsetDateTime>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl DeliveryAttempt {
    fn new(
        event_id: Uuid,
        webhook_id: String,
        event_type: String,
        payload: Value,
        attempt_number: u32,
        outcome: AttemptOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            webhook_id,
            event_type,
            payload,
            attempt_number,
            outcome,
            response_status: None,
            response_body: None,
            error: None,
            delivered_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Terminal record for a successful attempt
    pub fn delivered(
        event_id: Uuid,
        webhook_id: String,
        event_type: String,
        payload: Value,
        attempt_number: u32,
        status: u16,
        body: String,
    ) -> Self {
        let mut attempt = Self::new(
            event_id,
            webhook_id,
            event_type,
            payload,
            attempt_number,
            AttemptOutcome::Delivered,
        );
        attempt.response_status = Some(status);
        attempt.response_body = Some(body);
        attempt.delivered_at = Some(attempt.created_at);
        attempt
    }

    /// Intermediate record for a failed attempt
    pub fn failed(
        event_id: Uuid,
        webhook_id: String,
        event_type: String,
        payload: Value,
        attempt_number: u32,
        status: Option<u16>,
        error: String,
    ) -> Self {
        let mut attempt = Self::new(
            event_id,
            webhook_id,
            event_type,
            payload,
            attempt_number,
            AttemptOutcome::Failed,
        );
        attempt.response_status = status;
        attempt.error = Some(error);
        attempt
    }

    /// Terminal record once a delivery sequence is given up on
    pub fn exhausted(
        event_id: Uuid,
        webhook_id: String,
        event_type: String,
        payload: Value,
        attempts_made: u32,
        error: String,
    ) -> Self {
        let mut attempt = Self::new(
            event_id,
            webhook_id,
            event_type,
            payload,
            attempts_made,
            AttemptOutcome::Exhausted,
        );
        attempt.response_status = Some(UNDELIVERABLE_STATUS);
        attempt.error = Some(error);
        attempt
    }

    /// Cap the stored response body and error text at `limit` bytes on a char boundary
    pub fn truncate_body(mut self, limit: usize) -> Self {
        for text in [self.response_body.as_mut(), self.error.as_mut()]
            .into_iter()
            .flatten()
        {
            truncate_at_char_boundary(text, limit);
        }
        self
    }

    pub fn is_delivered(&self) -> bool {
        self.outcome == AttemptOutcome::Delivered
    }
}

fn truncate_at_char_boundary(text: &mut String, limit: usize) {
    if text.len() > limit {
        let mut end = limit;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}

/// What a log entry records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Attempt failed, another may follow
    Failed,

    Delivered,

    /// Retries used up (or destination refused our credentials)
    Exhausted,
}

impl AttemptOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptOutcome::Delivered | AttemptOutcome::Exhausted)
    }
}
