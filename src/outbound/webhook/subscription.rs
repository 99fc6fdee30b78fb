use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;

use crate::domain::events::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Registered destination for a subset of event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookSubscription {
    pub id: String,

    /// Owning tenant (XTSystems company id)
    pub tenant_id: String,

    pub name: Option<String>,

    pub target_url: String,

    pub subscribed_events: BTreeSet<String>,

    #[serde(skip_serializing, default)]
    pub secret: String,

    pub active: bool,

    pub retry_limit: u32,

    pub timeout_seconds: u64,

    pub custom_headers: HashMap<String, String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl WebhookSubscription {
    /// Check if this subscription should receive a given event type
    pub fn matches_event(&self, event_type: &str) -> bool {
        self.active && self.subscribed_events.contains(event_type)
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, update: SubscriptionUpdate) {
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(target_url) = update.target_url {
            self.target_url = target_url;
        }
        if let Some(events) = update.subscribed_events {
            self.subscribed_events = events.into_iter().collect();
        }
        if let Some(secret) = update.secret {
            self.secret = secret;
        }
        if let Some(active) = update.active {
            self.active = active;
        }
        if let Some(retry_limit) = update.retry_limit {
            self.retry_limit = retry_limit;
        }
        if let Some(timeout_seconds) = update.timeout_seconds {
            self.timeout_seconds = timeout_seconds;
        }
        if let Some(headers) = update.custom_headers {
            self.custom_headers = headers;
        }
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Check the invariants every stored subscription must hold
    pub fn validate(&self) -> Result<(), String> {
        validate_target_url(&self.target_url)?;
        if self.subscribed_events.is_empty() {
            return Err("subscribed_events must not be empty".to_string());
        }
        if self.subscribed_events.iter().any(|e| e.trim().is_empty()) {
            return Err("subscribed_events must not contain blank event types".to_string());
        }
        if self.retry_limit == 0 {
            return Err("retry_limit must be at least 1".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("timeout_seconds must be at least 1".to_string());
        }
        if self.secret.is_empty() {
            return Err("secret must not be empty".to_string());
        }
        for (name, value) in &self.custom_headers {
            validate_custom_header(name, value)?;
        }
        Ok(())
    }
}

/// Headers the delivery protocol sets itself; custom headers may not override them
pub fn is_reserved_header(name: &str) -> bool {
    [
        CONTENT_TYPE.as_str(),
        USER_AGENT.as_str(),
        SIGNATURE_HEADER,
        TIMESTAMP_HEADER,
    ]
    .iter()
    .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Whether a stored custom header can be sent as-is alongside the protocol headers
pub fn is_forwardable_header(name: &str, value: &str) -> bool {
    validate_custom_header(name, value).is_ok()
}

fn validate_custom_header(name: &str, value: &str) -> Result<(), String> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| format!("custom header `{name}` is not a valid header name"))?;
    HeaderValue::from_str(value)
        .map_err(|_| format!("custom header `{name}` has an invalid value"))?;
    if is_reserved_header(name) {
        return Err(format!("custom header `{name}` is reserved"));
    }
    Ok(())
}

fn validate_target_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| format!("target_url is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        "http" | "https" => Err("target_url has no host".to_string()),
        other => Err(format!("target_url scheme `{other}` is not http(s)")),
    }
}

/// Input to a registration call
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NewSubscription {
    #[serde(default)]
    pub name: Option<String>,

    pub target_url: String,

    pub subscribed_events: Vec<String>,

    /// Generated when absent
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub custom_headers: HashMap<String, String>,
}

fn default_active() -> bool {
    true
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl NewSubscription {
    pub fn new(target_url: impl Into<String>, subscribed_events: Vec<String>) -> Self {
        Self {
            name: None,
            target_url: target_url.into(),
            subscribed_events,
            secret: None,
            active: true,
            retry_limit: DEFAULT_RETRY_LIMIT,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            custom_headers: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.insert(name.into(), value.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Partial field replace; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub name: Option<String>,
    pub target_url: Option<String>,
    pub subscribed_events: Option<Vec<String>>,
    pub secret: Option<String>,
    pub active: Option<bool>,
    pub retry_limit: Option<u32>,
    pub timeout_seconds: Option<u64>,
    pub custom_headers: Option<HashMap<String, String>>,
}
