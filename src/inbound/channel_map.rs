use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::ChannelsConfig;

#[derive(Debug, thiserror::Error)]
pub enum ChannelMapError {
    #[error("Invalid channel mapping JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Shape of the `mapping_json` override
#[derive(Debug, Default, Deserialize)]
struct MappingOverride {
    #[serde(default)]
    default: Option<Vec<String>>,

    #[serde(default)]
    events: HashMap<String, Vec<String>>,
}

/// Event type to destination channel table, resolved once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    routes: HashMap<String, Vec<String>>,
    default: Vec<String>,
}

impl ChannelMap {
    pub fn new(default: Vec<String>) -> Self {
        Self {
            routes: HashMap::new(),
            default,
        }
    }

    pub fn with_route(mut self, event_type: impl Into<String>, channels: Vec<String>) -> Self {
        self.routes.insert(event_type.into(), channels);
        self
    }

    /// Build from configuration; `mapping_json` entries win over structured ones
    pub fn from_config(config: &ChannelsConfig) -> Result<Self, ChannelMapError> {
        let mut map = Self {
            routes: config.events.clone(),
            default: config.default.clone(),
        };

        if let Some(raw) = config.mapping_json.as_deref().filter(|s| !s.trim().is_empty()) {
            let overrides: MappingOverride = serde_json::from_str(raw)?;
            if let Some(default) = overrides.default {
                map.default = default;
            }
            map.routes.extend(overrides.events);
        }

        debug!(
            routes = map.routes.len(),
            default_channels = map.default.len(),
            "Resolved channel map"
        );
        Ok(map)
    }

    /// Channels for an event type, falling back to the default set
    pub fn resolve(&self, event_type: &str) -> &[String] {
        match self.routes.get(event_type) {
            Some(channels) if !channels.is_empty() => channels,
            _ => &self.default,
        }
    }

    pub fn default_channels(&self) -> &[String] {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let map = ChannelMap::new(channels(&["general"]))
            .with_route("ticket.created", channels(&["support", "triage"]));

        assert_eq!(map.resolve("ticket.created"), channels(&["support", "triage"]));
        assert_eq!(map.resolve("ticket.closed"), channels(&["general"]));
    }

    #[test]
    fn test_empty_route_uses_default() {
        let map = ChannelMap::new(channels(&["general"])).with_route("ticket.closed", vec![]);
        assert_eq!(map.resolve("ticket.closed"), channels(&["general"]));
    }

    #[test]
    fn test_mapping_json_overrides_structured_config() -> Result<(), ChannelMapError> {
        let config = ChannelsConfig {
            default: channels(&["general"]),
            events: HashMap::from([
                ("ticket.created".to_string(), channels(&["support"])),
                ("ticket.closed".to_string(), channels(&["archive"])),
            ]),
            mapping_json: Some(
                r#"{"default": ["alerts"], "events": {"ticket.created": ["triage"]}}"#.to_string(),
            ),
        };

        let map = ChannelMap::from_config(&config)?;
        assert_eq!(map.default_channels(), channels(&["alerts"]));
        assert_eq!(map.resolve("ticket.created"), channels(&["triage"]));
        assert_eq!(map.resolve("ticket.closed"), channels(&["archive"]));
        Ok(())
    }

    #[test]
    fn test_mapping_json_without_default_keeps_configured_default() -> Result<(), ChannelMapError> {
        let config = ChannelsConfig {
            default: channels(&["general"]),
            events: HashMap::new(),
            mapping_json: Some(r#"{"events": {"ticket.updated": ["updates"]}}"#.to_string()),
        };

        let map = ChannelMap::from_config(&config)?;
        assert_eq!(map.resolve("ticket.assigned"), channels(&["general"]));
        assert_eq!(map.resolve("ticket.updated"), channels(&["updates"]));
        Ok(())
    }

    #[test]
    fn test_malformed_mapping_json_is_an_error() {
        let config = ChannelsConfig {
            default: vec![],
            events: HashMap::new(),
            mapping_json: Some("{not json".to_string()),
        };

        assert!(matches!(
            ChannelMap::from_config(&config),
            Err(ChannelMapError::InvalidJson(_))
        ));
    }
}
