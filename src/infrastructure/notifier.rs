use crate::domain::ports::{ChannelNotifier, Notification, NotifyError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

/// Discord caps message content at 2000 characters
const MAX_CONTENT_CHARS: usize = 2000;

/// Posts notifications to Discord channels through the bot REST API
#[derive(Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
}

impl DiscordNotifier {
    pub fn new(api_base: impl Into<String>, bot_token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        })
    }

    fn content(notification: &Notification) -> String {
        let text = notification.to_text();
        if text.chars().count() <= MAX_CONTENT_CHARS {
            return text;
        }
        let mut truncated: String = text.chars().take(MAX_CONTENT_CHARS - 1).collect();
        truncated.push('…');
        truncated
    }
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordNotifier")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelNotifier for DiscordNotifier {
    async fn notify(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.bot_token))
            .json(&json!({ "content": Self::content(notification) }))
            .send()
            .await
            .map_err(|e| NotifyError::Unreachable {
                channel_id: channel_id.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                channel_id: channel_id.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(channel_id = %channel_id, "Posted Discord message");
        Ok(())
    }
}

/// Writes notifications to the log; used when no bot token is configured
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl ChannelNotifier for LoggingNotifier {
    async fn notify(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        info!(
            channel_id = %channel_id,
            title = %notification.title,
            lines = notification.lines.len(),
            "Notification (no Discord bot token configured)"
        );
        Ok(())
    }
}
