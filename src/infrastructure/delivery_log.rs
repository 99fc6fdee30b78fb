use crate::domain::ports::{DeliveryLog, DeliveryLogError};
use crate::outbound::webhook::schemas::DeliveryAttempt;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// In-memory delivery history, bounded per webhook
#[derive(Debug, Clone)]
pub struct InMemoryDeliveryLog {
    history: Arc<RwLock<HashMap<String, VecDeque<DeliveryAttempt>>>>,

    /// Maximum entries kept per webhook; oldest are evicted first
    max_history_per_webhook: usize,
}

impl InMemoryDeliveryLog {
    pub fn new() -> Self {
        Self::with_history_limit(1000)
    }

    pub fn with_history_limit(max_history_per_webhook: usize) -> Self {
        Self {
            history: Arc::new(RwLock::new(HashMap::new())),
            max_history_per_webhook: max_history_per_webhook.max(1),
        }
    }
}

impl Default for InMemoryDeliveryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryLog for InMemoryDeliveryLog {
    async fn append(&self, attempt: DeliveryAttempt) -> Result<(), DeliveryLogError> {
        let mut history = self.history.write().await;
        let entries = history.entry(attempt.webhook_id.clone()).or_default();
        entries.push_back(attempt);

        while entries.len() > self.max_history_per_webhook {
            entries.pop_front();
        }
        Ok(())
    }

    async fn history(&self, webhook_id: &str) -> Result<Vec<DeliveryAttempt>, DeliveryLogError> {
        let history = self.history.read().await;
        Ok(history
            .get(webhook_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn forget(&self, webhook_id: &str) -> Result<(), DeliveryLogError> {
        if self.history.write().await.remove(webhook_id).is_some() {
            debug!(webhook_id = %webhook_id, "Dropped delivery history");
        }
        Ok(())
    }
}

/// Append-only JSON-lines file; survives process restarts
#[derive(Debug)]
pub struct JsonlDeliveryLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDeliveryLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DeliveryLogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        // touch so readers never race a missing file
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!(path = %path.display(), "Opened delivery log");
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl DeliveryLog for JsonlDeliveryLog {
    async fn append(&self, attempt: DeliveryAttempt) -> Result<(), DeliveryLogError> {
        let mut line = serde_json::to_vec(&attempt)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    async fn history(&self, webhook_id: &str) -> Result<Vec<DeliveryAttempt>, DeliveryLogError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let mut attempts = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<DeliveryAttempt>(line) {
                Ok(attempt) if attempt.webhook_id == webhook_id => attempts.push(attempt),
                Ok(_) => {}
                Err(e) => {
                    // a torn final line from a crash mid-write
                    warn!(path = %self.path.display(), line = index + 1, error = %e, "Skipping unreadable delivery log line");
                }
            }
        }
        Ok(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn delivered(webhook_id: &str) -> DeliveryAttempt {
        DeliveryAttempt::delivered(
            Uuid::new_v4(),
            webhook_id.to_string(),
            "ticket.created".to_string(),
            json!({"ticketId": 7}),
            1,
            200,
            "ok".to_string(),
        )
    }

    fn failed(webhook_id: &str) -> DeliveryAttempt {
        DeliveryAttempt::failed(
            Uuid::new_v4(),
            webhook_id.to_string(),
            "ticket.created".to_string(),
            json!({}),
            1,
            Some(500),
            "boom".to_string(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_history_per_webhook() -> Result<(), DeliveryLogError> {
        let log = InMemoryDeliveryLog::new();
        log.append(failed("sub-1")).await?;
        log.append(delivered("sub-1")).await?;
        log.append(delivered("sub-2")).await?;

        assert_eq!(log.history("sub-1").await?.len(), 2);
        assert_eq!(log.terminal_outcomes("sub-1").await?.len(), 1);
        assert_eq!(log.history("sub-3").await?.len(), 0);
        assert_eq!(log.history("sub-2").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_forget_drops_one_webhook() -> Result<(), DeliveryLogError> {
        let log = InMemoryDeliveryLog::new();
        log.append(failed("sub-1")).await?;
        log.append(delivered("sub-2")).await?;

        log.forget("sub-1").await?;
        log.forget("never-seen").await?;

        assert!(log.history("sub-1").await?.is_empty());
        assert_eq!(log.history("sub-2").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_in_memory_history_limit_evicts_oldest() -> Result<(), DeliveryLogError> {
        let log = InMemoryDeliveryLog::with_history_limit(2);
        log.append(failed("sub-1")).await?;
        log.append(failed("sub-1")).await?;
        log.append(delivered("sub-1")).await?;

        let history = log.history("sub-1").await?;
        assert_eq!(history.len(), 2);
        assert!(history[1].is_delivered());
        Ok(())
    }

    #[tokio::test]
    async fn test_jsonl_log_survives_reopen() -> Result<(), DeliveryLogError> {
        let path = std::env::temp_dir()
            .join(format!("xtsystems-bridge-{}", Uuid::new_v4()))
            .join("deliveries.jsonl");

        let log = JsonlDeliveryLog::open(&path).await?;
        log.append(failed("sub-1")).await?;
        log.append(delivered("sub-1")).await?;
        log.append(delivered("sub-2")).await?;
        drop(log);

        let reopened = JsonlDeliveryLog::open(&path).await?;
        let history = reopened.history("sub-1").await?;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].payload, json!({"ticketId": 7}));
        assert_eq!(reopened.terminal_outcomes("sub-1").await?.len(), 1);

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_jsonl_log_skips_torn_lines() -> Result<(), DeliveryLogError> {
        let path = std::env::temp_dir().join(format!("xtsystems-bridge-{}.jsonl", Uuid::new_v4()));
        let log = JsonlDeliveryLog::open(&path).await?;
        log.append(delivered("sub-1")).await?;
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await?
            .write_all(b"{\"id\":")
            .await?;

        assert_eq!(log.history("sub-1").await?.len(), 1);
        let _ = tokio::fs::remove_file(&path).await;
        Ok(())
    }
}
