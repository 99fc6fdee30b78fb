use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Request was over the limit; retry after the given delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

/// Per-key rolling-window request limiter
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count one request for `key`, rejecting it if the window is already full.
    ///
    /// Rejected requests are not counted.
    pub async fn check(&self, key: &str) -> Result<(), RateLimited> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let window = hits.entry(key.to_string()).or_default();

        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            let retry_after = window
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(RateLimited { retry_after });
        }

        window.push_back(now);
        Ok(())
    }

    /// Drop keys whose every hit has left the window
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let before = hits.len();
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|latest| now.duration_since(*latest) < self.window)
        });
        before - hits.len()
    }

    /// Periodically purge idle keys until the returned task is dropped
    pub fn spawn_cleanup(&self, every: Duration) -> CleanupTask {
        let limiter = self.clone();
        CleanupTask(tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let purged = limiter.purge_expired().await;
                if purged > 0 {
                    debug!(purged = purged, "Purged idle rate limiter entries");
                }
            }
        }))
    }
}

/// Background purge loop; aborted on drop
#[derive(Debug)]
pub struct CleanupTask(JoinHandle<()>);

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}
