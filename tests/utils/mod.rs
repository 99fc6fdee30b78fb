#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use xtsystems_bridge::{
    config::Config,
    domain::ports::{ChannelNotifier, Notification, NotifyError},
    server::Server,
};

pub const GATEWAY_SECRET: &str = "integration-gateway-secret";

/// Config listening on a random local port, isolated from the environment
pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("server.host".to_string(), "localhost".to_string()),
        ("server.port".to_string(), "0".to_string()),
        ("delivery.backoff_unit_ms".to_string(), "10".to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }
    Config::load_with_sources(Some(vars)).unwrap()
}

pub async fn spawn_server() -> String {
    spawn_server_with(test_config(&[]), Arc::new(RecordingNotifier::default())).await
}

pub async fn spawn_server_with(config: Config, notifier: Arc<dyn ChannelNotifier>) -> String {
    let server = Server::with_notifier(&config, notifier).await.unwrap();

    let port = server.port();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}

/// Captures every notification instead of talking to Discord
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelNotifier for RecordingNotifier {
    async fn notify(&self, channel_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), notification.clone()));
        Ok(())
    }
}

/// Formatted log output of the current thread, for asserting on log records
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's logs here until the guard drops
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
