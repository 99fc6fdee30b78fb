mod handlers;
mod responses;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{Config, DeliveryConfig, GatewayConfig};
use crate::domain::ports::{ChannelNotifier, DeliveryLog};
use crate::inbound::channel_map::ChannelMap;
use crate::inbound::gateway::{self, GatewayState};
use crate::inbound::rate_limiter::{CleanupTask, RateLimiter};
use crate::inbound::router::EventRouter;
use crate::infrastructure::delivery_log::{InMemoryDeliveryLog, JsonlDeliveryLog};
use crate::infrastructure::handlers::{TestEventHandler, TicketHandler};
use crate::infrastructure::notifier::{DiscordNotifier, LoggingNotifier};
use crate::outbound::webhook::delivery_service::DeliveryService;
use crate::outbound::webhook::dispatcher::EventDispatcher;
use crate::outbound::webhook::hmac_signer::WebhookVerifier;
use crate::outbound::webhook::http_client::WebhookHttpClient;
use crate::outbound::webhook::registry::WebhookRegistry;
use crate::server::handlers::health::health_check;
use axum::http::Method;
use axum::{Router, routing::get};
use color_eyre::eyre::{Context, Result};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Policy applied to subscriptions registered without their own
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubscriptionDefaults {
    pub retry_limit: u32,
    pub timeout_seconds: u64,
}

impl From<&DeliveryConfig> for SubscriptionDefaults {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            retry_limit: config.retry_limit,
            timeout_seconds: config.timeout_seconds,
        }
    }
}

#[derive(Clone)]
/// The global application state shared between all management request handlers.
pub(crate) struct AppState {
    pub dispatcher: EventDispatcher,
    pub delivery_log: Arc<dyn DeliveryLog>,
    pub defaults: SubscriptionDefaults,
    pub gateway_enabled: bool,
}

#[cfg(test)]
impl AppState {
    /// State backed by an in-memory log and the real HTTP client
    pub fn in_memory(gateway_enabled: bool) -> Self {
        use crate::outbound::webhook::subscription;

        let log: Arc<dyn DeliveryLog> = Arc::new(InMemoryDeliveryLog::new());
        let client = Arc::new(WebhookHttpClient::new().expect("http client"));
        let delivery = Arc::new(DeliveryService::new(client, log.clone()));
        Self {
            dispatcher: EventDispatcher::new(WebhookRegistry::new(), delivery),
            delivery_log: log,
            defaults: SubscriptionDefaults {
                retry_limit: subscription::DEFAULT_RETRY_LIMIT,
                timeout_seconds: subscription::DEFAULT_TIMEOUT_SECONDS,
            },
            gateway_enabled,
        }
    }
}

pub struct Server {
    router: Router,
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: EventDispatcher,
    rate_limit_cleanup: Option<CleanupTask>,
}

impl Server {
    /// Creates a new server, notifying Discord when a bot token is configured.
    pub async fn new(config: &Config) -> Result<Self> {
        let notifier: Arc<dyn ChannelNotifier> = match config.discord.bot_token.as_deref() {
            Some(token) if !token.is_empty() => Arc::new(
                DiscordNotifier::new(&config.discord.api_base, token)
                    .wrap_err("Failed to build Discord client")?,
            ),
            _ => {
                tracing::warn!("No Discord bot token configured, notifications will only be logged");
                Arc::new(LoggingNotifier)
            }
        };
        Self::with_notifier(config, notifier).await
    }

    /// Creates a new server delivering inbound notifications through `notifier`.
    pub async fn with_notifier(config: &Config, notifier: Arc<dyn ChannelNotifier>) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ]);

        let delivery_log = build_delivery_log(&config.delivery).await?;
        let client = WebhookHttpClient::new().wrap_err("Failed to build webhook HTTP client")?;
        let delivery = DeliveryService::new(Arc::new(client), delivery_log.clone())
            .with_retry_strategy(config.delivery.retry_strategy())
            .with_response_body_limit(config.delivery.response_body_limit);
        let dispatcher = EventDispatcher::new(WebhookRegistry::new(), Arc::new(delivery));

        let (gateway, rate_limit_cleanup) = build_gateway(config, notifier)?.unzip();

        let state = AppState {
            dispatcher: dispatcher.clone(),
            delivery_log,
            defaults: SubscriptionDefaults::from(&config.delivery),
            gateway_enabled: gateway.is_some(),
        };

        let mut router = Router::new()
            .route("/health", get(health_check))
            .merge(handlers::webhooks::routes())
            .with_state(state);
        if let Some(gateway) = gateway {
            router = router.merge(gateway);
        }
        let router = router.layer(cors_layer).layer(trace_layer);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            router,
            listener,
            local_addr,
            dispatcher,
            rate_limit_cleanup,
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Handle for emitting events from the embedding process.
    pub fn dispatcher(&self) -> EventDispatcher {
        self.dispatcher.clone()
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        let Self {
            router,
            listener,
            local_addr,
            rate_limit_cleanup: _cleanup,
            ..
        } = self;

        tracing::info!("Server listening on {}", local_addr);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}

async fn build_delivery_log(config: &DeliveryConfig) -> Result<Arc<dyn DeliveryLog>> {
    match &config.log_path {
        Some(path) => {
            let log = JsonlDeliveryLog::open(path)
                .await
                .wrap_err_with(|| format!("Failed to open delivery log {}", path.display()))?;
            tracing::info!(path = %path.display(), "Persisting delivery log");
            Ok(Arc::new(log))
        }
        None => Ok(Arc::new(InMemoryDeliveryLog::new())),
    }
}

/// Inbound endpoint and its limiter cleanup, or `None` when no gateway secret is configured
fn build_gateway(
    config: &Config,
    notifier: Arc<dyn ChannelNotifier>,
) -> Result<Option<(Router, CleanupTask)>> {
    let GatewayConfig {
        path,
        secret,
        freshness_window_secs,
        rate_limit_max_requests,
        rate_limit_window_secs,
        max_body_bytes,
    } = &config.gateway;

    let Some(secret) = secret.as_deref().filter(|s| !s.is_empty()) else {
        tracing::warn!("No gateway secret configured, inbound webhook endpoint disabled");
        return Ok(None);
    };

    let channels =
        Arc::new(ChannelMap::from_config(&config.channels).wrap_err("Invalid channel mapping")?);
    let router = EventRouter::new(channels, notifier)
        .with_handler(Arc::new(TicketHandler::new()))
        .with_handler(Arc::new(TestEventHandler));

    let limiter = RateLimiter::new(
        *rate_limit_max_requests,
        Duration::from_secs(*rate_limit_window_secs),
    );
    let cleanup = limiter.spawn_cleanup(RATE_LIMIT_CLEANUP_INTERVAL);

    tracing::info!(path = %path, "Inbound webhook endpoint enabled");
    let routes = gateway::routes(
        path,
        GatewayState {
            verifier: Arc::new(WebhookVerifier::new(secret, *freshness_window_secs)),
            router: Arc::new(router),
            limiter,
            max_body_bytes: *max_body_bytes,
        },
    );
    Ok(Some((routes, cleanup)))
}
