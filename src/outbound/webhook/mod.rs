// Outbound webhook delivery
//
// Leaf components:
//   hmac_signer, http_client, retry_strategy, schemas, subscription
//
// Orchestration:
//   registry         – tenant-scoped subscription store
//   delivery_service – signs and sends one event to one subscription, with retries
//   dispatcher       – resolves subscribers and fans an event out to them

pub mod delivery_service;
pub mod dispatcher;
pub mod hmac_signer;
pub mod http_client;
pub mod registry;
pub mod retry_strategy;
pub mod schemas;
pub mod subscription;

// Re-export commonly used types
pub use delivery_service::{DeliveryService, PreparedEvent};
pub use dispatcher::{DispatchError, DispatchHandle, EventDispatcher};
pub use hmac_signer::{HmacSigner, VerificationError, WebhookVerifier, generate_secret};
pub use http_client::{DeliveryClient, HttpClientError, WebhookHttpClient};
pub use registry::{RegistryError, WebhookRegistry};
pub use retry_strategy::RetryStrategy;
pub use schemas::{AttemptOutcome, DeliveryAttempt};
pub use subscription::{NewSubscription, SubscriptionUpdate, WebhookSubscription};
