use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::hmac_signer::generate_secret;
use super::subscription::{NewSubscription, SubscriptionUpdate, WebhookSubscription};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Webhook {id} not found")]
    NotFound { id: String },

    #[error("Webhook named `{name}` already exists")]
    Conflict { name: String },

    #[error("Invalid webhook: {0}")]
    Invalid(String),
}

type TenantSubscriptions = HashMap<String, WebhookSubscription>;

/// Tenant-scoped set of destination webhooks.
///
/// Readers share the lock; create/update/delete take it exclusively, which
/// serializes writes (and therefore every write within one tenant).
#[derive(Debug, Clone, Default)]
pub struct WebhookRegistry {
    tenants: Arc<RwLock<HashMap<String, TenantSubscriptions>>>,
}

impl WebhookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, generating its id and (if absent) its secret
    pub async fn create(
        &self,
        tenant_id: &str,
        input: NewSubscription,
    ) -> Result<WebhookSubscription, RegistryError> {
        let now = OffsetDateTime::now_utc();
        let subscription = WebhookSubscription {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: input.name,
            target_url: input.target_url,
            subscribed_events: input.subscribed_events.into_iter().collect(),
            secret: input
                .secret
                .filter(|s| !s.is_empty())
                .unwrap_or_else(generate_secret),
            active: input.active,
            retry_limit: input.retry_limit,
            timeout_seconds: input.timeout_seconds,
            custom_headers: input.custom_headers,
            created_at: now,
            updated_at: now,
        };
        subscription.validate().map_err(RegistryError::Invalid)?;

        let mut tenants = self.tenants.write().await;
        let subscriptions = tenants.entry(tenant_id.to_string()).or_default();
        ensure_unique_name(subscriptions, subscription.name.as_deref(), None)?;

        info!(
            tenant_id = %tenant_id,
            webhook_id = %subscription.id,
            target_url = %subscription.target_url,
            "Registered webhook"
        );
        subscriptions.insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    /// Active subscriptions of a tenant that want `event_type`.
    ///
    /// Returns a snapshot; subscriptions registered afterwards are not included.
    pub async fn find(&self, event_type: &str, tenant_id: &str) -> Vec<WebhookSubscription> {
        let tenants = self.tenants.read().await;
        let matches: Vec<WebhookSubscription> = tenants
            .get(tenant_id)
            .map(|subs| {
                subs.values()
                    .filter(|s| s.matches_event(event_type))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        debug!(
            tenant_id = %tenant_id,
            event_type = %event_type,
            count = matches.len(),
            "Resolved subscriptions"
        );
        matches
    }

    pub async fn get(&self, id: &str, tenant_id: &str) -> Result<WebhookSubscription, RegistryError> {
        let tenants = self.tenants.read().await;
        tenants
            .get(tenant_id)
            .and_then(|subs| subs.get(id))
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// All subscriptions of a tenant, oldest first
    pub async fn list(&self, tenant_id: &str) -> Vec<WebhookSubscription> {
        let tenants = self.tenants.read().await;
        let mut subs: Vec<WebhookSubscription> = tenants
            .get(tenant_id)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default();
        subs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        subs
    }

    pub async fn update(
        &self,
        id: &str,
        tenant_id: &str,
        update: SubscriptionUpdate,
    ) -> Result<WebhookSubscription, RegistryError> {
        let mut tenants = self.tenants.write().await;
        let subscriptions = tenants.get_mut(tenant_id).ok_or_else(|| not_found(id))?;

        let mut updated = subscriptions.get(id).cloned().ok_or_else(|| not_found(id))?;
        updated.apply(update);
        updated.validate().map_err(RegistryError::Invalid)?;
        ensure_unique_name(subscriptions, updated.name.as_deref(), Some(id))?;

        info!(tenant_id = %tenant_id, webhook_id = %id, "Updated webhook");
        subscriptions.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    pub async fn delete(&self, id: &str, tenant_id: &str) -> Result<(), RegistryError> {
        let mut tenants = self.tenants.write().await;
        let removed = tenants
            .get_mut(tenant_id)
            .and_then(|subs| subs.remove(id))
            .ok_or_else(|| not_found(id))?;

        info!(tenant_id = %tenant_id, webhook_id = %removed.id, "Deleted webhook");
        Ok(())
    }
}

fn not_found(id: &str) -> RegistryError {
    RegistryError::NotFound { id: id.to_string() }
}

fn ensure_unique_name(
    subscriptions: &TenantSubscriptions,
    name: Option<&str>,
    except_id: Option<&str>,
) -> Result<(), RegistryError> {
    let Some(name) = name else {
        return Ok(());
    };

    let taken = subscriptions
        .values()
        .any(|s| s.name.as_deref() == Some(name) && Some(s.id.as_str()) != except_id);
    if taken {
        return Err(RegistryError::Conflict {
            name: name.to_string(),
        });
    }
    Ok(())
}
