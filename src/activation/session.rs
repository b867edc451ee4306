use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::activation::gateway::BillingStatusGateway;
use crate::activation::models::AuthenticatedProfile;

/// Shared bearer credential. Cloned into the HTTP gateway so every consumer
/// observes the same token.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    token: Arc<RwLock<Option<String>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(Some(token.into()))),
        }
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    pub async fn present(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn store(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }
}

/// key: activation-session-holder -> local session side effects
///
/// The credential presence read the reconciler derives its auth latch from,
/// plus the two side effects it triggers on the activated path.
#[async_trait]
pub trait SessionHolder: Send + Sync {
    async fn credential_present(&self) -> bool;
    /// Idempotent. Re-reads the authenticated profile so locally visible role
    /// and tenant state match the backend.
    async fn refresh_profile(&self) -> anyhow::Result<()>;
    /// Marks cached usage figures stale so the next reader re-fetches them.
    async fn invalidate_usage_cache(&self);
}

/// Cached consumed-credit figure for the quota widgets. The reconciler only
/// ever invalidates it; re-fetching happens lazily on the next read.
#[derive(Debug, Default)]
struct UsageCache {
    consumed_credits: Option<u64>,
    stale: bool,
}

/// In-process session holder backing the CLI shell. Owns the cached profile
/// and the usage cache the activation flow invalidates.
pub struct ConsoleSession {
    gateway: Arc<dyn BillingStatusGateway>,
    credentials: CredentialStore,
    profile: RwLock<Option<AuthenticatedProfile>>,
    usage: RwLock<UsageCache>,
}

impl ConsoleSession {
    pub fn new(gateway: Arc<dyn BillingStatusGateway>, credentials: CredentialStore) -> Self {
        Self {
            gateway,
            credentials,
            profile: RwLock::new(None),
            usage: RwLock::new(UsageCache::default()),
        }
    }

    pub async fn profile(&self) -> Option<AuthenticatedProfile> {
        self.profile.read().await.clone()
    }

    pub async fn usage_is_stale(&self) -> bool {
        self.usage.read().await.stale
    }

    pub async fn record_usage(&self, consumed_credits: u64) {
        let mut usage = self.usage.write().await;
        usage.consumed_credits = Some(consumed_credits);
        usage.stale = false;
    }

    pub async fn consumed_credits(&self) -> Option<u64> {
        self.usage.read().await.consumed_credits
    }
}

#[async_trait]
impl SessionHolder for ConsoleSession {
    async fn credential_present(&self) -> bool {
        self.credentials.present().await
    }

    async fn refresh_profile(&self) -> anyhow::Result<()> {
        let profile = self
            .gateway
            .authenticated_status()
            .await
            .context("failed to refresh session profile")?;
        debug!(tenant_status = ?profile.tenant.status, "session profile refreshed");
        *self.profile.write().await = Some(profile);
        Ok(())
    }

    async fn invalidate_usage_cache(&self) {
        let mut usage = self.usage.write().await;
        usage.stale = true;
    }
}
