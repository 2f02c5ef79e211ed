//! Contracts with collaborators outside the core
//!
//! Voting power is critical: registration fails when it is unavailable.
//! Tier mirroring, notifications and auditing are best-effort.

use crate::types::{AuditEvent, Tier, UserId, WalletAddress};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Template name of the registration welcome message
pub const WELCOME_TEMPLATE: &str = "welcome";

/// Read-only governance token balance lookup
#[async_trait]
pub trait VotingPowerSource: Send + Sync {
    /// Voting power of `wallet` as a decimal string
    async fn voting_power(&self, wallet: &WalletAddress) -> Result<String>;
}

/// Best-effort projection of a user's tier into a key-value cache
#[async_trait]
pub trait TierCache: Send + Sync {
    /// Mirror `tier` for `user_id`
    async fn set_tier_mirror(&self, user_id: UserId, tier: Tier) -> Result<()>;
}

/// Outbound notifications (mail)
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send `template` rendered with `data` to `recipient`
    async fn notify(&self, recipient: &str, template: &str, data: serde_json::Value) -> Result<()>;
}

/// Consumer of audit events emitted by the ledger updater
pub trait AuditSink: Send + Sync {
    /// Record one committed mutation
    fn record(&self, event: &AuditEvent);
}

/// Voting power source backed by a fixed table
#[derive(Debug)]
pub struct StaticVotingPower {
    default: String,
    balances: RwLock<HashMap<String, String>>,
    failing: RwLock<HashSet<String>>,
}

impl StaticVotingPower {
    /// Every wallet reports `default`
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            balances: RwLock::new(HashMap::new()),
            failing: RwLock::new(HashSet::new()),
        }
    }

    /// Override the balance of one wallet
    pub fn with_balance(self, wallet: &str, value: impl Into<String>) -> Self {
        self.balances.write().insert(wallet.to_string(), value.into());
        self
    }

    /// Make lookups for `wallet` fail
    pub fn failing_for(self, wallet: &str) -> Self {
        self.failing.write().insert(wallet.to_string());
        self
    }
}

#[async_trait]
impl VotingPowerSource for StaticVotingPower {
    async fn voting_power(&self, wallet: &WalletAddress) -> Result<String> {
        if self.failing.read().contains(wallet.as_str()) {
            return Err(Error::VotingPowerUnavailable(format!(
                "lookup failed for {}",
                wallet
            )));
        }
        Ok(self
            .balances
            .read()
            .get(wallet.as_str())
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// Tier cache held in process memory
#[derive(Debug, Default)]
pub struct InMemoryTierCache {
    tiers: RwLock<HashMap<UserId, Tier>>,
    fail: bool,
}

impl InMemoryTierCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose writes always fail
    pub fn failing() -> Self {
        Self {
            tiers: RwLock::new(HashMap::new()),
            fail: true,
        }
    }

    /// Mirrored tier of a user
    pub fn get(&self, user_id: UserId) -> Option<Tier> {
        self.tiers.read().get(&user_id).copied()
    }
}

#[async_trait]
impl TierCache for InMemoryTierCache {
    async fn set_tier_mirror(&self, user_id: UserId, tier: Tier) -> Result<()> {
        if self.fail {
            return Err(Error::External("tier cache unavailable".to_string()));
        }
        self.tiers.write().insert(user_id, tier);
        Ok(())
    }
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: &str, template: &str, data: serde_json::Value) -> Result<()> {
        info!(recipient, template, %data, "notification");
        Ok(())
    }
}

/// Notification captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    /// Recipient address
    pub recipient: String,
    /// Template name
    pub template: String,
    /// Template data
    pub data: serde_json::Value,
}

/// Notifier that keeps every message, for tests
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: bool,
}

impl MemoryNotifier {
    /// Recording notifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifier whose sends always fail
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, recipient: &str, template: &str, data: serde_json::Value) -> Result<()> {
        if self.fail {
            return Err(Error::External("mail relay unavailable".to_string()));
        }
        self.sent.lock().push(SentNotification {
            recipient: recipient.to_string(),
            template: template.to_string(),
            data,
        });
        Ok(())
    }
}

/// Audit sink writing structured JSON on the `audit_log` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!(target: "audit_log", "{}", json),
            Err(e) => tracing::warn!("Failed to serialize audit event: {}", e),
        }
    }
}

/// Audit sink that keeps every event, for tests
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_voting_power() {
        let source = StaticVotingPower::new("0.0")
            .with_balance("0xA", "12.5")
            .failing_for("0xBAD");

        assert_eq!(source.voting_power(&"0xA".into()).await.unwrap(), "12.5");
        assert_eq!(source.voting_power(&"0xB".into()).await.unwrap(), "0.0");
        assert!(matches!(
            source.voting_power(&"0xBAD".into()).await,
            Err(Error::VotingPowerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_tier_cache() {
        let cache = InMemoryTierCache::new();
        let id = UserId::generate();
        cache.set_tier_mirror(id, Tier::Silver).await.unwrap();
        assert_eq!(cache.get(id), Some(Tier::Silver));

        let broken = InMemoryTierCache::failing();
        assert!(broken.set_tier_mirror(id, Tier::Gold).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_notifier() {
        let notifier = MemoryNotifier::new();
        notifier
            .notify("a@b.io", WELCOME_TEMPLATE, serde_json::json!({"name": "Ada"}))
            .await
            .unwrap();
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "welcome");
    }
}
