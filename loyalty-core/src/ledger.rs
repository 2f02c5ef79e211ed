//! Main ledger orchestration layer
//!
//! This module ties together the actor, the proof engine and the external
//! collaborators into the high-level loyalty API.
//!
//! Mutations go through the actor. Voting power is fetched before the
//! registration message is sent, because it is I/O and must not hold the
//! writer. Tier mirroring and welcome mail are spawned after commit and
//! never awaited.
//!
//! # Example
//!
//! ```no_run
//! use loyalty_core::{Collaborators, Config, Ledger, NewUser, WalletAddress};
//! use loyalty_core::external::StaticVotingPower;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> loyalty_core::Result<()> {
//!     let collaborators = Collaborators::new(Arc::new(StaticVotingPower::new("0.0")));
//!     let ledger = Ledger::open(Config::default(), collaborators).await?;
//!
//!     let registration = ledger
//!         .register(NewUser {
//!             name: "Ada".into(),
//!             email: "ada@example.com".into(),
//!             wallet: WalletAddress::new("0xA"),
//!             referral_code: None,
//!         })
//!         .await?;
//!     println!("registered {}", registration.user.id);
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    external::{
        AuditSink, InMemoryTierCache, LogNotifier, Notifier, TierCache, TracingAuditSink,
        VotingPowerSource, WELCOME_TEMPLATE,
    },
    merkle::{self, MerkleProof},
    metrics::Metrics,
    random::{RandomSource, ThreadRandom},
    store::UserStore,
    types::{LedgerOperation, NewUser, Registration, RewardEntry, Tier, User, UserId, WalletAddress},
    Config, Error, Result,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// External collaborators wired into the ledger
#[derive(Clone)]
pub struct Collaborators {
    /// Governance balance lookup (critical for registration)
    pub voting_power: Arc<dyn VotingPowerSource>,
    /// Tier mirror (best-effort)
    pub tier_cache: Arc<dyn TierCache>,
    /// Mailer (best-effort)
    pub notifier: Arc<dyn Notifier>,
    /// Audit consumer
    pub audit: Arc<dyn AuditSink>,
    /// Randomness for the proof bonus
    pub random: Arc<dyn RandomSource>,
}

impl Collaborators {
    /// In-process defaults around a voting power source
    pub fn new(voting_power: Arc<dyn VotingPowerSource>) -> Self {
        Self {
            voting_power,
            tier_cache: Arc::new(InMemoryTierCache::new()),
            notifier: Arc::new(LogNotifier),
            audit: Arc::new(TracingAuditSink),
            random: Arc::new(ThreadRandom),
        }
    }

    /// Replace the tier cache
    pub fn with_tier_cache(mut self, tier_cache: Arc<dyn TierCache>) -> Self {
        self.tier_cache = tier_cache;
        self
    }

    /// Replace the notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the audit sink
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Replace the random source
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }
}

/// Proof plus the user after the proof bonus
#[derive(Debug, Clone)]
pub struct ProofOutcome {
    /// Inclusion proof for the user's wallet
    pub proof: MerkleProof,
    /// User after the bonus was applied
    pub user: User,
}

/// Main ledger interface
pub struct Ledger {
    /// Actor handle
    handle: LedgerHandle,

    /// Collaborators
    voting_power: Arc<dyn VotingPowerSource>,
    tier_cache: Arc<dyn TierCache>,
    notifier: Arc<dyn Notifier>,
    random: Arc<dyn RandomSource>,

    /// Metrics
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let metrics = Metrics::new().map_err(|e| Error::Config(format!("metrics: {}", e)))?;
        let store = UserStore::new(config.rewards.clone(), config.default_tier);
        let handle = spawn_ledger_actor(store, collaborators.audit, config.mailbox_capacity);

        info!(service = %config.service_name, "Ledger opened");

        Ok(Self {
            handle,
            voting_power: collaborators.voting_power,
            tier_cache: collaborators.tier_cache,
            notifier: collaborators.notifier,
            random: collaborators.random,
            metrics,
            config,
        })
    }

    /// Register a new user.
    ///
    /// Fails with `Validation` on malformed input, `Conflict` on a
    /// duplicate email and `VotingPowerUnavailable` when the lookup fails;
    /// no user is created in any of those cases.
    pub async fn register(&self, new_user: NewUser) -> Result<Registration> {
        validate_new_user(&new_user)?;

        if self.handle.find_by_email(&new_user.email).await?.is_some() {
            return Err(Error::Conflict(format!(
                "Email already registered: {}",
                new_user.email
            )));
        }

        let voting_power = self
            .voting_power
            .voting_power(&new_user.wallet)
            .await
            .map_err(|e| {
                error!(wallet = %new_user.wallet, "Voting power lookup failed: {}", e);
                match e {
                    Error::VotingPowerUnavailable(_) => e,
                    other => Error::VotingPowerUnavailable(other.to_string()),
                }
            })?;

        // Email uniqueness is checked again inside the actor
        let registration = self.handle.register(new_user, voting_power).await?;
        self.metrics.record_registration(registration.referrer.is_some());

        info!(
            user_id = %registration.user.id,
            referred_by = ?registration.referrer.as_ref().map(|r| r.id),
            "user_registered"
        );

        self.spawn_tier_mirror(registration.user.id, registration.user.tier);
        self.spawn_welcome(&registration.user);

        Ok(registration)
    }

    /// Deposit `amount` into a user's balance
    pub async fn deposit(&self, user_id: UserId, amount: Decimal) -> Result<User> {
        self.apply_delta(user_id, LedgerOperation::Deposit { amount })
            .await
    }

    /// Apply a ledger operation through the single writer
    pub async fn apply_delta(&self, user_id: UserId, operation: LedgerOperation) -> Result<User> {
        let is_deposit = matches!(operation, LedgerOperation::Deposit { .. });
        let applied = self.handle.apply_delta(user_id, operation).await?;

        if is_deposit {
            self.metrics.record_deposit();
            info!(
                user_id = %applied.user.id,
                balance = %applied.user.balance,
                points = applied.user.points,
                "deposit"
            );
        }

        Ok(applied.user)
    }

    /// Build a proof for the user's wallet over `wallets` and award the proof bonus
    pub async fn generate_proof(&self, user_id: UserId, wallets: &[WalletAddress]) -> Result<ProofOutcome> {
        if wallets.is_empty() {
            return Err(Error::Validation("walletList must not be empty".to_string()));
        }

        let user = self.handle.get_user(user_id).await?;

        let proof = match merkle::build_proof(wallets, &user.wallet) {
            Ok(proof) => proof,
            Err(e) => {
                self.metrics.record_proof(false);
                warn!(user_id = %user_id, "Proof generation failed: {}", e);
                return Err(e);
            }
        };
        self.metrics.record_proof(true);

        let rewards = &self.config.rewards;
        let random_component = self
            .random
            .next(rewards.proof_random_min, rewards.proof_random_max);
        let user = self
            .apply_delta(user_id, LedgerOperation::ProofBonus { random_component })
            .await?;

        info!(
            user_id = %user_id,
            root = %merkle::to_hex(&proof.root),
            steps = proof.steps.len(),
            points = user.points,
            "proof_generated"
        );

        Ok(ProofOutcome { proof, user })
    }

    /// Get user by ID
    pub async fn get_user(&self, user_id: UserId) -> Result<User> {
        self.handle.get_user(user_id).await
    }

    /// Users directly referred by `user_id`
    pub async fn referrals(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.handle.referrals(user_id).await
    }

    /// Full reward catalog
    pub fn rewards_catalog(&self) -> &[RewardEntry] {
        &self.config.catalog
    }

    /// Catalog entries a user of `tier` may redeem
    pub fn eligible_rewards(&self, tier: Tier) -> Vec<RewardEntry> {
        self.config
            .catalog
            .iter()
            .filter(|entry| entry.available_to(tier))
            .cloned()
            .collect()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    fn spawn_tier_mirror(&self, user_id: UserId, tier: Tier) {
        let cache = self.tier_cache.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = cache.set_tier_mirror(user_id, tier).await {
                metrics.record_side_effect_failure();
                warn!(user_id = %user_id, "Tier mirror failed: {}", e);
            }
        });
    }

    fn spawn_welcome(&self, user: &User) {
        let notifier = self.notifier.clone();
        let metrics = self.metrics.clone();
        let recipient = user.email.clone();
        let data = json!({ "name": user.name, "referralCode": user.referral_code });
        tokio::spawn(async move {
            if let Err(e) = notifier.notify(&recipient, WELCOME_TEMPLATE, data).await {
                metrics.record_side_effect_failure();
                error!(event = "email_failed", "Welcome mail failed: {}", e);
            }
        });
    }
}

fn validate_new_user(new_user: &NewUser) -> Result<()> {
    if new_user.name.trim().is_empty() {
        return Err(Error::Validation("name is required".to_string()));
    }

    if !validator::validate_email(new_user.email.as_str()) {
        return Err(Error::Validation(format!("invalid email: {}", new_user.email)));
    }

    if new_user.wallet.as_str().trim().is_empty() {
        return Err(Error::Validation("wallet is required".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{MemoryAuditSink, MemoryNotifier, StaticVotingPower};
    use crate::random::FixedRandom;
    use crate::types::AuditEventKind;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Fixture {
        ledger: Ledger,
        cache: Arc<InMemoryTierCache>,
        notifier: Arc<MemoryNotifier>,
        audit: Arc<MemoryAuditSink>,
    }

    async fn fixture_with(voting_power: StaticVotingPower) -> Fixture {
        let cache = Arc::new(InMemoryTierCache::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let collaborators = Collaborators::new(Arc::new(voting_power))
            .with_tier_cache(cache.clone())
            .with_notifier(notifier.clone())
            .with_audit(audit.clone())
            .with_random(Arc::new(FixedRandom::constant(42)));

        let ledger = Ledger::open(Config::default(), collaborators).await.unwrap();
        Fixture {
            ledger,
            cache,
            notifier,
            audit,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(StaticVotingPower::new("0.0")).await
    }

    fn new_user(email: &str, wallet: &str, referral_code: Option<&str>) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: email.to_string(),
            wallet: WalletAddress::new(wallet),
            referral_code: referral_code.map(str::to_string),
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..50 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_register_side_effects() {
        let fx = fixture_with(StaticVotingPower::new("0.0").with_balance("0xA", "42.5")).await;

        let reg = fx
            .ledger
            .register(new_user("ada@example.com", "0xA", None))
            .await
            .unwrap();
        assert_eq!(reg.user.voting_power, "42.5");
        assert_eq!(reg.user.points, 5);

        let id = reg.user.id;
        assert!(eventually(|| fx.cache.get(id) == Some(Tier::Bronze)).await);
        assert!(eventually(|| fx.notifier.sent().len() == 1).await);
        assert_eq!(fx.notifier.sent()[0].recipient, "ada@example.com");
        assert_eq!(fx.ledger.metrics().registrations_total.get(), 1);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let fx = fixture().await;
        for bad in [
            new_user("not-an-email", "0xA", None),
            new_user("a@example.com", "  ", None),
            NewUser {
                name: " ".into(),
                ..new_user("a@example.com", "0xA", None)
            },
        ] {
            let result = fx.ledger.register(bad).await;
            assert!(matches!(result, Err(Error::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_register_email_rules_match_validator() {
        let fx = fixture().await;

        for malformed in ["a b@example.com", "a@@b.com", "<x>@y.z"] {
            let result = fx.ledger.register(new_user(malformed, "0xA", None)).await;
            assert!(
                matches!(result, Err(Error::Validation(_))),
                "{} should be rejected",
                malformed
            );
        }
        assert_eq!(fx.ledger.metrics().registrations_total.get(), 0);

        // Dotless domains are valid addresses
        let reg = fx
            .ledger
            .register(new_user("ada@localhost", "0xA", None))
            .await
            .unwrap();
        assert_eq!(reg.user.email, "ada@localhost");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_users_gauge_under_concurrent_registrations() {
        const N: usize = 50;
        let fx = fixture().await;
        let ledger = Arc::new(fx.ledger);

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move {
                    ledger
                        .register(new_user(&format!("u{}@example.com", i), "0xA", None))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(ledger.metrics().registrations_total.get(), N as u64);
        assert_eq!(ledger.metrics().users.get(), N as i64);
        // Every committed registration still reaches its side effects
        assert!(eventually(|| fx.notifier.sent().len() == N).await);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let fx = fixture().await;
        fx.ledger
            .register(new_user("ada@example.com", "0xA", None))
            .await
            .unwrap();
        let result = fx.ledger.register(new_user("ada@example.com", "0xB", None)).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_voting_power_failure_aborts_registration() {
        let fx = fixture_with(StaticVotingPower::new("1").failing_for("0xBAD")).await;

        let result = fx.ledger.register(new_user("ada@example.com", "0xBAD", None)).await;
        assert!(matches!(result, Err(Error::VotingPowerUnavailable(_))));

        // Nothing was created, so the same email can register with a working wallet
        fx.ledger
            .register(new_user("ada@example.com", "0xA", None))
            .await
            .unwrap();
        assert_eq!(fx.ledger.metrics().registrations_total.get(), 1);
    }

    #[tokio::test]
    async fn test_side_effect_failures_are_swallowed() {
        let collaborators = Collaborators::new(Arc::new(StaticVotingPower::new("0")))
            .with_tier_cache(Arc::new(InMemoryTierCache::failing()))
            .with_notifier(Arc::new(MemoryNotifier::failing()));
        let ledger = Ledger::open(Config::default(), collaborators).await.unwrap();

        let reg = ledger
            .register(new_user("ada@example.com", "0xA", None))
            .await
            .unwrap();
        assert_eq!(reg.user.points, 5);

        let metrics = ledger.metrics().clone();
        assert!(eventually(|| metrics.side_effect_failures_total.get() == 2).await);
    }

    #[tokio::test]
    async fn test_referral_registration() {
        let fx = fixture().await;
        let referrer = fx
            .ledger
            .register(new_user("a@example.com", "0xA", None))
            .await
            .unwrap();

        let referred = fx
            .ledger
            .register(new_user("b@example.com", "0xB", Some(&referrer.user.referral_code)))
            .await
            .unwrap();

        assert_eq!(referred.referrer.as_ref().map(|r| r.id), Some(referrer.user.id));
        let updated = fx.ledger.get_user(referrer.user.id).await.unwrap();
        assert_eq!(updated.balance, dec!(10));
        assert_eq!(
            fx.ledger.referrals(referrer.user.id).await.unwrap(),
            vec![referred.user.id]
        );
        assert_eq!(fx.ledger.metrics().referral_credits_total.get(), 1);
    }

    #[tokio::test]
    async fn test_deposit_and_invalid_amount() {
        let fx = fixture().await;
        let reg = fx
            .ledger
            .register(new_user("a@example.com", "0xA", None))
            .await
            .unwrap();

        let user = fx.ledger.deposit(reg.user.id, dec!(3)).await.unwrap();
        assert_eq!(user.balance, dec!(3));
        assert_eq!(user.points, 35);

        let result = fx.ledger.deposit(reg.user.id, dec!(-5)).await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
        assert_eq!(fx.ledger.get_user(reg.user.id).await.unwrap().balance, dec!(3));
    }

    #[tokio::test]
    async fn test_generate_proof_awards_bonus() {
        let fx = fixture().await;
        let reg = fx
            .ledger
            .register(new_user("a@example.com", "0xB", None))
            .await
            .unwrap();
        fx.ledger.deposit(reg.user.id, dec!(50)).await.unwrap();

        let wallets: Vec<WalletAddress> = ["0xA", "0xB", "0xC", "0xD"]
            .iter()
            .map(|w| WalletAddress::new(*w))
            .collect();
        let outcome = fx.ledger.generate_proof(reg.user.id, &wallets).await.unwrap();

        assert_eq!(outcome.proof.steps.len(), 2);
        assert!(outcome.proof.verify());
        assert_eq!(outcome.user.points, 57);

        let last = fx.audit.events().pop().unwrap();
        assert_eq!(last.event_kind, AuditEventKind::ProofBonus);
        assert_eq!(last.points, 57);
    }

    #[tokio::test]
    async fn test_generate_proof_target_missing() {
        let fx = fixture().await;
        let reg = fx
            .ledger
            .register(new_user("a@example.com", "0xZ", None))
            .await
            .unwrap();

        let wallets = vec![WalletAddress::new("0xA"), WalletAddress::new("0xB")];
        let result = fx.ledger.generate_proof(reg.user.id, &wallets).await;
        assert!(matches!(result, Err(Error::ProofTargetNotFound(_))));
        // No bonus on failure
        assert_eq!(fx.ledger.get_user(reg.user.id).await.unwrap().points, 5);
        assert_eq!(fx.ledger.metrics().proof_failures_total.get(), 1);

        let empty = fx.ledger.generate_proof(reg.user.id, &[]).await;
        assert!(matches!(empty, Err(Error::Validation(_))));

        let unknown = fx.ledger.generate_proof(UserId::generate(), &wallets).await;
        assert!(matches!(unknown, Err(Error::UserNotFound(_))));
    }

    #[tokio::test]
    async fn test_eligible_rewards() {
        let mut config = Config::default();
        config.catalog.push(RewardEntry {
            id: "r2".into(),
            name: "Gold Pass".into(),
            points: 1000,
            stock: 2,
            tier_required: Tier::Gold,
        });
        let ledger = Ledger::open(
            config,
            Collaborators::new(Arc::new(StaticVotingPower::new("0"))),
        )
        .await
        .unwrap();

        assert_eq!(ledger.rewards_catalog().len(), 2);
        assert_eq!(ledger.eligible_rewards(Tier::Bronze).len(), 1);
        assert_eq!(ledger.eligible_rewards(Tier::Gold).len(), 2);
    }
}
