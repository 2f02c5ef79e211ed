pub mod cache;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod mailer;
pub mod metrics;
pub mod models;
pub mod telemetry;
pub mod voting_power;

pub use config::Config;
pub use errors::{LoyaltyApiError, Result};

use cache::RedisTierCache;
use loyalty_core::{
    external::{InMemoryTierCache, LogNotifier, Notifier, TierCache},
    Collaborators, Ledger,
};
use mailer::WebhookMailer;
use std::sync::Arc;
use tracing::{info, warn};
use voting_power::EthRpcVotingPower;

/// Wire the production collaborators and open the ledger
pub async fn open_ledger(config: &Config) -> Result<Ledger> {
    let voting_power = EthRpcVotingPower::new(
        config.chain.rpc_url.clone(),
        config.chain.governance_token.clone(),
        config.chain.decimals,
        config.chain.timeout_secs,
    )?;

    let tier_cache: Arc<dyn TierCache> = if config.redis.url.is_empty() {
        info!("No Redis URL configured, tier mirror kept in memory");
        Arc::new(InMemoryTierCache::new())
    } else {
        match RedisTierCache::connect(&config.redis.url).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                // The mirror is best-effort; registration must not depend on it
                warn!(event = "redis_connect_error", "Redis unavailable: {}", e);
                Arc::new(InMemoryTierCache::new())
            }
        }
    };

    let notifier: Arc<dyn Notifier> = match &config.mail.relay_url {
        Some(url) => Arc::new(WebhookMailer::new(
            url.clone(),
            config.mail.from.clone(),
            config.mail.timeout_secs,
        )?),
        None => Arc::new(LogNotifier),
    };

    let collaborators = Collaborators::new(Arc::new(voting_power))
        .with_tier_cache(tier_cache)
        .with_notifier(notifier);

    Ok(Ledger::open(config.ledger.clone(), collaborators).await?)
}
