use async_trait::async_trait;
use loyalty_core::{external::TierCache, Error, Result, Tier, UserId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

/// Cache key prefixes
pub mod keys {
    pub const USER: &str = "user";
}

/// Key holding the mirrored tier of `user_id`
pub fn tier_key(user_id: UserId) -> String {
    format!("{}:{}:tier", keys::USER, user_id)
}

/// Tier mirror in Redis. Read by other services; never read back here.
#[derive(Clone)]
pub struct RedisTierCache {
    redis: ConnectionManager,
}

impl RedisTierCache {
    pub fn new(redis: ConnectionManager) -> Self {
        RedisTierCache { redis }
    }

    pub async fn connect(url: &str) -> std::result::Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let redis = ConnectionManager::new(client).await?;
        Ok(Self::new(redis))
    }
}

#[async_trait]
impl TierCache for RedisTierCache {
    async fn set_tier_mirror(&self, user_id: UserId, tier: Tier) -> Result<()> {
        let key = tier_key(user_id);
        let _: () = self
            .redis
            .clone()
            .set(&key, tier.as_str())
            .await
            .map_err(|e| Error::External(format!("Redis set {}: {}", key, e)))?;
        debug!(key = %key, tier = %tier, "Tier mirrored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_tier_key_format() {
        let id = Uuid::parse_str("6f1c0a52-3c1e-4e0b-9a53-2b5b1f0e8d11").unwrap();
        assert_eq!(
            tier_key(UserId::from_uuid(id)),
            "user:6f1c0a52-3c1e-4e0b-9a53-2b5b1f0e8d11:tier"
        );
    }
}
