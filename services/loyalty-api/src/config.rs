use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub chain: ChainConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub ledger: loyalty_core::Config,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

/// Tier mirror target. An empty URL keeps the mirror in memory.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Governance token lookup over JSON-RPC
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub governance_token: String,
    pub decimals: u32,
    pub timeout_secs: u64,
}

/// Mail relay. Without a relay URL mails are only logged.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MailConfig {
    pub relay_url: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

/// Log filter and the JSON activity log kept next to stdout
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogConfig {
    pub level: String,
    pub activity_file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            activity_file: Some("user_activity.log".to_string()),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.workers", 4)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("chain.rpc_url", "http://localhost:8545")?
            .set_default(
                "chain.governance_token",
                "0x0000000000000000000000000000000000000000",
            )?
            .set_default("chain.decimals", 18)?
            .set_default("chain.timeout_secs", 10)?
            .set_default("mail.from", "loyalty@localhost")?
            .set_default("mail.timeout_secs", 10)?
            .set_default("log.level", "info")?
            .set_default("log.activity_file", "user_activity.log")?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("LOYALTY_API")
                .separator("__")
                .list_separator(","),
        );

        if let Ok(redis_url) = env::var("REDIS_URL") {
            builder = builder.set_override("redis.url", redis_url)?;
        }

        if let Ok(rpc_url) = env::var("RPC_URL") {
            builder = builder.set_override("chain.rpc_url", rpc_url)?;
        }

        if let Ok(token) = env::var("GOVERNANCE_TOKEN") {
            builder = builder.set_override("chain.governance_token", token)?;
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.server.workers == 0 {
            return Err("At least one worker is required".to_string());
        }

        if self.chain.rpc_url.is_empty() {
            return Err("Chain RPC URL is required".to_string());
        }

        let token = self.chain.governance_token.trim_start_matches("0x");
        if token.len() != 40 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "Governance token address is malformed: {}",
                self.chain.governance_token
            ));
        }

        // u128 holds at most 38 decimal digits
        if self.chain.decimals > 38 {
            return Err("Token decimals cannot exceed 38".to_string());
        }

        if matches!(&self.mail.relay_url, Some(url) if url.is_empty()) {
            return Err("Mail relay URL cannot be empty when set".to_string());
        }

        if matches!(&self.log.activity_file, Some(path) if path.is_empty()) {
            return Err("Activity log path cannot be empty when set".to_string());
        }

        self.ledger.validate().map_err(|e| e.to_string())
    }
}
