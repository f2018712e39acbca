use crate::gateway::{intents, GatewayConfig, DEFAULT_LARGE_THRESHOLD, GATEWAY_VERSION};

pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("unknown intent {0:?}")]
    UnknownIntent(String),
    #[error("shard id {id} must be below shard count {count}")]
    InvalidShard { id: u32, count: u32 },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub intents: u64,
    pub shard_id: u32,
    pub shard_count: u32,
    pub large_threshold: u8,
    pub api_url: String,
    pub gateway_version: u8,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("DISCO_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCO_TOKEN"))?;

        let intents = intents::parse(
            &std::env::var("DISCO_INTENTS").unwrap_or_else(|_| "guilds".to_string()),
        )
        .map_err(ConfigError::UnknownIntent)?;
        if intents::has_privileged(intents) {
            tracing::warn!(
                "privileged intents requested ({}), they must be enabled for the application",
                intents::names(intents & intents::PRIVILEGED_INTENTS).join(", ")
            );
        }

        let shard_id = parse_env("DISCO_SHARD_ID").unwrap_or(0);
        let shard_count = parse_env("DISCO_SHARD_COUNT").unwrap_or(1);
        if shard_id >= shard_count {
            return Err(ConfigError::InvalidShard {
                id: shard_id,
                count: shard_count,
            });
        }

        Ok(Self {
            token,
            intents,
            shard_id,
            shard_count,
            large_threshold: parse_env("DISCO_LARGE_THRESHOLD")
                .unwrap_or(DEFAULT_LARGE_THRESHOLD)
                .clamp(50, 250),
            api_url: std::env::var("DISCO_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            gateway_version: parse_env("DISCO_GATEWAY_VERSION").unwrap_or(GATEWAY_VERSION),
        })
    }

    /// The token as sent to the gateway and REST API.
    pub fn authorization(&self) -> String {
        if self.token.starts_with("Bot ") {
            self.token.clone()
        } else {
            format!("Bot {}", self.token)
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::new(self.authorization(), self.intents)
            .with_shard(self.shard_id, self.shard_count);
        config.large_threshold = self.large_threshold;
        config.version = self.gateway_version;
        config
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
