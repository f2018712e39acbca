use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::DEFAULT_API_URL;
use crate::models::Guild;

pub const USER_AGENT: &str = concat!(
    "DiscordBot (https://crates.io/crates/disco, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    ServerError { status: u16, body: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GatewayBotResponse {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets.
    pub reset_after: u64,
    pub max_concurrency: u32,
}

/// Finds the URL the gateway should connect to.
#[async_trait]
pub trait GatewayResolver: Send + Sync {
    async fn resolve_gateway(&self) -> Result<GatewayBotResponse, HttpError>;
}

#[async_trait]
pub trait GuildFetcher: Send + Sync {
    async fn fetch_guild(&self, id: &str) -> Result<Guild, HttpError>;
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    api_root: String,
    authorization: String,
}

impl HttpClient {
    /// `authorization` is sent as-is, e.g. `Bot <token>`.
    pub fn new(authorization: String) -> Self {
        Self {
            client: Client::new(),
            api_root: DEFAULT_API_URL.to_string(),
            authorization,
        }
    }

    pub fn with_api_root(mut self, api_root: String) -> Self {
        self.api_root = api_root.trim_end_matches('/').to_string();
        self
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        let url = format!("{}{path}", self.api_root);
        tracing::debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.authorization)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(HttpError::ServerError { status, body });
        }

        Ok(resp.json().await?)
    }

    pub async fn get_gateway_bot(&self) -> Result<GatewayBotResponse, HttpError> {
        self.get("/gateway/bot").await
    }

    pub async fn get_guild(&self, id: &str) -> Result<Guild, HttpError> {
        self.get(&format!("/guilds/{id}")).await
    }
}

#[async_trait]
impl GatewayResolver for HttpClient {
    async fn resolve_gateway(&self) -> Result<GatewayBotResponse, HttpError> {
        self.get_gateway_bot().await
    }
}

#[async_trait]
impl GuildFetcher for HttpClient {
    async fn fetch_guild(&self, id: &str) -> Result<Guild, HttpError> {
        self.get_guild(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_root_trailing_slash() {
        let client = HttpClient::new("Bot abc".into()).with_api_root("http://localhost:1/api/".into());
        assert_eq!(client.api_root(), "http://localhost:1/api");
    }

    #[test]
    fn test_user_agent() {
        assert!(USER_AGENT.starts_with("DiscordBot ("));
        assert!(USER_AGENT.ends_with(&format!("{})", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn test_gateway_bot_response() {
        let resp: GatewayBotResponse = serde_json::from_value(serde_json::json!({
            "url": "wss://gateway.discord.gg",
            "shards": 9,
            "session_start_limit": {
                "total": 1000,
                "remaining": 999,
                "reset_after": 14400000,
                "max_concurrency": 1
            }
        }))
        .unwrap();
        assert_eq!(resp.shards, 9);
        assert_eq!(resp.session_start_limit.remaining, 999);
    }

    #[test]
    fn test_server_error_message() {
        let err = HttpError::ServerError {
            status: 401,
            body: "401: Unauthorized".into(),
        };
        assert_eq!(err.to_string(), "server returned 401: 401: Unauthorized");
    }
}
