use std::sync::Arc;

use dashmap::DashMap;

use crate::gateway::events::DispatchPayload;
use crate::gateway::sink::EventSink;
use crate::http::{GuildFetcher, HttpError};
use crate::models::{Guild, UnavailableGuild};

/// Guilds seen on the gateway, keyed by id.
pub struct GuildCache {
    guilds: DashMap<String, Guild>,
    fetcher: Arc<dyn GuildFetcher>,
}

impl GuildCache {
    pub fn new(fetcher: Arc<dyn GuildFetcher>) -> Self {
        Self {
            guilds: DashMap::new(),
            fetcher,
        }
    }

    pub fn get(&self, id: &str) -> Option<Guild> {
        self.guilds.get(id).map(|g| g.clone())
    }

    /// Insert or replace a guild. Returns the previous entry if any.
    pub fn insert(&self, guild: Guild) -> Option<Guild> {
        self.guilds.insert(guild.id.clone(), guild)
    }

    pub fn remove(&self, id: &str) -> Option<Guild> {
        self.guilds.remove(id).map(|(_, g)| g)
    }

    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }

    /// First cached guild matching `pred`, in no particular order.
    pub fn find<F>(&self, pred: F) -> Option<Guild>
    where
        F: Fn(&Guild) -> bool,
    {
        self.guilds
            .iter()
            .find(|entry| pred(entry.value()))
            .map(|entry| entry.value().clone())
    }

    pub fn contains<F>(&self, pred: F) -> bool
    where
        F: Fn(&Guild) -> bool,
    {
        self.guilds.iter().any(|entry| pred(entry.value()))
    }

    /// Fetch a guild over REST, bypassing the cache.
    pub async fn fetch(&self, id: &str) -> Result<Guild, HttpError> {
        self.fetcher.fetch_guild(id).await
    }

    /// Cached guild, or fetch it over REST and cache the result.
    pub async fn retrieve(&self, id: &str) -> Result<Guild, HttpError> {
        if let Some(guild) = self.get(id) {
            return Ok(guild);
        }
        let guild = self.fetch(id).await?;
        self.insert(guild.clone());
        Ok(guild)
    }
}

impl EventSink for GuildCache {
    fn dispatch(&self, event: &DispatchPayload) {
        match event.event_name.as_str() {
            "GUILD_CREATE" | "GUILD_UPDATE" => {
                match serde_json::from_value::<Guild>(event.data.clone()) {
                    Ok(guild) => {
                        tracing::debug!("caching guild {} ({})", guild.id, guild.name);
                        self.insert(guild);
                    }
                    Err(e) => tracing::warn!("failed to parse {}: {e}", event.event_name),
                }
            }
            "GUILD_DELETE" => match serde_json::from_value::<UnavailableGuild>(event.data.clone()) {
                Ok(guild) => {
                    tracing::debug!("removing guild {}", guild.id);
                    self.remove(&guild.id);
                }
                Err(e) => tracing::warn!("failed to parse GUILD_DELETE: {e}"),
            },
            _ => {}
        }
    }
}
