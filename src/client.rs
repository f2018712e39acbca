use std::sync::Arc;

use tokio::sync::broadcast;

use crate::cache::GuildCache;
use crate::config::Config;
use crate::error::{ClientError, GatewayError};
use crate::gateway::events::{DispatchPayload, ReadyData};
use crate::gateway::session::ConnectionState;
use crate::gateway::sink::{Disconnect, EventSink};
use crate::gateway::socket::{Connector, TungsteniteConnector};
use crate::gateway::{GatewayClient, GatewayConfig};
use crate::http::{GatewayResolver, GuildFetcher, HttpClient};

/// What subscribers of a [`DiscoClient`] receive.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Ready(ReadyData),
    Dispatch(DispatchPayload),
    Disconnected(Disconnect),
}

/// Feeds the guild cache, then fans events out to subscribers.
struct ClientSink {
    cache: Arc<GuildCache>,
    tx: broadcast::Sender<ClientEvent>,
}

impl ClientSink {
    fn broadcast(&self, event: ClientEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

impl EventSink for ClientSink {
    fn dispatch(&self, event: &DispatchPayload) {
        self.cache.dispatch(event);
        self.broadcast(ClientEvent::Dispatch(event.clone()));
    }

    fn ready(&self, ready: &ReadyData) {
        self.broadcast(ClientEvent::Ready(ready.clone()));
    }

    fn disconnected(&self, reason: &Disconnect) {
        self.broadcast(ClientEvent::Disconnected(reason.clone()));
    }
}

pub struct DiscoClient {
    gateway: GatewayClient,
    resolver: Arc<dyn GatewayResolver>,
    cache: Arc<GuildCache>,
    tx: broadcast::Sender<ClientEvent>,
}

impl DiscoClient {
    pub fn new(config: &Config) -> Self {
        let http = Arc::new(
            HttpClient::new(config.authorization()).with_api_root(config.api_url.clone()),
        );
        Self::from_parts(
            config.gateway_config(),
            TungsteniteConnector,
            http.clone(),
            http,
        )
    }

    pub fn from_parts<C: Connector>(
        gateway: GatewayConfig,
        connector: C,
        resolver: Arc<dyn GatewayResolver>,
        fetcher: Arc<dyn GuildFetcher>,
    ) -> Self {
        let (tx, _) = broadcast::channel(1024);
        let cache = Arc::new(GuildCache::new(fetcher));
        let sink = Arc::new(ClientSink {
            cache: cache.clone(),
            tx: tx.clone(),
        });
        Self {
            gateway: GatewayClient::spawn(gateway, connector, sink),
            resolver,
            cache,
            tx,
        }
    }

    /// Ask the REST API where to connect, then open the gateway there.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let gateway = self.resolver.resolve_gateway().await?;
        let limit = &gateway.session_start_limit;
        tracing::info!(
            "gateway at {} recommends {} shard(s), {}/{} session starts remaining",
            gateway.url,
            gateway.shards,
            limit.remaining,
            limit.total
        );
        if limit.remaining == 0 {
            tracing::warn!(
                "session start limit exhausted, resets in {}ms",
                limit.reset_after
            );
        }
        self.gateway.connect(&gateway.url).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.gateway.disconnect().await?;
        Ok(())
    }

    /// Resolves once the session is `Connected`. Fails if the gateway shuts
    /// down first, including when it was never connected.
    pub async fn wait_until_ready(&self) -> Result<(), ClientError> {
        let mut rx = self.gateway.subscribe();
        loop {
            let state = rx.borrow_and_update().state;
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Shutdown => return Err(GatewayError::NotConnected.into()),
                ConnectionState::Connecting | ConnectionState::Reconnecting => {}
            }
            rx.changed().await.map_err(|_| GatewayError::Stopped)?;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    pub fn guilds(&self) -> &GuildCache {
        &self.cache
    }
}
