use super::events::{DispatchPayload, ReadyData};

/// Why the gateway went to `Shutdown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// `disconnect()` was called.
    Requested,
    /// The server rejected the session and did not allow a resume.
    InvalidSession,
    /// The socket closed with a code that does not allow a resume.
    Closed(u16),
    /// No usable URL to reconnect to.
    InvalidUrl(String),
}

/// Receives what the gateway delivers. Called synchronously from the gateway
/// event loop, so implementations must not block for long.
pub trait EventSink: Send + Sync + 'static {
    /// Every dispatch except READY, in sequence order.
    fn dispatch(&self, event: &DispatchPayload);

    /// A new session was established.
    fn ready(&self, _ready: &ReadyData) {}

    fn disconnected(&self, _reason: &Disconnect) {}
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn dispatch(&self, event: &DispatchPayload) {
        tracing::trace!("dropping {} (sequence {})", event.event_name, event.sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::ConnectionState;
    use crate::gateway::socket::{Connector, SocketEvents, SocketHandle};
    use crate::gateway::{GatewayClient, GatewayConfig};
    use std::sync::Arc;

    struct NeverConnects;

    impl Connector for NeverConnects {
        fn open(&self, _url: &str, _events: SocketEvents) -> SocketHandle {
            let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
            SocketHandle::new(tx)
        }
    }

    #[tokio::test]
    async fn test_noop_sink_drives_gateway() {
        let client =
            GatewayClient::spawn(GatewayConfig::new("Bot t", 1), NeverConnects, Arc::new(NoopSink));
        client.connect("wss://gateway.test").await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connecting);
        client.disconnect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Shutdown);
    }
}
