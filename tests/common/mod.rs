#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use disco::gateway::events::{opcode, DispatchPayload, ReadyData};
use disco::gateway::session::ConnectionState;
use disco::gateway::sink::{Disconnect, EventSink};
use disco::gateway::socket::{Connector, Frame, Outbound, SocketEvents, SocketHandle};
use disco::gateway::{GatewayClient, GatewayConfig};
use disco::http::{GatewayBotResponse, GatewayResolver, GuildFetcher, HttpError, SessionStartLimit};
use disco::models::Guild;

/// Long enough that only a broken test ever hits it, also under a paused clock.
const WAIT: Duration = Duration::from_secs(600);

pub const TOKEN: &str = "Bot test-token";
pub const BASE_URL: &str = "wss://gateway.test";
pub const RESUME_URL: &str = "wss://resume.test";

/// One socket opened through the [`FakeConnector`]. The test plays the server:
/// it pushes frames in through `events` and reads what the client sent from
/// `outbound`.
pub struct FakeSocket {
    pub url: String,
    pub events: SocketEvents,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

impl FakeSocket {
    pub fn send(&self, payload: Value) {
        self.events.message(Frame::Text(payload.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        self.events.message(Frame::Text(text.to_string()));
    }

    pub fn hello(&self, heartbeat_interval: u64) {
        self.events.opened();
        self.send(json!({ "op": opcode::HELLO, "d": { "heartbeat_interval": heartbeat_interval } }));
    }

    pub fn dispatch(&self, seq: u64, name: &str, data: Value) {
        self.send(json!({ "op": opcode::DISPATCH, "d": data, "s": seq, "t": name }));
    }

    pub fn ready(&self, seq: u64, session_id: &str) {
        self.dispatch(
            seq,
            "READY",
            json!({
                "v": 10,
                "user": { "id": "1", "username": "disco", "bot": true },
                "guilds": [{ "id": "10", "unavailable": true }],
                "session_id": session_id,
                "resume_gateway_url": RESUME_URL,
                "shard": [0, 1],
            }),
        );
    }

    pub fn ack(&self) {
        self.send(json!({ "op": opcode::HEARTBEAT_ACK }));
    }

    pub fn close(&self, code: u16) {
        self.events.closed(code);
    }

    pub async fn next_outbound(&mut self) -> Outbound {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for the client to send")
            .expect("socket handle dropped")
    }

    /// Next frame the client sent, parsed.
    pub async fn next_payload(&mut self) -> Value {
        match self.next_outbound().await {
            Outbound::Frame(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    /// Next frame that is not a heartbeat.
    pub async fn next_command(&mut self) -> Value {
        loop {
            let payload = self.next_payload().await;
            if payload["op"] != opcode::HEARTBEAT {
                return payload;
            }
        }
    }

    /// Skip frames until the client closes the socket. Returns the close code.
    pub async fn next_close(&mut self) -> u16 {
        loop {
            if let Outbound::Close(code) = self.next_outbound().await {
                return code;
            }
        }
    }

    /// Whatever the client has queued without waiting, heartbeats included.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = self.outbound.try_recv() {
            out.push(item);
        }
        out
    }
}

#[derive(Clone)]
pub struct FakeConnector {
    tx: mpsc::UnboundedSender<FakeSocket>,
}

impl FakeConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Connector for FakeConnector {
    fn open(&self, url: &str, events: SocketEvents) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.tx.send(FakeSocket {
            url: url.to_string(),
            events,
            outbound: rx,
        });
        SocketHandle::new(tx)
    }
}

pub async fn next_socket(sockets: &mut mpsc::UnboundedReceiver<FakeSocket>) -> FakeSocket {
    tokio::time::timeout(WAIT, sockets.recv())
        .await
        .expect("timed out waiting for a socket")
        .expect("connector dropped")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Ready(String),
    Dispatch(String, u64),
    Disconnected(Disconnect),
}

/// Sink that forwards everything it receives into a channel.
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Recorded>,
}

impl RecordingSink {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl EventSink for RecordingSink {
    fn dispatch(&self, event: &DispatchPayload) {
        let _ = self
            .tx
            .send(Recorded::Dispatch(event.event_name.clone(), event.sequence));
    }

    fn ready(&self, ready: &ReadyData) {
        let _ = self.tx.send(Recorded::Ready(ready.session_id.clone()));
    }

    fn disconnected(&self, reason: &Disconnect) {
        let _ = self.tx.send(Recorded::Disconnected(reason.clone()));
    }
}

pub async fn next_recorded(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Recorded {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for the sink")
        .expect("sink dropped")
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig::new(TOKEN, 513).with_shard(0, 1)
}

/// A gateway wired to a fake connector and a recording sink.
pub struct Harness {
    pub client: GatewayClient,
    pub sockets: mpsc::UnboundedReceiver<FakeSocket>,
    pub recorded: mpsc::UnboundedReceiver<Recorded>,
}

impl Harness {
    pub fn new() -> Self {
        let (connector, sockets) = FakeConnector::new();
        let (sink, recorded) = RecordingSink::new();
        Self {
            client: GatewayClient::spawn(gateway_config(), connector, sink),
            sockets,
            recorded,
        }
    }

    pub async fn next_socket(&mut self) -> FakeSocket {
        next_socket(&mut self.sockets).await
    }

    pub async fn next_recorded(&mut self) -> Recorded {
        next_recorded(&mut self.recorded).await
    }

    pub async fn wait_for(&self, state: ConnectionState) {
        let mut rx = self.client.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.state == state))
            .await
            .expect("timed out waiting for state")
            .expect("gateway stopped");
    }

    /// Connect and complete an identify handshake with a READY at `seq`.
    /// The heartbeat interval is long enough that no beat is due during a
    /// real-time test.
    pub async fn connected(&mut self, session_id: &str, seq: u64) -> FakeSocket {
        self.client.connect(BASE_URL).await.unwrap();
        let mut socket = self.next_socket().await;
        socket.hello(3_600_000);
        assert_eq!(socket.next_command().await["op"], opcode::IDENTIFY);
        socket.ready(seq, session_id);
        assert_eq!(self.next_recorded().await, Recorded::Ready(session_id.to_string()));
        self.wait_for(ConnectionState::Connected).await;
        socket
    }
}

pub struct FakeResolver {
    pub url: String,
}

#[async_trait]
impl GatewayResolver for FakeResolver {
    async fn resolve_gateway(&self) -> Result<GatewayBotResponse, HttpError> {
        Ok(GatewayBotResponse {
            url: self.url.clone(),
            shards: 1,
            session_start_limit: SessionStartLimit {
                total: 1000,
                remaining: 999,
                reset_after: 14_400_000,
                max_concurrency: 1,
            },
        })
    }
}

pub struct FailingResolver;

#[async_trait]
impl GatewayResolver for FailingResolver {
    async fn resolve_gateway(&self) -> Result<GatewayBotResponse, HttpError> {
        Err(HttpError::ServerError {
            status: 401,
            body: "401: Unauthorized".to_string(),
        })
    }
}

pub struct FakeFetcher;

#[async_trait]
impl GuildFetcher for FakeFetcher {
    async fn fetch_guild(&self, id: &str) -> Result<Guild, HttpError> {
        Ok(serde_json::from_value(json!({ "id": id, "name": "fetched" })).unwrap())
    }
}

/// Binds a TCP listener on port 0, serves `app` on it, and returns the address.
pub async fn spawn_server(app: axum::Router) -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
