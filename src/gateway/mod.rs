pub mod close_codes;
pub mod events;
pub mod handshake;
pub mod heartbeat;
pub mod intents;
pub mod session;
pub mod sink;
pub mod socket;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use url::Url;

use crate::error::GatewayError;
use close_codes::close_code;
use events::{
    event_name, opcode, ConnectionProperties, DispatchPayload, GatewayPayload, HelloData,
    PresenceUpdate, ReadyData, RequestGuildMembers,
};
use handshake::HandshakeController;
use heartbeat::{Beat, HeartbeatManager};
use session::{ConnectionState, Session, SessionSnapshot};
use sink::{Disconnect, EventSink};
use socket::{Connector, Frame, SocketEvent, SocketEvents, SocketHandle};

pub const GATEWAY_VERSION: u8 = 10;
pub const DEFAULT_LARGE_THRESHOLD: u8 = 200;

/// Close code for sockets we drop while keeping the session resumable.
/// A normal (1000) close would end the session server-side.
const RESUMABLE_CLOSE: u16 = close_code::UNKNOWN_ERROR;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: u64,
    /// `[shard_id, shard_count]`
    pub shard: [u32; 2],
    pub large_threshold: u8,
    pub version: u8,
    pub properties: ConnectionProperties,
    pub presence: PresenceUpdate,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>, intents: u64) -> Self {
        Self {
            token: token.into(),
            intents,
            shard: [0, 1],
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            version: GATEWAY_VERSION,
            properties: ConnectionProperties::default(),
            presence: PresenceUpdate::default(),
        }
    }

    pub fn with_shard(mut self, shard_id: u32, shard_count: u32) -> Self {
        self.shard = [shard_id, shard_count];
        self
    }
}

/// Everything the gateway task reacts to besides commands.
#[derive(Debug)]
pub(crate) enum Internal {
    Socket { conn: u64, event: SocketEvent },
    Heartbeat { generation: u64 },
}

enum Command {
    Connect {
        url: String,
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
    Reconnect {
        identify: bool,
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        payload: GatewayPayload,
        reply: oneshot::Sender<Result<(), GatewayError>>,
    },
}

/// Handle to a gateway connection.
///
/// The connection itself lives in a background task that handles commands,
/// socket events and heartbeat ticks one at a time, in arrival order. Handles
/// are cheap to clone; when the last one is dropped the task disconnects and
/// exits.
#[derive(Clone)]
pub struct GatewayClient {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl GatewayClient {
    pub fn spawn<C: Connector>(
        config: GatewayConfig,
        connector: C,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let session = Session::new(config.intents);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot(true));

        let gateway = Gateway {
            handshake: HandshakeController::new(&config),
            config,
            connector,
            sink,
            session,
            heartbeat: HeartbeatManager::new(),
            socket: None,
            conn: 0,
            url: None,
            internal: internal_tx,
            snapshot: snapshot_tx,
        };
        tokio::spawn(gateway.run(commands_rx, internal_rx));

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
        }
    }

    /// Open a new session against `url`. Only legal from `Shutdown`.
    pub async fn connect(&self, url: &str) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect {
            url: url.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    /// Drop the current socket and open a new one. With `identify` the
    /// session is discarded and a fresh one identified; otherwise the
    /// session is resumed against its resume URL.
    pub async fn reconnect(&self, identify: bool) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Reconnect { identify, reply })?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    /// Close the socket and forget the session. Safe to call in any state.
    pub async fn disconnect(&self) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Disconnect { reply })?;
        rx.await.map_err(|_| GatewayError::Stopped)
    }

    pub async fn update_presence(&self, presence: &PresenceUpdate) -> Result<(), GatewayError> {
        let payload = GatewayPayload::new(opcode::PRESENCE_UPDATE, serde_json::to_value(presence)?);
        self.send(payload).await
    }

    pub async fn request_guild_members(
        &self,
        request: &RequestGuildMembers,
    ) -> Result<(), GatewayError> {
        let payload =
            GatewayPayload::new(opcode::REQUEST_GUILD_MEMBERS, serde_json::to_value(request)?);
        self.send(payload).await
    }

    async fn send(&self, payload: GatewayPayload) -> Result<(), GatewayError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { payload, reply })?;
        rx.await.map_err(|_| GatewayError::Stopped)?
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    /// Watch the session. A new value is published after every event.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    fn command(&self, command: Command) -> Result<(), GatewayError> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::Stopped)
    }
}

struct Gateway<C> {
    config: GatewayConfig,
    connector: C,
    sink: Arc<dyn EventSink>,
    session: Session,
    heartbeat: HeartbeatManager,
    handshake: HandshakeController,
    socket: Option<SocketHandle>,
    /// Id of the most recently opened socket.
    conn: u64,
    /// Base URL given to `connect`.
    url: Option<String>,
    internal: mpsc::UnboundedSender<Internal>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl<C: Connector> Gateway<C> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        self.disconnect();
                        self.publish();
                        return;
                    }
                },
                Some(event) = internal.recv() => {
                    self.on_internal(event);
                    self.publish();
                }
            }
        }
    }

    fn publish(&self) {
        self.snapshot
            .send_replace(self.session.snapshot(self.heartbeat.last_acked()));
    }

    fn on_command(&mut self, command: Command) {
        match command {
            // Publish before replying so callers see the new state as soon
            // as their command returns.
            Command::Connect { url, reply } => {
                let result = self.connect(url);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Reconnect { identify, reply } => {
                let result = if self.session.state == ConnectionState::Shutdown {
                    Err(GatewayError::NotConnected)
                } else {
                    self.reopen(identify);
                    Ok(())
                };
                self.publish();
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                self.publish();
                let _ = reply.send(());
            }
            Command::Send { payload, reply } => {
                let _ = reply.send(self.send(&payload));
            }
        }
    }

    fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::Socket { conn, event } => {
                if conn != self.conn || self.socket.is_none() {
                    tracing::trace!("ignoring {event:?} from stale socket {conn}");
                    return;
                }
                match event {
                    SocketEvent::Open => tracing::debug!("socket {conn} open"),
                    SocketEvent::Message(frame) => self.on_frame(&frame),
                    SocketEvent::Close(code) => self.on_close(code),
                }
            }
            Internal::Heartbeat { generation } => {
                let beat =
                    self.heartbeat
                        .on_tick(generation, self.session.sequence, self.socket.as_ref());
                if beat == Beat::Missed {
                    self.close_socket(RESUMABLE_CLOSE);
                    self.on_close(close_code::SESSION_TIMED_OUT);
                }
            }
        }
    }

    fn connect(&mut self, url: String) -> Result<(), GatewayError> {
        if self.session.state != ConnectionState::Shutdown {
            return Err(GatewayError::AlreadyConnected(self.session.state));
        }
        let target = events::gateway_url(&url, self.config.version)?;
        tracing::info!("connecting to {target}");
        self.url = Some(url);
        self.session.state = ConnectionState::Connecting;
        self.open(target);
        Ok(())
    }

    /// Replace the socket. Resumes unless `identify` is set.
    fn reopen(&mut self, identify: bool) {
        self.heartbeat.cancel();
        self.close_socket(RESUMABLE_CLOSE);

        let resume_url = if identify {
            self.session.clear();
            self.session.state = ConnectionState::Connecting;
            None
        } else {
            self.session.state = ConnectionState::Reconnecting;
            self.session.resume_url.clone()
        };

        let Some(url) = resume_url.or_else(|| self.url.clone()) else {
            self.shutdown(Disconnect::InvalidUrl(String::new()), close_code::NORMAL);
            return;
        };
        match events::gateway_url(&url, self.config.version) {
            Ok(target) => {
                tracing::info!("reconnecting to {target}");
                self.open(target);
            }
            Err(e) => {
                tracing::warn!("cannot reconnect: {e}");
                self.shutdown(Disconnect::InvalidUrl(url), close_code::NORMAL);
            }
        }
    }

    fn open(&mut self, target: Url) {
        self.conn += 1;
        let events = SocketEvents::new(self.conn, self.internal.clone());
        self.socket = Some(self.connector.open(target.as_str(), events));
    }

    fn close_socket(&mut self, code: u16) {
        if let Some(socket) = self.socket.take() {
            socket.close(code);
        }
    }

    fn disconnect(&mut self) {
        self.shutdown(Disconnect::Requested, close_code::NORMAL);
    }

    fn shutdown(&mut self, reason: Disconnect, code: u16) {
        self.heartbeat.cancel();
        self.close_socket(code);
        self.session.clear();
        let was = std::mem::replace(&mut self.session.state, ConnectionState::Shutdown);
        if was != ConnectionState::Shutdown {
            tracing::info!("gateway shut down ({reason:?})");
            self.sink.disconnected(&reason);
        }
    }

    fn send(&mut self, payload: &GatewayPayload) -> Result<(), GatewayError> {
        match &self.socket {
            Some(socket) if self.session.state == ConnectionState::Connected => {
                socket.send_payload(payload);
                Ok(())
            }
            _ => Err(GatewayError::NotConnected),
        }
    }

    fn on_close(&mut self, code: u16) {
        self.socket = None;
        if close_codes::resumable(code) {
            tracing::info!("socket closed with {code}, attempting to resume");
            self.reopen(false);
        } else {
            tracing::warn!("socket closed with {code}, shutting down");
            self.shutdown(Disconnect::Closed(code), close_code::NORMAL);
        }
    }

    fn on_frame(&mut self, frame: &Frame) {
        let payload = match events::decode(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("discarding malformed payload: {e}");
                return;
            }
        };

        // Before routing, so a resume replays from here even if handling fails.
        if let Some(seq) = payload.s {
            self.session.observe_sequence(seq);
        }

        tracing::debug!("received op {} ({})", payload.op, opcode::name(payload.op));

        match payload.op {
            opcode::DISPATCH => match payload.into_dispatch() {
                Some(dispatch) => self.on_dispatch(dispatch),
                None => tracing::warn!("discarding dispatch without sequence or event name"),
            },
            opcode::HELLO => self.on_hello(payload.d),
            opcode::HEARTBEAT => self
                .heartbeat
                .on_server_request(self.session.sequence, self.socket.as_ref()),
            opcode::HEARTBEAT_ACK => self.heartbeat.on_ack(),
            opcode::RECONNECT => {
                tracing::info!("server requested a reconnect");
                self.reopen(false);
            }
            opcode::INVALID_SESSION => self.on_invalid_session(&payload.d),
            op => tracing::warn!("received unknown gateway op {op}: {}", payload.d),
        }
    }

    fn on_hello(&mut self, data: serde_json::Value) {
        let hello: HelloData = match serde_json::from_value(data) {
            Ok(hello) => hello,
            Err(e) => {
                tracing::warn!("discarding malformed hello: {e}");
                return;
            }
        };
        if hello.heartbeat_interval == 0 {
            tracing::warn!("discarding hello with a zero heartbeat interval");
            return;
        }

        let internal = self.internal.clone();
        self.heartbeat.arm(
            Duration::from_millis(hello.heartbeat_interval),
            move |generation| internal.send(Internal::Heartbeat { generation }).is_ok(),
        );

        match self.session.state {
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                self.handshake
                    .begin(&mut self.session, self.socket.as_ref());
            }
            ConnectionState::Connected => {
                tracing::warn!("unexpected hello on an established session")
            }
            ConnectionState::Shutdown => {}
        }
    }

    fn on_dispatch(&mut self, dispatch: DispatchPayload) {
        tracing::debug!("received dispatch {}", dispatch.event_name);
        match dispatch.event_name.as_str() {
            event_name::READY => self.on_ready(dispatch),
            event_name::RESUMED => {
                tracing::info!("session resumed at sequence {}", dispatch.sequence);
                self.session.state = ConnectionState::Connected;
                self.sink.dispatch(&dispatch);
            }
            _ => self.sink.dispatch(&dispatch),
        }
    }

    fn on_ready(&mut self, dispatch: DispatchPayload) {
        let ready: ReadyData = match serde_json::from_value(dispatch.data) {
            Ok(ready) => ready,
            Err(e) => {
                tracing::warn!("discarding malformed ready: {e}");
                return;
            }
        };
        tracing::info!(
            "session {} ready with {} guild(s)",
            ready.session_id,
            ready.guilds.len()
        );

        self.session.session_id = Some(ready.session_id.clone());
        self.session.resume_url =
            match events::gateway_url(&ready.resume_gateway_url, self.config.version) {
                Ok(_) => Some(ready.resume_gateway_url.clone()),
                Err(e) => {
                    tracing::warn!("ignoring resume url: {e}");
                    None
                }
            };
        self.session.state = ConnectionState::Connected;
        self.sink.ready(&ready);
    }

    fn on_invalid_session(&mut self, data: &serde_json::Value) {
        if data.as_bool().unwrap_or(false) {
            tracing::info!("session invalidated, attempting to resume");
            self.reopen(false);
        } else {
            tracing::warn!("session invalidated and not resumable, shutting down");
            self.shutdown(Disconnect::InvalidSession, close_code::NORMAL);
        }
    }
}
