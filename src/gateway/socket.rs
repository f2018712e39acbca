use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::close_codes::close_code;
use super::events::{self, GatewayPayload};
use super::Internal;

/// A whole frame received from the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Something the state machine asks the socket to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(String),
    Close(u16),
}

/// Lifecycle notifications a connector reports for one socket.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    Open,
    Message(Frame),
    Close(u16),
}

/// Where a connector reports what happens on the socket it opened. Every
/// report is tagged with the connection it belongs to, so reports from a
/// socket that has since been replaced are dropped by the state machine.
#[derive(Debug, Clone)]
pub struct SocketEvents {
    conn: u64,
    tx: mpsc::UnboundedSender<Internal>,
}

impl SocketEvents {
    pub(crate) fn new(conn: u64, tx: mpsc::UnboundedSender<Internal>) -> Self {
        Self { conn, tx }
    }

    /// Returns false once the state machine has stopped listening.
    pub fn opened(&self) -> bool {
        self.report(SocketEvent::Open)
    }

    pub fn message(&self, frame: Frame) -> bool {
        self.report(SocketEvent::Message(frame))
    }

    pub fn closed(&self, code: u16) -> bool {
        self.report(SocketEvent::Close(code))
    }

    fn report(&self, event: SocketEvent) -> bool {
        self.tx
            .send(Internal::Socket {
                conn: self.conn,
                event,
            })
            .is_ok()
    }
}

/// Sending half of an open (or opening) socket. Dropping it lets the
/// connector tear the socket down.
#[derive(Debug)]
pub struct SocketHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Queue a text frame. Returns false if the socket is already gone.
    pub fn send(&self, text: String) -> bool {
        self.tx.send(Outbound::Frame(text)).is_ok()
    }

    pub fn send_payload(&self, payload: &GatewayPayload) -> bool {
        match events::encode(payload) {
            Ok(text) => {
                let sent = self.send(text);
                if !sent {
                    tracing::debug!("dropped op {} on a closed socket", payload.op);
                }
                sent
            }
            Err(e) => {
                tracing::error!("failed to encode op {}: {e}", payload.op);
                false
            }
        }
    }

    pub fn close(&self, code: u16) -> bool {
        self.tx.send(Outbound::Close(code)).is_ok()
    }
}

/// Opens sockets for the state machine.
///
/// `open` must not block: the connection is established in the background
/// and its progress reported through `events`. Frames queued on the returned
/// handle before the socket is open are sent once it is.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str, events: SocketEvents) -> SocketHandle;
}

/// Connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: &str, events: SocketEvents) -> SocketHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.to_string(), events, rx));
        SocketHandle::new(tx)
    }
}

async fn run_socket(url: String, events: SocketEvents, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::warn!("failed to connect to {url}: {e}");
            events.closed(close_code::ABNORMAL);
            return;
        }
    };
    let (mut ws_sink, mut ws_stream) = ws.split();
    if !events.opened() {
        return;
    }

    loop {
        tokio::select! {
            out = rx.recv() => {
                match out {
                    Some(Outbound::Frame(text)) => {
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            tracing::debug!("socket send failed: {e}");
                            events.closed(close_code::ABNORMAL);
                            return;
                        }
                    }
                    Some(Outbound::Close(code)) => {
                        let frame = CloseFrame {
                            code: code.into(),
                            reason: "".into(),
                        };
                        let _ = ws_sink.send(Message::Close(Some(frame))).await;
                        return;
                    }
                    // The state machine let go of this socket
                    None => {
                        let _ = ws_sink.close().await;
                        return;
                    }
                }
            }
            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        events.message(Frame::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        events.message(Frame::Binary(bytes.to_vec()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map_or(close_code::NO_STATUS, |f| f.code.into());
                        events.closed(code);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("socket read failed: {e}");
                        events.closed(close_code::ABNORMAL);
                        return;
                    }
                    None => {
                        events.closed(close_code::ABNORMAL);
                        return;
                    }
                }
            }
        }
    }
}
