use super::events::{self, ConnectionProperties, IdentifyData, PresenceUpdate, ResumeData};
use super::session::{ConnectionState, Session};
use super::socket::SocketHandle;
use super::GatewayConfig;

/// Which handshake was sent after HELLO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Identify,
    Resume { session_id: String, sequence: u64 },
}

/// Drives the HELLO -> IDENTIFY/RESUME exchange.
#[derive(Debug)]
pub struct HandshakeController {
    token: String,
    shard: [u32; 2],
    large_threshold: u8,
    properties: ConnectionProperties,
    presence: PresenceUpdate,
}

impl HandshakeController {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            token: config.token.clone(),
            shard: config.shard,
            large_threshold: config.large_threshold,
            properties: config.properties.clone(),
            presence: config.presence.clone(),
        }
    }

    /// Answer HELLO. A `Reconnecting` session resumes when it has both a
    /// session id and a sequence; anything else identifies from scratch,
    /// which drops the old continuity data and moves the session back to
    /// `Connecting`.
    pub fn begin(&self, session: &mut Session, socket: Option<&SocketHandle>) -> Handshake {
        if session.state == ConnectionState::Reconnecting {
            if let Some((session_id, sequence)) = session.resume_point() {
                let handshake = Handshake::Resume {
                    session_id: session_id.to_string(),
                    sequence,
                };
                tracing::info!("resuming session {session_id} at sequence {sequence}");
                send(
                    socket,
                    &events::resume(&ResumeData {
                        token: &self.token,
                        session_id,
                        seq: sequence,
                    }),
                );
                return handshake;
            }
            tracing::info!("nothing to resume, identifying instead");
        }

        session.clear();
        session.state = ConnectionState::Connecting;
        tracing::info!("identifying as shard {}/{}", self.shard[0], self.shard[1]);
        send(
            socket,
            &events::identify(&IdentifyData {
                token: &self.token,
                properties: &self.properties,
                compress: false,
                large_threshold: self.large_threshold,
                shard: self.shard,
                presence: &self.presence,
                intents: session.intents(),
            }),
        );
        Handshake::Identify
    }
}

fn send(socket: Option<&SocketHandle>, payload: &events::GatewayPayload) {
    match socket {
        Some(socket) => {
            socket.send_payload(payload);
        }
        None => tracing::debug!("no socket to send op {} on", payload.op),
    }
}
