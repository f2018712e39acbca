use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket. Initial and terminal.
    Shutdown,
    /// Socket open, full identify pending.
    Connecting,
    /// Identify or resume acknowledged.
    Connected,
    /// Socket open or opening, resume pending.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Shutdown => "shutdown",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Continuity data for one gateway session, kept across reconnects.
#[derive(Debug)]
pub struct Session {
    pub state: ConnectionState,
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub resume_url: Option<String>,
    intents: u64,
}

impl Session {
    pub fn new(intents: u64) -> Self {
        Self {
            state: ConnectionState::Shutdown,
            sequence: None,
            session_id: None,
            resume_url: None,
            intents,
        }
    }

    pub fn intents(&self) -> u64 {
        self.intents
    }

    /// Record the sequence number of an inbound payload. Never moves backwards.
    pub fn observe_sequence(&mut self, seq: u64) {
        match self.sequence {
            Some(last) if seq < last => {
                tracing::warn!("ignoring sequence {seq} older than {last}");
            }
            _ => self.sequence = Some(seq),
        }
    }

    /// Session id and sequence, if both are known.
    pub fn resume_point(&self) -> Option<(&str, u64)> {
        Some((self.session_id.as_deref()?, self.sequence?))
    }

    /// Forget everything a resume would need.
    pub fn clear(&mut self) {
        self.sequence = None;
        self.session_id = None;
        self.resume_url = None;
    }

    pub fn snapshot(&self, heartbeat_acked: bool) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            sequence: self.sequence,
            session_id: self.session_id.clone(),
            resume_url: self.resume_url.clone(),
            intents: self.intents,
            heartbeat_acked,
        }
    }
}

/// Point-in-time copy of the session, published after every gateway event.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub sequence: Option<u64>,
    pub session_id: Option<String>,
    pub resume_url: Option<String>,
    pub intents: u64,
    pub heartbeat_acked: bool,
}
