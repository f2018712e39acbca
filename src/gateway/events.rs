use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::GatewayError;
use crate::models::guild::UnavailableGuild;

use super::socket::Frame;

/// Opcodes for gateway messages.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const PRESENCE_UPDATE: u8 = 3;
    pub const VOICE_STATE_UPDATE: u8 = 4;
    // 5 is not assigned by the protocol
    pub const RESUME: u8 = 6;
    pub const RECONNECT: u8 = 7;
    pub const REQUEST_GUILD_MEMBERS: u8 = 8;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;

    pub fn name(op: u8) -> &'static str {
        match op {
            DISPATCH => "Dispatch",
            HEARTBEAT => "Heartbeat",
            IDENTIFY => "Identify",
            PRESENCE_UPDATE => "PresenceUpdate",
            VOICE_STATE_UPDATE => "VoiceStateUpdate",
            RESUME => "Resume",
            RECONNECT => "Reconnect",
            REQUEST_GUILD_MEMBERS => "RequestGuildMembers",
            INVALID_SESSION => "InvalidSession",
            HELLO => "Hello",
            HEARTBEAT_ACK => "HeartbeatAck",
            _ => "Unknown",
        }
    }
}

/// Dispatch event names the state machine acts on itself.
pub mod event_name {
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
}

/// Gateway message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
}

impl GatewayPayload {
    /// An outbound payload. Clients never set `s` or `t`.
    pub fn new(op: u8, d: serde_json::Value) -> Self {
        Self { op, d, s: None, t: None }
    }

    /// Narrow an opcode-0 payload into a dispatch. Returns `None` for other
    /// opcodes and for dispatches missing their sequence or event name.
    pub fn into_dispatch(self) -> Option<DispatchPayload> {
        if self.op != opcode::DISPATCH {
            return None;
        }
        Some(DispatchPayload {
            sequence: self.s?,
            event_name: self.t?,
            data: self.d,
        })
    }
}

/// An event pushed by the server. Sequence and event name are always present.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPayload {
    pub sequence: u64,
    pub event_name: String,
    pub data: serde_json::Value,
}

/// HELLO (opcode 10) payload data.
#[derive(Debug, Deserialize)]
pub struct HelloData {
    pub heartbeat_interval: u64,
}

/// READY dispatch data.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyData {
    #[serde(default)]
    pub v: u8,
    #[serde(default)]
    pub user: Option<ReadyUser>,
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    pub session_id: String,
    pub resume_gateway_url: String,
    #[serde(default)]
    pub shard: Option<[u32; 2]>,
    #[serde(default)]
    pub application: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadyUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "disco".to_string(),
            device: "disco".to_string(),
        }
    }
}

/// PRESENCE_UPDATE (opcode 3) payload data, also embedded in IDENTIFY.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceUpdate {
    pub since: Option<u64>,
    pub activities: Vec<serde_json::Value>,
    pub status: String,
    pub afk: bool,
}

impl Default for PresenceUpdate {
    fn default() -> Self {
        Self {
            since: None,
            activities: Vec::new(),
            status: "online".to_string(),
            afk: false,
        }
    }
}

/// IDENTIFY (opcode 2) payload data.
#[derive(Debug, Serialize)]
pub struct IdentifyData<'a> {
    pub token: &'a str,
    pub properties: &'a ConnectionProperties,
    pub compress: bool,
    pub large_threshold: u8,
    pub shard: [u32; 2],
    pub presence: &'a PresenceUpdate,
    pub intents: u64,
}

/// RESUME (opcode 6) payload data.
#[derive(Debug, Serialize)]
pub struct ResumeData<'a> {
    pub token: &'a str,
    pub session_id: &'a str,
    pub seq: u64,
}

/// REQUEST_GUILD_MEMBERS (opcode 8) payload data.
#[derive(Debug, Clone, Serialize)]
pub struct RequestGuildMembers {
    pub guild_id: String,
    pub query: String,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl RequestGuildMembers {
    /// Request every member of `guild_id`, tagged with a fresh nonce so the
    /// GUILD_MEMBERS_CHUNK replies can be matched up.
    pub fn all(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            query: String::new(),
            limit: 0,
            nonce: Some(crate::snowflake::generate()),
        }
    }
}

pub fn decode(frame: &Frame) -> Result<GatewayPayload, GatewayError> {
    let text = match frame {
        Frame::Text(text) => text.as_str(),
        Frame::Binary(bytes) => std::str::from_utf8(bytes)?,
    };
    Ok(serde_json::from_str(text)?)
}

pub fn encode(payload: &GatewayPayload) -> Result<String, GatewayError> {
    Ok(serde_json::to_string(payload)?)
}

pub fn heartbeat(sequence: Option<u64>) -> GatewayPayload {
    GatewayPayload::new(opcode::HEARTBEAT, serde_json::json!(sequence))
}

pub fn identify(data: &IdentifyData<'_>) -> GatewayPayload {
    GatewayPayload::new(opcode::IDENTIFY, serde_json::json!(data))
}

pub fn resume(data: &ResumeData<'_>) -> GatewayPayload {
    GatewayPayload::new(opcode::RESUME, serde_json::json!(data))
}

/// Build the URL for a connect attempt: `base` with the protocol version and
/// JSON encoding selected, replacing any values already present.
pub fn gateway_url(base: &str, version: u8) -> Result<Url, GatewayError> {
    let mut url = Url::parse(base).map_err(|source| GatewayError::InvalidUrl {
        url: base.to_string(),
        source,
    })?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "v" && k != "encoding")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("v", &version.to_string())
        .append_pair("encoding", "json");
    Ok(url)
}
