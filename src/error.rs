use crate::config::ConfigError;
use crate::gateway::session::ConnectionState;
use crate::http::HttpError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid gateway url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("gateway is already {0}")]
    AlreadyConnected(ConnectionState),
    #[error("gateway is not connected")]
    NotConnected,
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("binary frame is not utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("gateway task has stopped")]
    Stopped,
}

/// Anything the high-level client can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Http(#[from] HttpError),
}
