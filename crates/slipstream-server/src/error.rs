//! Server error types.

use slipstream_proto::ProtocolError;
use thiserror::Error;

/// Errors that can occur in the relay server.
///
/// Background workers never propagate these across task boundaries; a worker
/// that hits a problem calls `Sequencer::disconnect` on the affected client
/// instead.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error. Fatal before the first accept; fix the
    /// configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Admission rejected because the server is at capacity. Not logged as a
    /// crash.
    #[error("server is full")]
    ServerFull,

    /// Admission rejected because the peer address is banned.
    #[error("banned: {0}")]
    Banned(String),

    /// A client sent malformed data. Fatal for that connection only.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// The handshake did not complete (timeout, unexpected frame).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Socket-level I/O failure.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// A script callback failed. Logged and ignored; never aborts a client.
    #[error("script error: {0}")]
    Script(String),
}
