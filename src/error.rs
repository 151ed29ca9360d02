//! Error types for the obfs3 protocol.

use thiserror::Error;

/// Result type alias for obfs3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running an obfs3 connection.
#[derive(Error, Debug)]
pub enum Error {
    /// The peer's public key could not be used for key agreement.
    ///
    /// Carries the offending bytes for diagnostics.
    #[error("corrupted public key '{}'", hex::encode(.0))]
    CorruptedPublicKey(Vec<u8>),

    /// The peer sent more padding than the scan budget allows without a
    /// valid magic marker.
    #[error("too much padding ({0} bytes)")]
    TooMuchPadding(usize),

    /// The handshake message was requested twice on the same connection.
    #[error("handshake message already sent")]
    HandshakeAlreadySent,

    /// Connection timeout
    #[error("connection timeout after {0}ms")]
    Timeout(u64),

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if the peer violated the wire protocol.
    ///
    /// These are the conditions the surrounding transport must answer by
    /// tearing the connection down.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Error::CorruptedPublicKey(_) | Error::TooMuchPadding(_))
    }
}
