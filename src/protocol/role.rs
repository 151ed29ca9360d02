//! Initiator and responder parameterization.
//!
//! The two ends of a connection run the same engine and differ only in
//! which labels they feed to HMAC when deriving keys and magic markers.

use std::fmt;

/// Label for the key protecting data sent by the initiator.
pub const INITIATOR_DATA_LABEL: &[u8] = b"Initiator obfuscated data";

/// Label for the key protecting data sent by the responder.
pub const RESPONDER_DATA_LABEL: &[u8] = b"Responder obfuscated data";

/// Label for the marker the initiator sends.
pub const INITIATOR_MAGIC_LABEL: &[u8] = b"Initiator magic";

/// Label for the marker the responder sends.
pub const RESPONDER_MAGIC_LABEL: &[u8] = b"Responder magic";

/// Which end of the connection an engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The connecting side (client).
    Initiator,
    /// The accepting side (server).
    Responder,
}

/// HMAC labels selected by a [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    /// Key for outgoing data
    pub send_key: &'static [u8],
    /// Key for incoming data
    pub recv_key: &'static [u8],
    /// Marker we send
    pub send_magic: &'static [u8],
    /// Marker we expect from the peer
    pub recv_magic: &'static [u8],
}

impl Role {
    /// Labels used by this role.
    pub fn labels(self) -> Labels {
        match self {
            Role::Initiator => Labels {
                send_key: INITIATOR_DATA_LABEL,
                recv_key: RESPONDER_DATA_LABEL,
                send_magic: INITIATOR_MAGIC_LABEL,
                recv_magic: RESPONDER_MAGIC_LABEL,
            },
            Role::Responder => Labels {
                send_key: RESPONDER_DATA_LABEL,
                recv_key: INITIATOR_DATA_LABEL,
                send_magic: RESPONDER_MAGIC_LABEL,
                recv_magic: INITIATOR_MAGIC_LABEL,
            },
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}
