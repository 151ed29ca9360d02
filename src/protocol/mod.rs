//! obfs3 handshake and framing.
//!
//! ## Wire Format
//!
//! ```text
//! Both ends, on connect:
//!   PUBKEY (192) | PADDING (0..=4097)
//!
//! Both ends, after reading the peer's PUBKEY:
//!   PADDING (0..=4097) | MAGIC (32) | E(queued data)
//!
//! Afterwards:
//!   E(data)
//! ```
//!
//! Nothing on the wire carries a length. The receiver finds the end of the
//! peer's padding by searching for the magic value it expects, and gives up
//! once more than `MAX_PADDING + HASH_LEN` bytes arrive without one.
//!
//! ## State Machine
//!
//! ```text
//! AwaitingPeerKey ──(192 bytes)──> SearchingForMarker ──(magic)──> Open
//! ```

mod buffer;
mod engine;
mod role;

pub use buffer::{BufferedCircuit, Circuit, ReceiveBuffer};
pub use engine::{Obfs3, State};
pub use role::{
    Labels, Role, INITIATOR_DATA_LABEL, INITIATOR_MAGIC_LABEL, RESPONDER_DATA_LABEL,
    RESPONDER_MAGIC_LABEL,
};

use crate::crypto::HASH_LEN;
use crate::error::{Error, Result};

/// Padding budget shared by both handshake messages.
pub const MAX_PADDING: usize = 8194;

/// Largest padding a single message may carry.
pub const MAX_MESSAGE_PADDING: usize = MAX_PADDING / 2;

/// Most bytes buffered while searching for the magic before giving up.
pub const MAX_MAGIC_SEARCH: usize = MAX_PADDING + HASH_LEN;

/// Configuration for an obfs3 engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound (inclusive) on random padding per handshake message
    pub max_padding: usize,
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_padding > MAX_MESSAGE_PADDING {
            return Err(Error::config(format!(
                "max_padding {} exceeds {}",
                self.max_padding, MAX_MESSAGE_PADDING
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_padding: MAX_MESSAGE_PADDING,
        }
    }
}
