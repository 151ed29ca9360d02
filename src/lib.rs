//! # obfs3
//!
//! A stream obfuscation layer that makes an application byte stream look
//! like uniformly random bytes on the wire, so passive observers cannot
//! fingerprint the protocol inside.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Application (upstream, plaintext)               │
//! ├─────────────────────────────────────────────────────────┤
//! │  Proxy (tokio TCP listener, one relay task per conn)    │
//! ├─────────────────────────────────────────────────────────┤
//! │  Protocol Engine (handshake, magic search, relay)       │
//! ├─────────────────────────────────────────────────────────┤
//! │  Crypto Layer (UniformDH, HMAC-SHA256, AES-128-CTR)     │
//! ├─────────────────────────────────────────────────────────┤
//! │          Network (downstream, obfuscated)                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`protocol::Obfs3`] engine is sans-I/O: it consumes bytes from a
//! [`protocol::ReceiveBuffer`] and writes into a [`protocol::Circuit`].
//! The [`proxy`] module drives it over TCP.
//!
//! ## Design Goals
//!
//! 1. **Unobservability**: Every byte on the wire is key material, padding or ciphertext
//! 2. **Forward Secrecy**: A fresh UniformDH key pair per connection
//! 3. **No Extra Round Trip**: Data written during the handshake rides along with the magic

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod crypto;
pub mod error;
pub mod protocol;

#[cfg(feature = "proxy")]
pub mod proxy;

pub use error::{Error, Result};
pub use protocol::{EngineConfig, Obfs3, Role, State};
