//! Cryptographic primitives for obfs3.
//!
//! This module provides:
//! - UniformDH key agreement over the 1536-bit MODP group
//! - HMAC-SHA256 key and magic-marker derivation
//! - AES-128-CTR stream encryption
//! - Secure random number generation
//!
//! Private keys, shared secrets and derived key bytes are zeroized on drop.
//! Big-integer temporaries inside UniformDH are freed without being wiped,
//! since `num-bigint` gives no access to their limbs.

pub mod kdf;
mod cipher;
mod random;
mod uniform_dh;

pub use cipher::StreamCipher;
pub use kdf::{derive_cipher, derive_magic, hmac_sha256};
pub use random::{random_padding, SecureRandom};
pub use uniform_dh::{SharedSecret, UniformDh};

/// Size of a UniformDH public key (and shared secret) in bytes (1536 bits)
pub const PUBKEY_LEN: usize = 192;

/// Size of the AES-128 key used by the stream cipher
pub const KEY_LEN: usize = 16;

/// Size of the AES-CTR initial counter block
pub const IV_LEN: usize = 16;

/// Size of HMAC-SHA256 output
pub const HASH_LEN: usize = 32;
