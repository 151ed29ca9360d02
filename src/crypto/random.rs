//! Secure random number generation.
//!
//! Provides cryptographically secure random bytes using the operating
//! system's entropy source.

use rand::Rng;
use rand_core::{OsRng, RngCore};

/// Cryptographically secure random number generator.
///
/// Wraps the OS-provided entropy source (e.g., /dev/urandom on Unix,
/// BCryptGenRandom on Windows).
pub struct SecureRandom;

impl SecureRandom {
    /// Fill a buffer with cryptographically secure random bytes.
    pub fn fill(dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }

    /// Generate a fixed-size array of random bytes.
    pub fn bytes<const N: usize>() -> [u8; N] {
        let mut buf = [0u8; N];
        OsRng.fill_bytes(&mut buf);
        buf
    }

    /// Pick a padding length uniformly from `0..=max`.
    pub fn padding_len(max: usize) -> usize {
        OsRng.gen_range(0..=max)
    }
}

/// Generate random padding of the specified length.
///
/// The padding is filled with random bytes so that it cannot be told apart
/// from key material or ciphertext.
pub fn random_padding(len: usize) -> Vec<u8> {
    let mut padding = vec![0u8; len];
    SecureRandom::fill(&mut padding);
    padding
}
