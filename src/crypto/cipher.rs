//! AES-128 in counter mode.
//!
//! The counter block is the full 128-bit IV, incremented big-endian, so
//! the keystream is a pure function of `(key, iv, position)`. Each call to
//! [`StreamCipher::crypt`] continues where the previous one stopped.

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher as _};

use crate::crypto::{IV_LEN, KEY_LEN};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Stateful AES-128-CTR keystream.
///
/// Encryption and decryption are the same operation.
pub struct StreamCipher {
    inner: Aes128Ctr,
    position: u64,
}

impl StreamCipher {
    /// Create a cipher positioned at the start of its keystream.
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner: Aes128Ctr::new(key.into(), iv.into()),
            position: 0,
        }
    }

    /// Transform `data`, advancing the keystream by `data.len()` bytes.
    pub fn crypt(&mut self, data: &[u8]) -> Vec<u8> {
        let mut buf = data.to_vec();
        self.crypt_in_place(&mut buf);
        buf
    }

    /// Transform `buf` in place to avoid allocation.
    pub fn crypt_in_place(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
        self.position += buf.len() as u64;
    }
}

impl fmt::Debug for StreamCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCipher")
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}
