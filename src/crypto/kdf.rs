//! Key and magic-marker derivation.
//!
//! Everything on an obfs3 connection is derived from the UniformDH shared
//! secret with HMAC-SHA256 keyed by that secret over a fixed label string.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::crypto::{SharedSecret, StreamCipher, HASH_LEN, IV_LEN, KEY_LEN};

/// Compute HMAC-SHA256 of `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HASH_LEN] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Derive a directional stream cipher from the shared secret.
///
/// The first [`KEY_LEN`] bytes of the digest are the AES key, the remaining
/// [`IV_LEN`] bytes seed the counter.
pub fn derive_cipher(shared_secret: &SharedSecret, label: &[u8]) -> StreamCipher {
    let mut secret = hmac_sha256(shared_secret.as_bytes(), label);

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&secret[..KEY_LEN]);
    iv.copy_from_slice(&secret[KEY_LEN..]);
    let cipher = StreamCipher::new(&key, &iv);

    secret.zeroize();
    key.zeroize();
    iv.zeroize();
    cipher
}

/// Derive the magic marker that proves possession of the shared secret.
pub fn derive_magic(shared_secret: &SharedSecret, label: &[u8]) -> [u8; HASH_LEN] {
    hmac_sha256(shared_secret.as_bytes(), label)
}
