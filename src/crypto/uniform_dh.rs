//! UniformDH key agreement.
//!
//! Diffie-Hellman over the 1536-bit MODP group from RFC 3526 (generator 2),
//! with public keys encoded so that they are indistinguishable from uniform
//! random 192-byte strings. The private exponent is always even; the
//! discarded low bit instead decides whether `g^x` or `p - g^x` is sent.
//! Because the exponent is even, both encodings raise to the same shared
//! secret on the peer's side.

use std::fmt;
use std::sync::OnceLock;

use num_bigint::BigUint;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{SecureRandom, PUBKEY_LEN};
use crate::error::{Error, Result};

const MODP_1536_PRIME: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD1",
    "29024E088A67CC74020BBEA63B139B22514A08798E3404DD",
    "EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
    "E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
    "C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
    "83655D23DCA3AD961C62F356208552BB9ED529077096966D",
    "670C354E4ABC9804F1746C08CA237327FFFFFFFFFFFFFFFF",
);

const GENERATOR: u32 = 2;

fn modulus() -> &'static BigUint {
    static MODULUS: OnceLock<BigUint> = OnceLock::new();
    MODULUS.get_or_init(|| {
        BigUint::parse_bytes(MODP_1536_PRIME.as_bytes(), 16).expect("MODP prime is valid hex")
    })
}

/// Encode a group element as a fixed-width big-endian byte string.
fn to_fixed_be(value: &BigUint) -> [u8; PUBKEY_LEN] {
    let mut bytes = value.to_bytes_be();
    let mut out = [0u8; PUBKEY_LEN];
    out[PUBKEY_LEN - bytes.len()..].copy_from_slice(&bytes);
    bytes.zeroize();
    out
}

/// A single-use UniformDH key pair.
///
/// The private key bytes are zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct UniformDh {
    private: [u8; PUBKEY_LEN],
    #[zeroize(skip)]
    public: [u8; PUBKEY_LEN],
}

impl UniformDh {
    /// Generate a fresh key pair from the OS entropy source.
    pub fn new() -> Self {
        Self::from_private_bytes(SecureRandom::bytes())
    }

    /// Build a key pair from 192 bytes of private key material.
    ///
    /// The low bit of the material selects the public-key encoding and is
    /// cleared before use as the exponent.
    pub fn from_private_bytes(mut private: [u8; PUBKEY_LEN]) -> Self {
        let flip = private[PUBKEY_LEN - 1] & 1 == 1;
        private[PUBKEY_LEN - 1] &= !1;

        let p = modulus();
        let exponent = BigUint::from_bytes_be(&private);
        let mut public = BigUint::from(GENERATOR).modpow(&exponent, p);
        if flip {
            public = p - public;
        }

        Self {
            private,
            public: to_fixed_be(&public),
        }
    }

    /// The public key to send to the peer.
    pub fn public_key(&self) -> &[u8; PUBKEY_LEN] {
        &self.public
    }

    /// Compute the shared secret from the peer's public key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedPublicKey`] if the key is not exactly
    /// [`PUBKEY_LEN`] bytes or does not encode a value in `[2, p - 2]`.
    pub fn shared_secret(&self, peer_public: &[u8]) -> Result<SharedSecret> {
        if peer_public.len() != PUBKEY_LEN {
            return Err(Error::CorruptedPublicKey(peer_public.to_vec()));
        }

        let p = modulus();
        let peer = BigUint::from_bytes_be(peer_public);
        let upper = p - 2u32;
        if peer < BigUint::from(2u32) || peer > upper {
            return Err(Error::CorruptedPublicKey(peer_public.to_vec()));
        }

        let exponent = BigUint::from_bytes_be(&self.private);
        let secret = peer.modpow(&exponent, p);
        Ok(SharedSecret(to_fixed_be(&secret)))
    }
}

impl Default for UniformDh {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UniformDh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformDh")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

/// The result of a UniformDH key exchange.
///
/// Root of every key and marker on the connection. Automatically zeroized
/// when dropped and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; PUBKEY_LEN]);

impl SharedSecret {
    /// Get the raw shared secret bytes.
    ///
    /// # Security
    ///
    /// This should be fed into HMAC before use as a key.
    pub fn as_bytes(&self) -> &[u8; PUBKEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}
