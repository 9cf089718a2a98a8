//! Cryptographic primitives for Bramble.
//!
//! Provides domain-separated BLAKE3 hashing of stored objects, P-256 ECDH
//! key agreement with the three-key derivation used by remote execution,
//! AES-256-GCM-SIV sealing, and PEM certificate chain parsing.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod aead;
pub mod certificate;
pub mod error;
pub mod hasher;
pub mod keys;

pub use aead::{action_digest, random_nonce, AeadKey, Nonce, NONCE_SIZE};
pub use certificate::parse_certificate_chain;
pub use error::{CryptoError, CryptoResult};
pub use hasher::ContentHasher;
pub use keys::{
    derive_execution_keys, marshal_public_key, parse_private_key_pem, unmarshal_public_key,
    ExecutionKeys, PrivateKey, PublicKey,
};
