use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::Aes256GcmSiv;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};

/// Size of an AES-GCM-SIV nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// A fixed-size AEAD nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// The all-zero nonce. Only safe with keys that are used exactly once.
    pub const fn zero() -> Self {
        Self([0u8; NONCE_SIZE])
    }

    pub const fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a nonce received over the wire.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; NONCE_SIZE] = bytes.try_into().map_err(|_| CryptoError::OpenFailed)?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({})", hex::encode(self.0))
    }
}

/// Generate a random nonce.
pub fn random_nonce() -> Nonce {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut bytes);
    Nonce(bytes)
}

/// SHA-256 digest of an action ciphertext.
///
/// Used as associated data for every event and completion sealed for that
/// action, which binds them to this specific action instance.
pub fn action_digest(action_ciphertext: &[u8]) -> [u8; 32] {
    Sha256::digest(action_ciphertext).into()
}

/// A 256-bit AES-GCM-SIV key.
#[derive(Clone)]
pub struct AeadKey([u8; 32]);

impl AeadKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn cipher(&self) -> CryptoResult<Aes256GcmSiv> {
        Aes256GcmSiv::new_from_slice(&self.0).map_err(|_| CryptoError::InvalidKeyLength)
    }

    /// Encrypt and authenticate `plaintext`, binding `associated_data`.
    pub fn seal(
        &self,
        nonce: &Nonce,
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        self.cipher()?
            .encrypt(
                aes_gcm_siv::Nonce::from_slice(&nonce.0),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::SealFailed)
    }

    /// Authenticate and decrypt `ciphertext`.
    pub fn open(
        &self,
        nonce: &Nonce,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        self.cipher()?
            .decrypt(
                aes_gcm_siv::Nonce::from_slice(&nonce.0),
                Payload {
                    msg: ciphertext,
                    aad: associated_data,
                },
            )
            .map_err(|_| CryptoError::OpenFailed)
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AeadKey(<redacted>)")
    }
}
