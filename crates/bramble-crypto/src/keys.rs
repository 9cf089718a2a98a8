use p256::ecdh::diffie_hellman;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};

use crate::aead::AeadKey;
use crate::error::{CryptoError, CryptoResult};

/// Long-term or ephemeral P-256 private key.
pub type PrivateKey = p256::SecretKey;

/// P-256 public key.
pub type PublicKey = p256::PublicKey;

/// The three symmetric keys used over the lifetime of one action.
///
/// All three come from a single ECDH exchange. They differ only in the
/// low-order byte of the shared secret, which is XORed with 1, 2 and 3.
pub struct ExecutionKeys {
    /// Encrypts the action. Used once, with the all-zero nonce.
    pub action: AeadKey,
    /// Encrypts every progress event streamed back by the worker.
    pub event: AeadKey,
    /// Encrypts the final completion event.
    pub completion: AeadKey,
}

impl std::fmt::Debug for ExecutionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExecutionKeys(<redacted>)")
    }
}

/// Derive the action, event and completion keys shared between
/// `private_key`'s owner and `peer`.
///
/// Both sides of the exchange obtain identical keys, regardless of which
/// side holds which private key.
pub fn derive_execution_keys(private_key: &PrivateKey, peer: &PublicKey) -> ExecutionKeys {
    let shared = diffie_hellman(private_key.to_nonzero_scalar(), peer.as_affine());
    let mut secret = [0u8; 32];
    secret.copy_from_slice(shared.raw_secret_bytes().as_slice());

    let derive = |flip: u8| {
        let mut key = secret;
        key[31] ^= flip;
        AeadKey::from_bytes(key)
    };
    ExecutionKeys {
        action: derive(1),
        event: derive(2),
        completion: derive(3),
    }
}

/// Marshal a public key as PKIX (SubjectPublicKeyInfo) DER.
pub fn marshal_public_key(key: &PublicKey) -> CryptoResult<Vec<u8>> {
    let document = key
        .to_public_key_der()
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(document.as_bytes().to_vec())
}

/// Parse a PKIX (SubjectPublicKeyInfo) DER public key.
pub fn unmarshal_public_key(der: &[u8]) -> CryptoResult<PublicKey> {
    PublicKey::from_public_key_der(der).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Parse a PEM-encoded EC private key, either as PKCS#8 (`PRIVATE KEY`) or
/// SEC1 (`EC PRIVATE KEY`).
pub fn parse_private_key_pem(pem: &str) -> CryptoResult<PrivateKey> {
    if let Ok(key) = PrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    PrivateKey::from_sec1_pem(pem).map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aead::Nonce;
    use p256::pkcs8::{EncodePrivateKey, LineEnding};

    fn generate() -> PrivateKey {
        PrivateKey::random(&mut rand::thread_rng())
    }

    #[test]
    fn both_sides_derive_identical_keys() {
        let client = generate();
        let worker = generate();
        let client_keys = derive_execution_keys(&client, &worker.public_key());
        let worker_keys = derive_execution_keys(&worker, &client.public_key());

        let nonce = Nonce::zero();
        let sealed = client_keys.action.seal(&nonce, b"action", b"ad").unwrap();
        assert_eq!(
            worker_keys.action.open(&nonce, &sealed, b"ad").unwrap(),
            b"action"
        );
    }

    #[test]
    fn derived_keys_are_distinct() {
        let keys = derive_execution_keys(&generate(), &generate().public_key());
        let nonce = Nonce::zero();
        let sealed = keys.action.seal(&nonce, b"payload", b"").unwrap();
        assert!(keys.event.open(&nonce, &sealed, b"").is_err());
        assert!(keys.completion.open(&nonce, &sealed, b"").is_err());
    }

    #[test]
    fn public_key_der_roundtrip() {
        let key = generate().public_key();
        let der = marshal_public_key(&key).unwrap();
        assert_eq!(unmarshal_public_key(&der).unwrap(), key);
    }

    #[test]
    fn unmarshal_rejects_garbage() {
        let err = unmarshal_public_key(b"not a key").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPublicKey(_)));
    }

    #[test]
    fn private_key_pkcs8_pem() {
        let key = generate();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        let parsed = parse_private_key_pem(&pem).unwrap();
        assert_eq!(parsed.public_key(), key.public_key());
    }

    #[test]
    fn private_key_sec1_pem() {
        let key = generate();
        let pem = key.to_sec1_pem(LineEnding::LF).unwrap();
        let parsed = parse_private_key_pem(&pem).unwrap();
        assert_eq!(parsed.public_key(), key.public_key());
    }

    #[test]
    fn private_key_rejects_garbage() {
        let err = parse_private_key_pem("-----BEGIN NOTHING-----").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidPrivateKey(_)));
    }
}
