/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid symmetric key length")]
    InvalidKeyLength,

    #[error("encryption failed")]
    SealFailed,

    /// Ciphertext, nonce or associated data did not authenticate.
    #[error("decryption failed: ciphertext could not be authenticated")]
    OpenFailed,

    #[error("invalid PEM data: {0}")]
    InvalidPem(String),

    #[error("PEM block has type {0:?}, while \"CERTIFICATE\" was expected")]
    UnexpectedPemBlock(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
