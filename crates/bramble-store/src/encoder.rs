use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A reversible transformation applied to serialized messages before they
/// are hashed and stored.
///
/// `encode_binary` returns the encoded bytes together with decoding
/// parameters. Encoders used for objects inside trees must be
/// deterministic and produce empty decoding parameters, since tree nodes
/// only carry the child's [`LocalReference`](bramble_types::LocalReference).
pub trait BinaryEncoder: Send + Sync + std::fmt::Debug {
    fn encode_binary(&self, data: &[u8]) -> StoreResult<(Vec<u8>, Vec<u8>)>;

    fn decode_binary(&self, data: &[u8], decoding_parameters: &[u8]) -> StoreResult<Vec<u8>>;
}

/// Stores serialized messages as-is.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityEncoder;

impl BinaryEncoder for IdentityEncoder {
    fn encode_binary(&self, data: &[u8]) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        Ok((data.to_vec(), Vec::new()))
    }

    fn decode_binary(&self, data: &[u8], decoding_parameters: &[u8]) -> StoreResult<Vec<u8>> {
        if !decoding_parameters.is_empty() {
            return Err(StoreError::Encoding(
                "identity encoding takes no decoding parameters".into(),
            ));
        }
        Ok(data.to_vec())
    }
}

/// Compresses serialized messages with zstd.
#[derive(Clone, Copy, Debug)]
pub struct ZstdEncoder {
    level: i32,
}

impl ZstdEncoder {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdEncoder {
    fn default() -> Self {
        Self::new(3)
    }
}

impl BinaryEncoder for ZstdEncoder {
    fn encode_binary(&self, data: &[u8]) -> StoreResult<(Vec<u8>, Vec<u8>)> {
        let compressed =
            zstd::encode_all(data, self.level).map_err(|e| StoreError::Encoding(e.to_string()))?;
        Ok((compressed, Vec::new()))
    }

    fn decode_binary(&self, data: &[u8], decoding_parameters: &[u8]) -> StoreResult<Vec<u8>> {
        if !decoding_parameters.is_empty() {
            return Err(StoreError::Encoding(
                "zstd encoding takes no decoding parameters".into(),
            ));
        }
        zstd::decode_all(data).map_err(|e| StoreError::Encoding(e.to_string()))
    }
}

/// Serializable selection of a [`BinaryEncoder`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncoderConfig {
    #[default]
    Identity,
    Zstd {
        level: i32,
    },
}

impl EncoderConfig {
    pub fn build(&self) -> Arc<dyn BinaryEncoder> {
        match *self {
            Self::Identity => Arc::new(IdentityEncoder),
            Self::Zstd { level } => Arc::new(ZstdEncoder::new(level)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_roundtrip() {
        let (encoded, params) = IdentityEncoder.encode_binary(b"data").unwrap();
        assert_eq!(encoded, b"data");
        assert!(params.is_empty());
        assert_eq!(IdentityEncoder.decode_binary(&encoded, &params).unwrap(), b"data");
    }

    #[test]
    fn identity_rejects_parameters() {
        assert!(IdentityEncoder.decode_binary(b"data", b"x").is_err());
    }

    #[test]
    fn zstd_compresses_repetitive_data() {
        let data = vec![b'a'; 4096];
        let (encoded, params) = ZstdEncoder::default().encode_binary(&data).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(ZstdEncoder::default().decode_binary(&encoded, &params).unwrap(), data);
    }

    #[test]
    fn zstd_rejects_garbage() {
        assert!(ZstdEncoder::default().decode_binary(b"not zstd", &[]).is_err());
    }

    #[test]
    fn config_builds_encoder() {
        let encoder = EncoderConfig::Zstd { level: 1 }.build();
        let (encoded, params) = encoder.encode_binary(b"hello hello hello").unwrap();
        assert_eq!(encoder.decode_binary(&encoded, &params).unwrap(), b"hello hello hello");
    }
}
