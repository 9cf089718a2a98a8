use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Scheme used to compute the hash inside a [`LocalReference`].
///
/// Only one format exists today. The enum is carried in encoding options so
/// that objects created under a future format can never be confused with
/// objects created under this one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceFormat {
    /// Domain-separated BLAKE3 over the object's outgoing references and
    /// encoded data.
    #[default]
    Blake3V1,
}

impl ReferenceFormat {
    /// Domain tag mixed into every hash computed under this format.
    pub fn domain(&self) -> &'static str {
        match self {
            Self::Blake3V1 => "bramble-object-v1",
        }
    }
}

impl fmt::Display for ReferenceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3V1 => write!(f, "blake3-v1"),
        }
    }
}

impl FromStr for ReferenceFormat {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blake3-v1" => Ok(Self::Blake3V1),
            other => Err(TypeError::UnknownReferenceFormat(other.to_string())),
        }
    }
}

/// Content-addressed reference to an immutable object.
///
/// Besides the hash, a reference records the size of the object's encoded
/// data, the height of the object within the tree of objects it roots (0
/// for objects without outgoing references) and its degree (the number of
/// outgoing references). Equality is structural.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalReference {
    hash: [u8; 32],
    size_bytes: u32,
    height: u8,
    degree: u16,
}

impl LocalReference {
    /// Assemble a reference from its parts.
    pub const fn new(hash: [u8; 32], size_bytes: u32, height: u8, degree: u16) -> Self {
        Self {
            hash,
            size_bytes,
            height,
            degree,
        }
    }

    /// The raw 32-byte hash.
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Size in bytes of the object's encoded data.
    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    /// Longest chain of outgoing references below this object.
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Number of outgoing references held by the object.
    pub fn degree(&self) -> u16 {
        self.degree
    }

    /// Hex-encoded hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.hash[..4])
    }
}

impl fmt::Debug for LocalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalReference({}, size={}, height={}, degree={})",
            self.short_hex(),
            self.size_bytes,
            self.height,
            self.degree
        )
    }
}

impl fmt::Display for LocalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.to_hex(),
            self.size_bytes,
            self.height,
            self.degree
        )
    }
}

impl FromStr for LocalReference {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TypeError::MalformedReference(s.to_string());
        let mut parts = s.split('-');
        let (Some(hash), Some(size), Some(height), Some(degree), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(malformed());
        };

        let bytes = hex::decode(hash).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let hash: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self {
            hash,
            size_bytes: size.parse().map_err(|_| malformed())?,
            height: height.parse().map_err(|_| malformed())?,
            degree: degree.parse().map_err(|_| malformed())?,
        })
    }
}

/// A [`LocalReference`] together with the parameters required to undo the
/// binary encoding (compression, encryption) applied to the object's data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecodableReference {
    pub reference: LocalReference,
    pub decoding_parameters: Vec<u8>,
}

impl DecodableReference {
    pub fn new(reference: LocalReference, decoding_parameters: Vec<u8>) -> Self {
        Self {
            reference,
            decoding_parameters,
        }
    }
}

impl fmt::Display for DecodableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.decoding_parameters.is_empty() {
            write!(f, "{}", self.reference)
        } else {
            write!(
                f,
                "{}+{}",
                self.reference,
                hex::encode(&self.decoding_parameters)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> LocalReference {
        LocalReference::new([0xab; 32], 1234, 2, 17)
    }

    #[test]
    fn accessors() {
        let r = sample();
        assert_eq!(r.hash(), &[0xab; 32]);
        assert_eq!(r.size_bytes(), 1234);
        assert_eq!(r.height(), 2);
        assert_eq!(r.degree(), 17);
    }

    #[test]
    fn display_roundtrip() {
        let r = sample();
        let parsed: LocalReference = r.to_string().parse().unwrap();
        assert_eq!(r, parsed);
    }

    #[test]
    fn parse_rejects_missing_fields() {
        let err = "abcd-12".parse::<LocalReference>().unwrap_err();
        assert!(matches!(err, TypeError::MalformedReference(_)));
    }

    #[test]
    fn parse_rejects_short_hash() {
        let err = "abcd-1-0-0".parse::<LocalReference>().unwrap_err();
        assert_eq!(
            err,
            TypeError::InvalidLength {
                expected: 32,
                actual: 2
            }
        );
    }

    #[test]
    fn equality_is_structural() {
        let a = LocalReference::new([1; 32], 10, 0, 0);
        let b = LocalReference::new([1; 32], 10, 0, 0);
        let c = LocalReference::new([1; 32], 11, 0, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn short_hex_is_8_chars() {
        assert_eq!(sample().short_hex().len(), 8);
    }

    #[test]
    fn serde_roundtrip() {
        let r = DecodableReference::new(sample(), vec![1, 2, 3]);
        let json = serde_json::to_string(&r).unwrap();
        let parsed: DecodableReference = serde_json::from_str(&json).unwrap();
        assert_eq!(r, parsed);
    }

    #[test]
    fn reference_format_parse() {
        assert_eq!(
            "blake3-v1".parse::<ReferenceFormat>().unwrap(),
            ReferenceFormat::Blake3V1
        );
        assert!("sha1".parse::<ReferenceFormat>().is_err());
    }

    proptest! {
        #[test]
        fn any_reference_survives_display(
            hash in any::<[u8; 32]>(),
            size in any::<u32>(),
            height in any::<u8>(),
            degree in any::<u16>(),
        ) {
            let r = LocalReference::new(hash, size, height, degree);
            prop_assert_eq!(r.to_string().parse::<LocalReference>().unwrap(), r);
        }
    }
}
