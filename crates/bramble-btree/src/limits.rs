use serde::{Deserialize, Serialize};

use crate::error::{BTreeError, BTreeResult};

/// Bounds on the size of objects created while building trees.
///
/// Chunk boundaries are only considered once a chunk holds at least
/// `minimum_size_bytes`, and a chunk is cut before it would exceed
/// `maximum_size_bytes` unless a single node is larger than that.
///
/// Deserialized limits are validated; missing fields take their defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLimits")]
pub struct ObjectSizeLimits {
    pub minimum_size_bytes: usize,
    pub maximum_size_bytes: usize,
}

#[derive(Deserialize)]
#[serde(default)]
struct RawLimits {
    minimum_size_bytes: usize,
    maximum_size_bytes: usize,
}

impl Default for RawLimits {
    fn default() -> Self {
        let defaults = ObjectSizeLimits::default();
        Self {
            minimum_size_bytes: defaults.minimum_size_bytes,
            maximum_size_bytes: defaults.maximum_size_bytes,
        }
    }
}

impl TryFrom<RawLimits> for ObjectSizeLimits {
    type Error = BTreeError;

    fn try_from(raw: RawLimits) -> BTreeResult<Self> {
        Self::new(raw.minimum_size_bytes, raw.maximum_size_bytes)
    }
}

impl Default for ObjectSizeLimits {
    fn default() -> Self {
        Self {
            minimum_size_bytes: 4 * 1024,
            maximum_size_bytes: 64 * 1024,
        }
    }
}

impl ObjectSizeLimits {
    pub fn new(minimum_size_bytes: usize, maximum_size_bytes: usize) -> BTreeResult<Self> {
        let limits = Self {
            minimum_size_bytes,
            maximum_size_bytes,
        };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> BTreeResult<()> {
        if self.maximum_size_bytes == 0 {
            return Err(BTreeError::InvalidLimits(
                "maximum size must be positive".into(),
            ));
        }
        if self.minimum_size_bytes > self.maximum_size_bytes {
            return Err(BTreeError::InvalidLimits(format!(
                "minimum size {} exceeds maximum size {}",
                self.minimum_size_bytes, self.maximum_size_bytes
            )));
        }
        Ok(())
    }
}
