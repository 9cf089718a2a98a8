use bramble_btree::BTreeError;
use bramble_store::StoreError;

use crate::depset::DepsetOrder;

/// Errors from encoding, decoding or operating on values.
#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    #[error("value of type {0} cannot be encoded")]
    CannotEncode(String),

    #[error("value is defined recursively")]
    DefinedRecursively,

    #[error("unknown value kind {0}")]
    UnknownValueKind(u32),

    #[error("unknown attr kind {0}")]
    UnknownAttrKind(u32),

    #[error("unknown build setting kind {0}")]
    UnknownBuildSettingKind(u32),

    #[error("unknown depset order {0}")]
    UnknownDepsetOrder(u32),

    #[error("struct field not found: {0}")]
    StructFieldNotFound(String),

    #[error("number of keys does not match number of values: got {keys} keys and {values} values")]
    KeyValueCountMismatch { keys: usize, values: usize },

    #[error("cannot combine depsets with incompatible orders {0} and {1}")]
    IncompatibleDepsetOrders(DepsetOrder, DepsetOrder),

    #[error("unhashable type: {0}")]
    Unhashable(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("unknown builtin: {0}")]
    UnknownBuiltin(String),

    #[error("{0} has no definition and no resolver is available")]
    UnresolvedGlobal(String),

    #[error("corrupt value: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("field {field}: {source}")]
    Field {
        field: String,
        source: Box<ValueError>,
    },

    #[error("key {key}: {source}")]
    Key { key: String, source: Box<ValueError> },

    #[error("index {index}: {source}")]
    Index {
        index: usize,
        source: Box<ValueError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    BTree(#[from] BTreeError),
}

impl ValueError {
    pub fn in_field(self, field: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            source: Box::new(self),
        }
    }

    pub fn at_key(self, key: impl Into<String>) -> Self {
        Self::Key {
            key: key.into(),
            source: Box::new(self),
        }
    }

    pub fn at_index(self, index: usize) -> Self {
        Self::Index {
            index,
            source: Box::new(self),
        }
    }

    /// The innermost error, with all field/key/index context removed.
    pub fn root_cause(&self) -> &ValueError {
        match self {
            Self::Field { source, .. } | Self::Key { source, .. } | Self::Index { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

pub type ValueResult<T> = Result<T, ValueError>;
