use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, ExecutionResult};

/// A message type that can travel as an action inside an [`AnyEnvelope`].
pub trait ActionMessage: Serialize + DeserializeOwned {
    /// Identifies the executor that understands this action.
    const TYPE_URL: &'static str;
}

/// Type-erased action: the serialized message plus the URL naming its type.
///
/// The envelope is encrypted as a whole, so the receiver learns the type
/// only after authenticating the ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnyEnvelope {
    pub type_url: String,
    pub value: Vec<u8>,
}

impl AnyEnvelope {
    pub fn pack<A: ActionMessage>(action: &A) -> ExecutionResult<Self> {
        let value = bincode::serialize(action)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to marshal action: {e}")))?;
        Ok(Self {
            type_url: A::TYPE_URL.to_string(),
            value,
        })
    }

    pub fn unpack<A: ActionMessage>(&self) -> ExecutionResult<A> {
        if self.type_url != A::TYPE_URL {
            return Err(ExecutionError::UnexpectedActionType {
                expected: A::TYPE_URL.to_string(),
                got: self.type_url.clone(),
            });
        }
        bincode::deserialize(&self.value).map_err(|e| ExecutionError::Unmarshal {
            what: "action",
            reason: e.to_string(),
        })
    }

    pub fn to_bytes(&self) -> ExecutionResult<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to marshal envelope: {e}")))
    }

    pub fn from_bytes(data: &[u8]) -> ExecutionResult<Self> {
        bincode::deserialize(data).map_err(|e| ExecutionError::Unmarshal {
            what: "action envelope",
            reason: e.to_string(),
        })
    }
}
