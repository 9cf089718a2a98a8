use serde::{Deserialize, Serialize};

/// Largest frame payload accepted by default.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Submits one encrypted action to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// PKIX DER of the worker key the action is encrypted for.
    pub platform_pkix_public_key: Vec<u8>,
    /// DER certificates, leaf first.
    pub client_certificate_chain: Vec<Vec<u8>>,
    /// Nonce of the action ciphertext. Always all zeroes.
    pub nonce: Vec<u8>,
    /// Authenticated but unencrypted data bound to the action.
    pub additional_data: Vec<u8>,
    pub action_ciphertext: Vec<u8>,
}

/// An event sealed by the worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEvent {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// One frame of the response stream: zero or more `Executing` frames
/// followed by exactly one `Completed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteResponse {
    Executing { last_event: Option<SealedEvent> },
    Completed { completion_event: Option<SealedEvent> },
}

/// Everything that travels over an execution stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Request(ExecuteRequest),
    Response(ExecuteResponse),
}

impl Frame {
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Request(_) => 1,
            Self::Response(ExecuteResponse::Executing { .. }) => 2,
            Self::Response(ExecuteResponse::Completed { .. }) => 3,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Request(_) => "ExecuteRequest",
            Self::Response(ExecuteResponse::Executing { .. }) => "Executing",
            Self::Response(ExecuteResponse::Completed { .. }) => "Completed",
        }
    }

    pub(crate) fn is_known_tag(tag: u8) -> bool {
        (1..=3).contains(&tag)
    }
}
