use std::fmt;

use thiserror::Error;

/// Coarse classification of an [`ExecutionError`], mirroring RPC status
/// codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    /// Local input was rejected before anything was sent.
    InvalidArgument,
    /// The remote side violated the protocol, or its payloads could not be
    /// authenticated or decoded.
    Internal,
    /// The transport failed.
    Unavailable,
    /// The stream ended before the execution completed.
    Cancelled,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
            Self::Cancelled => "CANCELLED",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unexpected action type {got:?}, expected {expected:?}")]
    UnexpectedActionType { expected: String, got: String },

    #[error("failed to decrypt {what}: {reason}")]
    Decrypt { what: &'static str, reason: String },

    #[error("failed to unmarshal {what}: {reason}")]
    Unmarshal { what: &'static str, reason: String },

    #[error("no completion event was returned")]
    MissingCompletion,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("execution stream closed before completion")]
    StreamClosed,

    #[error("framing error: {0}")]
    Framing(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid frame type: {0}")]
    InvalidFrameType(u8),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ExecutionError {
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) | Self::UnexpectedActionType { .. } | Self::Config(_) => {
                Code::InvalidArgument
            }
            Self::Decrypt { .. }
            | Self::Unmarshal { .. }
            | Self::MissingCompletion
            | Self::Framing(_)
            | Self::FrameTooLarge { .. }
            | Self::InvalidFrameType(_) => Code::Internal,
            Self::Transport(_) => Code::Unavailable,
            Self::StreamClosed => Code::Cancelled,
        }
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_separate_local_and_remote_failures() {
        assert_eq!(
            ExecutionError::InvalidArgument("bad key".into()).code(),
            Code::InvalidArgument
        );
        assert_eq!(ExecutionError::MissingCompletion.code(), Code::Internal);
        assert_eq!(
            ExecutionError::Decrypt {
                what: "event",
                reason: "tag mismatch".into()
            }
            .code(),
            Code::Internal
        );
        assert_eq!(ExecutionError::Transport("reset".into()).code(), Code::Unavailable);
        assert_eq!(ExecutionError::StreamClosed.code(), Code::Cancelled);
    }

    #[test]
    fn missing_completion_message() {
        assert_eq!(
            ExecutionError::MissingCompletion.to_string(),
            "no completion event was returned"
        );
        assert_eq!(Code::InvalidArgument.to_string(), "INVALID_ARGUMENT");
    }
}
