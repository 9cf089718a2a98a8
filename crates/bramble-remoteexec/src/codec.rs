use serde::Serialize;

use crate::error::{ExecutionError, ExecutionResult};
use crate::message::{Frame, MAX_FRAME_SIZE};

/// Codec for execution frames.
///
/// Layout: `[4 bytes big-endian length][1 byte tag][bincode payload]`,
/// where the length counts the tag and the payload.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionCodec {
    max_frame_size: usize,
}

impl Default for ExecutionCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl ExecutionCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serialized size of `message`, failing if it exceeds the maximum.
    pub fn check_size<T: Serialize + ?Sized>(&self, message: &T) -> ExecutionResult<usize> {
        let size = bincode::serialized_size(message)
            .map_err(|e| ExecutionError::InvalidArgument(e.to_string()))? as usize;
        if size > self.max_frame_size {
            return Err(ExecutionError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(size)
    }

    pub fn encode(&self, frame: &Frame) -> ExecutionResult<Vec<u8>> {
        let payload = bincode::serialize(frame)
            .map_err(|e| ExecutionError::InvalidArgument(format!("failed to marshal frame: {e}")))?;
        if payload.len() > self.max_frame_size {
            return Err(ExecutionError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(4 + 1 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(frame.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one frame from the front of `data`. Returns the frame and the
    /// number of bytes consumed.
    pub fn decode(&self, data: &[u8]) -> ExecutionResult<(Frame, usize)> {
        if data.len() < 5 {
            return Err(ExecutionError::Framing("too short".into()));
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len < 1 {
            return Err(ExecutionError::Framing("zero-length frame".into()));
        }
        if len - 1 > self.max_frame_size {
            return Err(ExecutionError::FrameTooLarge {
                size: len - 1,
                max: self.max_frame_size,
            });
        }
        let total = 4 + len;
        if data.len() < total {
            return Err(ExecutionError::Framing(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let tag = data[4];
        if !Frame::is_known_tag(tag) {
            return Err(ExecutionError::InvalidFrameType(tag));
        }
        let frame: Frame = bincode::deserialize(&data[5..total]).map_err(|e| {
            ExecutionError::Unmarshal {
                what: "frame",
                reason: e.to_string(),
            }
        })?;
        if frame.type_tag() != tag {
            return Err(ExecutionError::InvalidFrameType(tag));
        }
        Ok((frame, total))
    }
}
