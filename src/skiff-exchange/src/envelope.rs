use serde::{Deserialize, Serialize};
use skiff_recordbatch::RecordBatch;

/// Canonical end-of-stream message. A sender transmits one envelope carrying
/// this message on every destination once its local input has closed.
pub const END_OF_STREAM: &str = "EOF";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    Batch(RecordBatch),
    Error(String),
}

/// Single-field wrapper for everything that crosses the wire, so encoders
/// and decoders carry one uniform type regardless of payload kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub payload: Payload,
}

impl Envelope {
    pub fn batch(batch: RecordBatch) -> Self {
        Self {
            payload: Payload::Batch(batch),
        }
    }

    /// The end-of-stream sentinel: an error-valued envelope whose message is
    /// the canonical end-of-stream string.
    pub fn eof() -> Self {
        Self {
            payload: Payload::Error(END_OF_STREAM.to_string()),
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(&self.payload, Payload::Error(message) if message == END_OF_STREAM)
    }
}
