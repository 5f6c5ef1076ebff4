//! Frame - FrameSource output
//!
//! One encoded access unit as handed from the producer to every sink.

use bytes::Bytes;

/// Encoded video frame
///
/// Cloning is cheap: the payload is reference-counted, so every sink slot
/// shares the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Arrival order assigned by the source (starts at 1)
    pub seq: u64,

    /// Seconds since the source started
    pub timestamp: f64,

    /// Encoded bitstream chunk (zero-copy)
    pub data: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(seq: u64, timestamp: f64, data: impl Into<Bytes>) -> Self {
        Self {
            seq,
            timestamp,
            data: data.into(),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
