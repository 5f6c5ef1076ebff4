//! Capture channel - bridge between an external capture device and the producer loop
//!
//! The device side pushes encoded units into a bounded channel; the producer
//! side pulls them through [`FrameSource`]. `finish()` marks a clean end of
//! stream, dropping the sender without it reads as a disconnection.

use std::time::Instant;

use async_channel::{bounded, Receiver, Sender};
use bytes::Bytes;
use contracts::{ContractError, Frame, FrameSource};
use tracing::{debug, warn};

use crate::error::{CaptureError, Result};

/// Default queue depth between device and producer
pub const DEFAULT_CAPTURE_CAPACITY: usize = 30;

enum CaptureUnit {
    Data(Bytes),
    End,
}

/// Create a connected sender / frame source pair
pub fn capture_channel(
    source_id: impl Into<String>,
    capacity: usize,
) -> (CaptureSender, ChannelFrameSource) {
    let source_id = source_id.into();
    let (tx, rx) = bounded(capacity.max(1));
    (
        CaptureSender {
            source_id: source_id.clone(),
            tx,
        },
        ChannelFrameSource {
            source_id,
            rx,
            seq: 0,
            started: Instant::now(),
        },
    )
}

/// Device side of the capture channel
#[derive(Clone)]
pub struct CaptureSender {
    source_id: String,
    tx: Sender<CaptureUnit>,
}

impl CaptureSender {
    /// Push one encoded unit, blocking while the queue is full
    pub fn send_blocking(&self, unit: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send_blocking(CaptureUnit::Data(unit.into()))
            .map_err(|_| self.closed())
    }

    /// Push one encoded unit from async code
    pub async fn send(&self, unit: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(CaptureUnit::Data(unit.into()))
            .await
            .map_err(|_| self.closed())
    }

    /// Signal a clean end of stream
    pub fn finish(self) {
        if self.tx.send_blocking(CaptureUnit::End).is_err() {
            debug!(source_id = %self.source_id, "capture channel already closed at finish");
        }
    }

    /// Units waiting to be pulled
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    fn closed(&self) -> CaptureError {
        CaptureError::ChannelClosed {
            source_id: self.source_id.clone(),
        }
    }
}

/// Producer side of the capture channel
pub struct ChannelFrameSource {
    source_id: String,
    rx: Receiver<CaptureUnit>,
    seq: u64,
    started: Instant,
}

impl FrameSource for ChannelFrameSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn next_frame(&mut self) -> std::result::Result<Frame, ContractError> {
        match self.rx.recv_blocking() {
            Ok(CaptureUnit::Data(data)) => {
                self.seq += 1;
                Ok(Frame::new(
                    self.seq,
                    self.started.elapsed().as_secs_f64(),
                    data,
                ))
            }
            Ok(CaptureUnit::End) => Err(ContractError::end_of_stream(&self.source_id)),
            Err(_) => {
                warn!(source_id = %self.source_id, "capture device went away");
                Err(CaptureError::ChannelClosed {
                    source_id: self.source_id.clone(),
                }
                .into())
            }
        }
    }
}
