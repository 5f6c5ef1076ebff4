//! LogSink - logs frame summaries via tracing

use std::collections::HashMap;

use contracts::{ContractError, DataSink, Frame, SinkType};
use tracing::{debug, info, instrument};

/// Sink that logs frame summaries for debugging
pub struct LogSink {
    name: String,
    summary_every: u64,
    frames: u64,
    bytes: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            summary_every: 30,
            frames: 0,
            bytes: 0,
        }
    }

    /// Create from params map, `summary_every` sets the info-level summary interval
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        let mut sink = Self::new(name);
        if let Some(every) = params.get("summary_every").and_then(|v| v.parse().ok()) {
            sink.summary_every = every;
        }
        sink
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl DataSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkType {
        SinkType::Log
    }

    async fn start(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink started");
        Ok(())
    }

    #[instrument(
        name = "log_sink_forward",
        skip(self, frame),
        fields(sink = %self.name, seq = frame.seq)
    )]
    async fn forward(&mut self, frame: &Frame) -> Result<(), ContractError> {
        self.frames += 1;
        self.bytes += frame.len() as u64;

        debug!(
            sink = %self.name,
            seq = frame.seq,
            timestamp = frame.timestamp,
            bytes = frame.len(),
            "frame received"
        );

        if self.summary_every > 0 && self.frames.is_multiple_of(self.summary_every) {
            info!(
                sink = %self.name,
                frames = self.frames,
                bytes = self.bytes,
                last_seq = frame.seq,
                "LogSink progress"
            );
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, frames = self.frames, bytes = self.bytes, "LogSink stopped");
        Ok(())
    }
}
