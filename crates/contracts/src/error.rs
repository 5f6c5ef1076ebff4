//! Layered error definitions
//!
//! Categorized by source: config / device / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Errors =====
    /// Capture device disconnected or failed
    #[error("device '{source_id}' disconnected: {message}")]
    DeviceDisconnected { source_id: String, message: String },

    /// Capture source has no more frames
    #[error("end of stream for source '{source_id}'")]
    EndOfStream { source_id: String },

    // ===== Sink Errors =====
    /// Sink write error (fatal to that sink)
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink transmit error (best-effort, sink keeps running)
    #[error("sink '{sink_name}' transmit error: {message}")]
    SinkTransmit { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create device disconnection error
    pub fn device_disconnected(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DeviceDisconnected {
            source_id: source_id.into(),
            message: message.into(),
        }
    }

    /// Create end-of-stream marker
    pub fn end_of_stream(source_id: impl Into<String>) -> Self {
        Self::EndOfStream {
            source_id: source_id.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink transmit error
    pub fn sink_transmit(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkTransmit {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether a forward failure should stop the sink that produced it.
    ///
    /// Transmit errors are best-effort and the sink keeps pulling; every
    /// other error ends that sink (and only that sink).
    pub fn is_fatal_to_sink(&self) -> bool {
        !matches!(self, Self::SinkTransmit { .. })
    }

    /// Whether this error means the source ended normally.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }
}
