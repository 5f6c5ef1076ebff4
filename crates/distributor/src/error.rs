//! Distributor error types

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Distributor-specific errors
#[derive(Debug, Error)]
pub enum DistributorError {
    /// Sink could not be built from its configuration
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Sink failed to activate its downstream
    #[error("failed to start sink '{name}': {source}")]
    SinkStart {
        name: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Sink failed while deactivating its downstream
    #[error("failed to stop sink '{name}': {source}")]
    SinkStop {
        name: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Sink did not stop within the grace period
    #[error("sink '{name}' did not stop within {grace:?}")]
    StopTimeout { name: String, grace: Duration },

    /// Sink worker task panicked
    #[error("sink '{name}' worker panicked: {message}")]
    WorkerPanicked { name: String, message: String },

    /// Producer thread did not exit within the grace period
    #[error("producer did not exit within {grace:?}")]
    ProducerNotJoined { grace: Duration },

    /// Publish after the distributor was closed
    #[error("distributor is closed")]
    Closed,

    /// Lifecycle operation not allowed in the current state
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Error from a contract implementation
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DistributorError {
    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this error happened before anything started running
    pub fn is_configuration_failure(&self) -> bool {
        matches!(
            self,
            Self::SinkCreation { .. }
                | Self::SinkStart { .. }
                | Self::Contract(contracts::ContractError::ConfigValidation { .. })
        )
    }
}
