//! DataSink trait - Distributor output interface
//!
//! Defines the abstract interface for Sinks.

use crate::{ContractError, Frame, SinkType};

/// Data output trait
///
/// All sink implementations must implement this trait. A sink never sees
/// its frame slot directly: the pull worker takes the latest frame on every
/// demand signal and hands it to [`LocalDataSink::forward`].
#[trait_variant::make(DataSink: Send)]
pub trait LocalDataSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Sink variant
    fn kind(&self) -> SinkType;

    /// Bring the downstream to an active state
    async fn start(&mut self) -> Result<(), ContractError>;

    /// Forward one frame downstream
    ///
    /// # Errors
    /// Returns forward error (should include context). Whether the sink
    /// survives it is decided by [`ContractError::is_fatal_to_sink`].
    async fn forward(&mut self, frame: &Frame) -> Result<(), ContractError>;

    /// Deactivate the downstream, must be idempotent
    async fn stop(&mut self) -> Result<(), ContractError>;
}
