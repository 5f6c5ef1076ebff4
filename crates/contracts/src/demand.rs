//! DemandSignal trait - downstream readiness
//!
//! A sink's pull worker waits on its demand signal before taking the latest
//! frame out of the sink's slot. How often the signal fires is entirely up
//! to the downstream.

/// Downstream "ready for more data" notification
#[trait_variant::make(DemandSignal: Send)]
pub trait LocalDemandSignal {
    /// Resolve once the downstream wants another frame
    ///
    /// Must be cancel-safe: the pull worker races it against its stop signal.
    async fn ready(&mut self);
}
