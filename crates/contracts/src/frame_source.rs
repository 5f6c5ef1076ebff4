//! FrameSource trait - capture/encode abstraction
//!
//! Wraps whatever produces encoded units (a camera, a recorded stream, a
//! test generator) behind one blocking pull call.

use crate::{ContractError, Frame};

/// Blocking frame producer
///
/// The producer loop calls [`FrameSource::next_frame`] repeatedly on a
/// dedicated blocking thread and publishes every frame it gets.
///
/// # Errors
///
/// - [`ContractError::EndOfStream`] ends the stream normally
/// - [`ContractError::DeviceDisconnected`] (or anything else) is a device
///   failure and tears the whole pipeline down. There is no retry.
///
/// # Example
///
/// ```ignore
/// let mut source: Box<dyn FrameSource> = open_source();
/// loop {
///     let frame = source.next_frame()?;
///     distributor.publish(frame);
/// }
/// ```
pub trait FrameSource: Send {
    /// Source ID (used for logging/metrics)
    fn source_id(&self) -> &str;

    /// Block until the next encoded unit is ready and return it
    fn next_frame(&mut self) -> Result<Frame, ContractError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn source_id(&self) -> &str {
        (**self).source_id()
    }

    fn next_frame(&mut self) -> Result<Frame, ContractError> {
        (**self).next_frame()
    }
}
