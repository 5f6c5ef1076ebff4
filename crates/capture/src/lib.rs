//! # Capture
//!
//! Frame source module.
//!
//! Responsibilities:
//! - Wrap the capture/encode collaborator behind `FrameSource`
//! - Synthetic sources for running without hardware
//! - Replay of recorded elementary streams
//! - Frame pacing at the configured rate
//!
//! ## Usage Example
//!
//! ```ignore
//! use capture::{capture_channel, DEFAULT_CAPTURE_CAPACITY};
//!
//! let (tx, source) = capture_channel("oak", DEFAULT_CAPTURE_CAPACITY);
//! std::thread::spawn(move || {
//!     while let Some(unit) = device.get_next_encoded_unit() {
//!         if tx.send_blocking(unit).is_err() {
//!             break;
//!         }
//!     }
//!     // dropping `tx` without `finish()` reads as a disconnection
//! });
//! // hand `source` to the producer loop
//! ```

mod channel;
mod error;
mod factory;
mod file;
mod mock;
mod nal;
mod pacer;

// Re-exports
pub use channel::{capture_channel, CaptureSender, ChannelFrameSource, DEFAULT_CAPTURE_CAPACITY};
pub use contracts::{Frame, FrameSource};
pub use error::{CaptureError, Result};
pub use factory::create_source;
pub use file::{FileFrameSource, FileSourceConfig};
pub use mock::{MockFrameSource, MockSourceConfig};
pub use nal::{split_access_units, Codec};
pub use pacer::Pacer;
