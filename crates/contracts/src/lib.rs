//! # Contracts
//!
//! Frozen interface contracts shared by every framecast crate: the frame
//! type, the producer/consumer traits and the stream blueprint.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - `Frame::timestamp` is seconds since the source started (f64)
//! - `Frame::seq` is the arrival order, used for ordering/diagnostics

mod blueprint;
mod demand;
mod error;
mod frame;
mod frame_source;
mod sink;

pub use blueprint::*;
pub use demand::{DemandSignal, LocalDemandSignal};
pub use error::*;
pub use frame::*;
pub use frame_source::FrameSource;
pub use sink::*;
