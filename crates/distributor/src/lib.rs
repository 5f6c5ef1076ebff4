//! # Distributor
//!
//! 帧分发模块。
//!
//! 负责：
//! - 生产线程：从 `FrameSource` 拉帧并发布
//! - Fan-out：每个 sink 一个单帧槽，新帧覆盖旧帧
//! - 拉取式 sink worker：按下游需求取最新帧，慢 sink 只影响自己
//! - 生命周期：Idle → Starting → Running → Stopping → Stopped

pub mod demand;
pub mod distributor;
pub mod error;
pub mod factory;
pub mod handle;
pub mod lifecycle;
pub mod metrics;
pub mod producer;
pub mod sinks;
pub mod slot;

pub use contracts::{DataSink, DemandSignal, Frame, FrameSource, SlotPolicy};
pub use demand::{manual_demand, DemandTrigger, ManualDemand, PacedDemand};
pub use distributor::{Distributor, SinkId};
pub use error::DistributorError;
pub use factory::{start_sink, start_sinks};
pub use handle::{SinkEvent, SinkHandle, SinkState};
pub use lifecycle::{
    LifecycleController, LifecycleReport, LifecycleState, ShutdownReason, SinkSummary,
};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use producer::{ProducerExit, ProducerExitReason, ProducerHandle};
pub use sinks::{FileSink, LogSink, NetworkSink};
pub use slot::FrameSlot;
