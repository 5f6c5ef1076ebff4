//! SinkHandle - one sink, its frame slot and the pull worker driving it
//!
//! The worker waits on the sink's demand signal, takes whatever is in the
//! slot and forwards it. A slow sink only ever delays itself: the producer
//! keeps overwriting the slot and the worker picks up the latest frame on
//! its next pull.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{ContractError, DataSink, DemandSignal, SinkType, SlotPolicy};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::distributor::SinkId;
use crate::error::DistributorError;
use crate::metrics::SinkMetrics;
use crate::slot::FrameSlot;

/// Sink worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum SinkState {
    Running = 0,
    Stopped = 1,
    Failed = 2,
}

impl SinkState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

/// Notification from a sink worker to its owner
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// Forward failed fatally, the sink has stopped itself
    Failed {
        id: SinkId,
        name: String,
        error: String,
    },
}

/// Handle to a running sink worker
pub struct SinkHandle {
    id: SinkId,
    name: String,
    kind: SinkType,
    slot: Arc<FrameSlot>,
    metrics: Arc<SinkMetrics>,
    state: Arc<AtomicU8>,
    stop_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<Result<(), ContractError>>>,
}

impl SinkHandle {
    /// Start the sink's downstream and spawn its pull worker
    ///
    /// Fails without spawning anything if `sink.start()` fails.
    #[instrument(
        name = "sink_handle_start",
        skip(sink, demand, events),
        fields(sink = %sink.name(), kind = ?sink.kind())
    )]
    pub async fn start<S, D>(
        mut sink: S,
        demand: D,
        policy: SlotPolicy,
        events: Option<mpsc::UnboundedSender<SinkEvent>>,
    ) -> Result<Self, DistributorError>
    where
        S: DataSink + 'static,
        D: DemandSignal + 'static,
    {
        let id = SinkId::next();
        let name = sink.name().to_string();
        let kind = sink.kind();

        sink.start()
            .await
            .map_err(|source| DistributorError::SinkStart {
                name: name.clone(),
                source,
            })?;

        let slot = Arc::new(FrameSlot::new(policy));
        let metrics = Arc::new(SinkMetrics::new());
        let state = Arc::new(AtomicU8::new(SinkState::Running as u8));
        let (stop_tx, stop_rx) = watch::channel(false);

        let worker = tokio::spawn(sink_worker(
            sink,
            demand,
            WorkerContext {
                id,
                name: name.clone(),
                slot: Arc::clone(&slot),
                metrics: Arc::clone(&metrics),
                state: Arc::clone(&state),
                stop_rx,
                events,
            },
        ));

        info!(sink = %name, %id, ?policy, "sink started");

        Ok(Self {
            id,
            name,
            kind,
            slot,
            metrics,
            state,
            stop_tx,
            worker: Some(worker),
        })
    }

    pub fn id(&self) -> SinkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SinkType {
        self.kind
    }

    /// The slot the distributor publishes into
    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    pub fn state(&self) -> SinkState {
        SinkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == SinkState::Running
    }

    /// Stop pulling and deactivate the downstream. Idempotent.
    #[instrument(name = "sink_handle_stop", skip(self), fields(sink = %self.name))]
    pub async fn stop(&mut self) -> Result<(), DistributorError> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.stop_tx.send(true);
        self.joined(worker.await)
    }

    /// Like [`SinkHandle::stop`], giving up after `grace`
    ///
    /// A worker that misses the deadline is aborted.
    #[instrument(name = "sink_handle_stop", skip(self), fields(sink = %self.name))]
    pub async fn stop_within(&mut self, grace: Duration) -> Result<(), DistributorError> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.stop_tx.send(true);

        match tokio::time::timeout(grace, &mut worker).await {
            Ok(joined) => self.joined(joined),
            Err(_) => {
                worker.abort();
                self.state
                    .store(SinkState::Stopped as u8, Ordering::Release);
                warn!(sink = %self.name, ?grace, "sink stop timed out, worker aborted");
                Err(DistributorError::StopTimeout {
                    name: self.name.clone(),
                    grace,
                })
            }
        }
    }

    fn joined(
        &self,
        joined: Result<Result<(), ContractError>, JoinError>,
    ) -> Result<(), DistributorError> {
        match joined {
            Ok(Ok(())) => {
                debug!(sink = %self.name, "sink stopped");
                Ok(())
            }
            Ok(Err(source)) => Err(DistributorError::SinkStop {
                name: self.name.clone(),
                source,
            }),
            Err(e) => {
                self.state.store(SinkState::Failed as u8, Ordering::Release);
                error!(sink = %self.name, error = ?e, "sink worker panicked");
                Err(DistributorError::WorkerPanicked {
                    name: self.name.clone(),
                    message: e.to_string(),
                })
            }
        }
    }
}

impl Drop for SinkHandle {
    fn drop(&mut self) {
        // the detached worker still stops its sink on its own
        if self.worker.is_some() {
            let _ = self.stop_tx.send(true);
        }
    }
}

struct WorkerContext {
    id: SinkId,
    name: String,
    slot: Arc<FrameSlot>,
    metrics: Arc<SinkMetrics>,
    state: Arc<AtomicU8>,
    stop_rx: watch::Receiver<bool>,
    events: Option<mpsc::UnboundedSender<SinkEvent>>,
}

/// Pull loop: demand -> take latest -> forward
#[instrument(
    name = "sink_worker_loop",
    skip(sink, demand, ctx),
    fields(sink = %ctx.name)
)]
async fn sink_worker<S: DataSink, D: DemandSignal>(
    mut sink: S,
    mut demand: D,
    mut ctx: WorkerContext,
) -> Result<(), ContractError> {
    debug!(sink = %ctx.name, "sink worker started");
    let mut last_seq = None;

    loop {
        tokio::select! {
            biased;
            _ = ctx.stop_rx.changed() => break,
            _ = demand.ready() => {}
        }
        ctx.metrics.inc_demand_count();

        let Some(frame) = ctx.slot.take() else {
            ctx.metrics.inc_empty_count();
            observability::record_empty_pull(&ctx.name);
            trace!(sink = %ctx.name, "demand with empty slot");
            continue;
        };

        if last_seq == Some(frame.seq) {
            ctx.metrics.inc_repeat_count();
            observability::record_repeat_pull(&ctx.name);
        }
        last_seq = Some(frame.seq);

        match sink.forward(&frame).await {
            Ok(()) => {
                ctx.metrics.inc_forward_count();
                observability::record_frame_forwarded(&ctx.name, true);
            }
            Err(e) if !e.is_fatal_to_sink() => {
                ctx.metrics.inc_failure_count();
                observability::record_frame_forwarded(&ctx.name, false);
                observability::record_sink_failure(&ctx.name, false);
                warn!(sink = %ctx.name, seq = frame.seq, error = %e, "forward failed, continuing");
            }
            Err(e) => {
                ctx.metrics.inc_failure_count();
                observability::record_frame_forwarded(&ctx.name, false);
                observability::record_sink_failure(&ctx.name, true);
                error!(sink = %ctx.name, seq = frame.seq, error = %e, "forward failed, stopping sink");

                ctx.state.store(SinkState::Failed as u8, Ordering::Release);
                if let Some(events) = &ctx.events {
                    let _ = events.send(SinkEvent::Failed {
                        id: ctx.id,
                        name: ctx.name.clone(),
                        error: e.to_string(),
                    });
                }
                break;
            }
        }
    }

    let result = sink.stop().await;
    let _ = ctx.state.compare_exchange(
        SinkState::Running as u8,
        SinkState::Stopped as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    if let Err(e) = &result {
        error!(sink = %ctx.name, error = %e, "sink stop failed");
    }
    debug!(sink = %ctx.name, "sink worker stopped");
    result
}
