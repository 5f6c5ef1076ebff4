//! Producer loop - pulls frames from the source and publishes them
//!
//! `FrameSource::next_frame` blocks, so the loop lives on its own detached
//! OS thread and reports its exit over a oneshot channel. A source stalled
//! inside `next_frame` therefore never holds up runtime shutdown. The loop
//! ends when asked to stop, when the distributor is closed, or when the
//! source reports end of stream or a device failure.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use contracts::{ContractError, FrameSource};
use observability::{StreamStatsAggregator, StreamSummary};
use tokio::sync::oneshot;
use tracing::{debug, error, info, info_span, warn};

use crate::distributor::Distributor;
use crate::error::DistributorError;

/// Why the producer loop ended
#[derive(Debug)]
pub enum ProducerExitReason {
    /// Stop requested or distributor closed
    Stopped,
    /// Source ran out of frames
    EndOfStream,
    /// Capture device failed
    DeviceFailure(ContractError),
}

impl fmt::Display for ProducerExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::EndOfStream => write!(f, "end of stream"),
            Self::DeviceFailure(e) => write!(f, "device failure: {}", e),
        }
    }
}

/// Outcome of a finished producer loop
#[derive(Debug)]
pub struct ProducerExit {
    /// Frames successfully published
    pub frames: u64,
    pub reason: ProducerExitReason,
    pub stats: StreamSummary,
}

/// Handle to the producer thread
pub struct ProducerHandle {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
    exit: Option<oneshot::Receiver<ProducerExit>>,
}

impl ProducerHandle {
    /// Spawn the producer loop on a dedicated thread
    ///
    /// `on_first_publish` runs once, right after the first frame went out.
    /// The thread is never joined; dropping the handle detaches it.
    pub fn spawn<S, F>(
        source: S,
        distributor: Arc<Distributor>,
        on_first_publish: F,
    ) -> Result<Self, DistributorError>
    where
        S: FrameSource + 'static,
        F: FnOnce() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let loop_stop = Arc::clone(&stop);
        let (exit_tx, exit_rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name("framecast-producer".into())
            .spawn(move || {
                let exit = run_producer(source, &distributor, &loop_stop, on_first_publish);
                // receiver gone means nobody waits for the exit
                let _ = exit_tx.send(exit);
            })?;

        Ok(Self {
            stop,
            thread,
            exit: Some(exit_rx),
        })
    }

    /// Ask the loop to end after the frame it is currently waiting for
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.exit.is_none() || self.thread.is_finished()
    }

    /// Wait for the loop to end
    ///
    /// Cancel-safe. Returns `None` once the exit has already been collected.
    pub async fn join(&mut self) -> Option<ProducerExit> {
        let exit = self.exit.as_mut()?;
        let received = exit.await;
        self.exit = None;
        Some(match received {
            Ok(exit) => exit,
            Err(_) => {
                // sender dropped without a send: the loop unwound
                error!("producer thread panicked");
                ProducerExit {
                    frames: 0,
                    reason: ProducerExitReason::DeviceFailure(ContractError::Other(
                        "producer thread panicked".to_string(),
                    )),
                    stats: StreamSummary::default(),
                }
            }
        })
    }

    /// [`ProducerHandle::join`] bounded by `grace`
    pub async fn join_within(
        &mut self,
        grace: Duration,
    ) -> Result<Option<ProducerExit>, DistributorError> {
        tokio::time::timeout(grace, self.join())
            .await
            .map_err(|_| DistributorError::ProducerNotJoined { grace })
    }
}

fn run_producer<S, F>(
    mut source: S,
    distributor: &Distributor,
    stop: &AtomicBool,
    on_first_publish: F,
) -> ProducerExit
where
    S: FrameSource,
    F: FnOnce(),
{
    let source_id = source.source_id().to_string();
    let _span = info_span!("producer_loop", source_id = %source_id).entered();
    info!(source_id = %source_id, "producer loop started");

    let mut on_first_publish = Some(on_first_publish);
    let mut stats = StreamStatsAggregator::new();
    let mut frames: u64 = 0;

    let reason = loop {
        if stop.load(Ordering::Acquire) {
            break ProducerExitReason::Stopped;
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_end_of_stream() => break ProducerExitReason::EndOfStream,
            Err(e) => {
                error!(source_id = %source_id, error = %e, "frame source failed");
                break ProducerExitReason::DeviceFailure(e);
            }
        };

        stats.update(&frame);
        let bytes = frame.len();
        match distributor.publish(frame) {
            Ok(delivered) => {
                frames += 1;
                observability::record_frame_published(&source_id, bytes, delivered);
                if let Some(callback) = on_first_publish.take() {
                    callback();
                }
                if frames.is_multiple_of(300) {
                    debug!(frames, delivered, "producer progress");
                }
            }
            Err(_) => {
                debug!("distributor closed, producer exiting");
                break ProducerExitReason::Stopped;
            }
        }
    };

    match &reason {
        ProducerExitReason::DeviceFailure(_) => {
            warn!(source_id = %source_id, frames, %reason, "producer loop ended")
        }
        _ => info!(source_id = %source_id, frames, %reason, "producer loop ended"),
    }

    ProducerExit {
        frames,
        reason,
        stats: stats.summary(),
    }
}
