//! LifecycleController - owns the pipeline and its Idle → Stopped state machine
//!
//! ```text
//! Idle ──start──▶ Starting ──first publish──▶ Running
//!   │                 │                          │
//!   └────────────────shutdown──────────▶ Stopping ──▶ Stopped
//! ```
//!
//! Teardown order: stop the producer, close the distributor (no publish
//! after this), stop sinks in reverse registration order, join the
//! producer thread.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{DataSink, DemandSignal, FrameSource, SinkType, SlotPolicy};
use observability::StreamSummary;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::distributor::{Distributor, SinkId};
use crate::error::DistributorError;
use crate::handle::{SinkEvent, SinkHandle, SinkState};
use crate::metrics::MetricsSnapshot;
use crate::producer::{ProducerExit, ProducerExitReason, ProducerHandle};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[repr(u8)]
pub enum LifecycleState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn get(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
        observability::record_lifecycle_state(state as u8);
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let moved = self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            observability::record_lifecycle_state(to as u8);
        }
        moved
    }
}

/// Why `run_until` returned
#[derive(Debug)]
pub enum ShutdownReason {
    /// The shutdown future resolved (signal, timer, ...)
    Requested,
    /// The producer loop ended on its own
    ProducerExited,
}

enum Step {
    Shutdown,
    ProducerExited(Option<ProducerExit>),
    Event(SinkEvent),
}

/// Final state of one sink
#[derive(Debug, Clone, serde::Serialize)]
pub struct SinkSummary {
    pub name: String,
    pub kind: SinkType,
    pub state: SinkState,
    pub metrics: MetricsSnapshot,
}

impl SinkSummary {
    fn of(sink: &SinkHandle) -> Self {
        Self {
            name: sink.name().to_string(),
            kind: sink.kind(),
            state: sink.state(),
            metrics: sink.metrics().snapshot(),
        }
    }
}

/// What happened between start and shutdown
#[derive(Debug)]
pub struct LifecycleReport {
    pub frames_published: u64,
    /// `None` if the producer never ran or did not exit in time
    pub producer_exit: Option<ProducerExit>,
    pub producer_joined: bool,
    /// Registration order, sinks removed while running come last
    pub sinks: Vec<SinkSummary>,
    /// Errors collected while stopping, teardown continued past each one
    pub stop_errors: Vec<DistributorError>,
}

impl LifecycleReport {
    /// The device failure that ended the stream, if any
    pub fn device_failure(&self) -> Option<&contracts::ContractError> {
        match &self.producer_exit {
            Some(ProducerExit {
                reason: ProducerExitReason::DeviceFailure(e),
                ..
            }) => Some(e),
            _ => None,
        }
    }

    pub fn stream_stats(&self) -> Option<&StreamSummary> {
        self.producer_exit.as_ref().map(|exit| &exit.stats)
    }

    pub fn is_clean(&self) -> bool {
        self.producer_joined && self.stop_errors.is_empty() && self.device_failure().is_none()
    }
}

/// Owns the distributor, the sinks and the producer thread
pub struct LifecycleController {
    state: Arc<StateCell>,
    distributor: Arc<Distributor>,
    sinks: Vec<SinkHandle>,
    producer: Option<ProducerHandle>,
    producer_exit: Option<ProducerExit>,
    retired: Vec<SinkSummary>,
    events_tx: mpsc::UnboundedSender<SinkEvent>,
    events_rx: mpsc::UnboundedReceiver<SinkEvent>,
    grace: Duration,
}

impl LifecycleController {
    /// Create an idle controller; `grace` bounds each sink stop and the producer join
    pub fn new(grace: Duration) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(StateCell(AtomicU8::new(LifecycleState::Idle as u8)));
        observability::record_lifecycle_state(LifecycleState::Idle as u8);
        Self {
            state,
            distributor: Arc::new(Distributor::new()),
            sinks: Vec::new(),
            producer: None,
            producer_exit: None,
            retired: Vec::new(),
            events_tx,
            events_rx,
            grace,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    /// Sender to pass to [`SinkHandle::start`] for sinks built elsewhere
    pub fn event_sender(&self) -> mpsc::UnboundedSender<SinkEvent> {
        self.events_tx.clone()
    }

    pub fn sinks(&self) -> &[SinkHandle] {
        &self.sinks
    }

    /// Start a sink and register it with the distributor
    pub async fn add_sink<S, D>(
        &mut self,
        sink: S,
        demand: D,
        policy: SlotPolicy,
    ) -> Result<SinkId, DistributorError>
    where
        S: DataSink + 'static,
        D: DemandSignal + 'static,
    {
        self.ensure_accepting("add a sink")?;
        let handle = SinkHandle::start(sink, demand, policy, Some(self.event_sender())).await?;
        self.attach(handle)
    }

    /// Register an already started sink
    pub fn attach(&mut self, handle: SinkHandle) -> Result<SinkId, DistributorError> {
        self.ensure_accepting("attach a sink")?;
        let id = self.distributor.register(&handle);
        self.sinks.push(handle);
        Ok(id)
    }

    /// Unregister and stop one sink while the rest keep running
    pub async fn remove_sink(&mut self, id: SinkId) -> Result<(), DistributorError> {
        self.distributor.unregister(id);
        let Some(pos) = self.sinks.iter().position(|s| s.id() == id) else {
            return Ok(());
        };
        let mut handle = self.sinks.remove(pos);
        let result = handle.stop_within(self.grace).await;
        self.retired.push(SinkSummary::of(&handle));
        result
    }

    /// Launch the producer loop: Idle → Starting, Running after the first publish
    #[instrument(name = "lifecycle_start", skip(self, source), fields(source_id = %source.source_id()))]
    pub fn start<S: FrameSource + 'static>(&mut self, source: S) -> Result<(), DistributorError> {
        if !self
            .state
            .transition(LifecycleState::Idle, LifecycleState::Starting)
        {
            return Err(DistributorError::InvalidState {
                operation: "start",
                state: self.state(),
            });
        }

        let state = Arc::clone(&self.state);
        let producer = ProducerHandle::spawn(
            source,
            Arc::clone(&self.distributor),
            move || {
                if state.transition(LifecycleState::Starting, LifecycleState::Running) {
                    info!("pipeline running");
                }
            },
        );
        match producer {
            Ok(producer) => self.producer = Some(producer),
            Err(e) => {
                error!(error = %e, "failed to spawn producer thread");
                self.state.transition(LifecycleState::Starting, LifecycleState::Idle);
                return Err(e);
            }
        }
        info!(sinks = self.sinks.len(), "pipeline starting");
        Ok(())
    }

    /// Drive the pipeline until `shutdown` resolves or the producer ends
    ///
    /// Sink failures are handled here: the failed sink is unregistered and
    /// stopped while every other sink keeps running.
    pub async fn run_until<F>(&mut self, shutdown: F) -> ShutdownReason
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let step = {
                let producer = self.producer.as_mut();
                tokio::select! {
                    _ = &mut shutdown => Step::Shutdown,
                    exit = async {
                        match producer {
                            Some(p) => p.join().await,
                            None => std::future::pending().await,
                        }
                    } => Step::ProducerExited(exit),
                    Some(event) = self.events_rx.recv() => Step::Event(event),
                }
            };

            match step {
                Step::Shutdown => {
                    info!("shutdown requested");
                    return ShutdownReason::Requested;
                }
                Step::ProducerExited(exit) => {
                    if let Some(exit) = exit {
                        info!(frames = exit.frames, reason = %exit.reason, "producer exited");
                        self.producer_exit = Some(exit);
                    }
                    return ShutdownReason::ProducerExited;
                }
                Step::Event(event) => self.handle_event(event).await,
            }
        }
    }

    async fn handle_event(&mut self, event: SinkEvent) {
        let SinkEvent::Failed { id, name, error } = event;
        warn!(sink = %name, %id, error = %error, "sink failed, removing it");
        if let Err(e) = self.remove_sink(id).await {
            warn!(sink = %name, error = %e, "failed sink did not stop cleanly");
        }
    }

    /// Tear everything down and report, from any state
    #[instrument(name = "lifecycle_shutdown", skip(self))]
    pub async fn shutdown(mut self) -> LifecycleReport {
        let previous = self.state();
        self.state.set(LifecycleState::Stopping);
        info!(?previous, sinks = self.sinks.len(), "pipeline stopping");

        if let Some(producer) = &self.producer {
            producer.request_stop();
        }
        self.distributor.close();

        let mut stop_errors = Vec::new();
        let mut summaries = Vec::with_capacity(self.sinks.len());
        while let Some(mut sink) = self.sinks.pop() {
            self.distributor.unregister(sink.id());
            if let Err(e) = sink.stop_within(self.grace).await {
                error!(sink = %sink.name(), error = %e, "sink stop failed");
                stop_errors.push(e);
            }
            summaries.push(SinkSummary::of(&sink));
        }
        summaries.reverse();
        summaries.append(&mut self.retired);

        let mut producer_joined = true;
        if let Some(mut producer) = self.producer.take() {
            match producer.join_within(self.grace).await {
                Ok(Some(exit)) => self.producer_exit = Some(exit),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "producer still blocked in the frame source");
                    producer_joined = false;
                    stop_errors.push(e);
                }
            }
        }

        self.state.set(LifecycleState::Stopped);
        let report = self.report(summaries, producer_joined, stop_errors);
        info!(
            frames = report.frames_published,
            stop_errors = report.stop_errors.len(),
            "pipeline stopped"
        );
        report
    }

    fn ensure_accepting(&self, operation: &'static str) -> Result<(), DistributorError> {
        match self.state() {
            state @ (LifecycleState::Stopping | LifecycleState::Stopped) => {
                Err(DistributorError::InvalidState { operation, state })
            }
            _ => Ok(()),
        }
    }

    fn report(
        &mut self,
        sinks: Vec<SinkSummary>,
        producer_joined: bool,
        stop_errors: Vec<DistributorError>,
    ) -> LifecycleReport {
        LifecycleReport {
            frames_published: self.distributor.published(),
            producer_exit: self.producer_exit.take(),
            producer_joined,
            sinks,
            stop_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demand::PacedDemand;
    use crate::sinks::LogSink;
    use capture::{MockFrameSource, MockSourceConfig};
    use contracts::{ContractError, Frame};
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use std::sync::{mpsc as std_mpsc, Mutex};
    use tokio::time::{sleep, timeout};

    /// Sink that records misuse instead of panicking inside the worker
    #[derive(Clone, Default)]
    struct RecordingSink {
        name: String,
        fail_on: Option<u64>,
        forwarded: Arc<AtomicU64>,
        stops: Arc<AtomicU64>,
        forward_after_stop: Arc<AtomicBool>,
        stop_log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingSink {
        fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Default::default()
            }
        }
    }

    impl DataSink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SinkType {
            SinkType::Log
        }

        async fn start(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn forward(&mut self, _frame: &Frame) -> Result<(), ContractError> {
            if self.stops.load(Ordering::SeqCst) > 0 {
                self.forward_after_stop.store(true, Ordering::SeqCst);
            }
            let n = self.forwarded.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(n) {
                return Err(ContractError::sink_write(&self.name, "device gone"));
            }
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ContractError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stop_log.lock().unwrap().push(self.name.clone());
            Ok(())
        }
    }

    fn mock(fps: f64, max_frames: Option<u64>) -> MockFrameSource {
        MockFrameSource::new(MockSourceConfig {
            source_id: "cam".into(),
            fps,
            frame_size: 64,
            max_frames,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_state_machine_happy_path() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        assert_eq!(controller.state(), LifecycleState::Idle);

        let recorder = RecordingSink::named("recorder");
        let forwarded = Arc::clone(&recorder.forwarded);
        controller
            .add_sink(recorder, PacedDemand::new(200.0), SlotPolicy::Peek)
            .await
            .unwrap();

        controller.start(mock(200.0, None)).unwrap();
        let reason = controller
            .run_until(sleep(Duration::from_millis(100)))
            .await;
        assert!(matches!(reason, ShutdownReason::Requested));
        assert_eq!(controller.state(), LifecycleState::Running);

        let report = controller.shutdown().await;
        assert!(report.is_clean());
        assert!(report.frames_published > 0);
        assert!(forwarded.load(Ordering::SeqCst) > 0);
        assert_eq!(report.sinks.len(), 1);
        assert_eq!(report.sinks[0].state, SinkState::Stopped);
        assert!(matches!(
            report.producer_exit.map(|e| e.reason),
            Some(ProducerExitReason::Stopped)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        controller.start(mock(100.0, Some(1))).unwrap();
        let err = controller.start(mock(100.0, Some(1))).unwrap_err();
        assert!(matches!(
            err,
            DistributorError::InvalidState {
                operation: "start",
                ..
            }
        ));
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_end_of_stream_ends_run() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        controller
            .add_sink(LogSink::new("log"), PacedDemand::new(500.0), SlotPolicy::Drain)
            .await
            .unwrap();
        controller.start(mock(500.0, Some(25))).unwrap();

        let reason = timeout(
            Duration::from_secs(5),
            controller.run_until(std::future::pending()),
        )
        .await
        .unwrap();
        assert!(matches!(reason, ShutdownReason::ProducerExited));

        let report = controller.shutdown().await;
        assert_eq!(report.frames_published, 25);
        assert_eq!(report.stream_stats().unwrap().total_frames, 25);
        assert!(report.device_failure().is_none());
    }

    #[tokio::test]
    async fn test_device_failure_is_reported_after_teardown() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        let recorder = RecordingSink::named("recorder");
        let stops = Arc::clone(&recorder.stops);
        controller
            .add_sink(recorder, PacedDemand::new(100.0), SlotPolicy::Peek)
            .await
            .unwrap();
        controller
            .start(MockFrameSource::new(MockSourceConfig {
                fps: 500.0,
                disconnect_after: Some(5),
                ..Default::default()
            }))
            .unwrap();

        controller.run_until(std::future::pending()).await;
        let report = controller.shutdown().await;

        assert!(matches!(
            report.device_failure(),
            Some(ContractError::DeviceDisconnected { .. })
        ));
        assert!(!report.is_clean());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_sink_does_not_stop_siblings() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        let failing = RecordingSink {
            fail_on: Some(3),
            ..RecordingSink::named("failing")
        };
        let failing_stops = Arc::clone(&failing.stops);
        let healthy = RecordingSink::named("healthy");
        let healthy_forwarded = Arc::clone(&healthy.forwarded);

        controller
            .add_sink(failing, PacedDemand::new(200.0), SlotPolicy::Peek)
            .await
            .unwrap();
        controller
            .add_sink(healthy, PacedDemand::new(200.0), SlotPolicy::Peek)
            .await
            .unwrap();
        controller.start(mock(200.0, None)).unwrap();

        controller
            .run_until(sleep(Duration::from_millis(200)))
            .await;

        assert_eq!(controller.sinks().len(), 1);
        assert_eq!(controller.sinks()[0].name(), "healthy");
        assert_eq!(controller.distributor().sink_names(), vec!["healthy"]);
        assert_eq!(failing_stops.load(Ordering::SeqCst), 1);
        assert!(healthy_forwarded.load(Ordering::SeqCst) > 3);

        let report = controller.shutdown().await;
        assert!(report.stop_errors.is_empty());
        let failed = report.sinks.iter().find(|s| s.name == "failing").unwrap();
        assert_eq!(failed.state, SinkState::Failed);
        assert_eq!(failed.metrics.failure_count, 1);
    }

    #[tokio::test]
    async fn test_no_forward_after_stop() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        let stop_log = Arc::new(Mutex::new(Vec::new()));
        let mut recorders = Vec::new();
        for name in ["a", "b", "c"] {
            let recorder = RecordingSink {
                stop_log: Arc::clone(&stop_log),
                ..RecordingSink::named(name)
            };
            recorders.push(recorder.clone());
            controller
                .add_sink(recorder, PacedDemand::new(1000.0), SlotPolicy::Peek)
                .await
                .unwrap();
        }
        controller.start(mock(1000.0, None)).unwrap();
        controller
            .run_until(sleep(Duration::from_millis(50)))
            .await;

        let distributor = Arc::clone(controller.distributor());
        let report = controller.shutdown().await;
        let published_at_stop = distributor.published();
        sleep(Duration::from_millis(20)).await;

        assert_eq!(distributor.published(), published_at_stop);
        assert!(distributor.is_closed());
        assert!(distributor.is_empty());
        for recorder in &recorders {
            assert_eq!(recorder.stops.load(Ordering::SeqCst), 1);
            assert!(!recorder.forward_after_stop.load(Ordering::SeqCst));
        }
        // stopped newest first, reported in registration order
        assert_eq!(*stop_log.lock().unwrap(), vec!["c", "b", "a"]);
        let names: Vec<&str> = report.sinks.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_runtime_drops_after_shutdown_with_stalled_source() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let (device, source) = capture::capture_channel("oak", 4);

        let report = runtime.block_on(async {
            let mut controller = LifecycleController::new(Duration::from_millis(100));
            controller
                .add_sink(LogSink::new("log"), PacedDemand::new(100.0), SlotPolicy::Peek)
                .await
                .unwrap();
            controller.start(source).unwrap();
            device.send(vec![0u8, 0, 0, 1, 0x65]).await.unwrap();
            sleep(Duration::from_millis(200)).await;
            // source now blocks in next_frame waiting for the next unit
            controller.shutdown().await
        });
        assert!(!report.producer_joined);
        assert!(report
            .stop_errors
            .iter()
            .any(|e| matches!(e, DistributorError::ProducerNotJoined { .. })));

        let (dropped_tx, dropped_rx) = std_mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = dropped_tx.send(());
        });
        assert!(
            dropped_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "runtime drop blocked on the producer thread"
        );

        // unblocks and ends the detached producer thread
        drop(device);
    }

    #[tokio::test]
    async fn test_shutdown_from_idle_stops_sinks() {
        let mut controller = LifecycleController::new(Duration::from_secs(1));
        let recorder = RecordingSink::named("idle");
        let stops = Arc::clone(&recorder.stops);
        controller
            .add_sink(recorder, PacedDemand::new(10.0), SlotPolicy::Peek)
            .await
            .unwrap();

        let report = controller.shutdown().await;
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(report.producer_exit.is_none());
        assert!(report.producer_joined);
    }
}
