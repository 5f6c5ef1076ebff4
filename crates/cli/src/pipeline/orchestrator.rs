//! Pipeline orchestrator - wires source, distributor and sinks together.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::StreamBlueprint;
use distributor::{Distributor, LifecycleController, ShutdownReason};
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::{CliError, Result};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Validated stream blueprint
    pub blueprint: StreamBlueprint,

    /// Stop after this many published frames (None = unlimited)
    pub max_frames: Option<u64>,

    /// Pipeline timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves, a limit is hit or the source ends
    ///
    /// Teardown always runs once the pipeline has started; a device failure
    /// is reported in the returned stats rather than as an error.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let source = capture::create_source(&blueprint.source)
            .map_err(|e| CliError::setup(format!("source '{}': {}", blueprint.source.id, e)))?;

        let mut controller = LifecycleController::new(blueprint.shutdown.grace());
        let handles = distributor::start_sinks(blueprint, Some(controller.event_sender()))
            .await
            .map_err(|e| CliError::setup(e.to_string()))?;
        for handle in handles {
            controller
                .attach(handle)
                .map_err(|e| CliError::setup(e.to_string()))?;
        }

        info!(
            source_id = %blueprint.source.id,
            source_type = ?blueprint.source.source_type,
            fps = blueprint.source.fps,
            sinks = controller.sinks().len(),
            "Pipeline assembled"
        );

        controller
            .start(source)
            .map_err(|e| CliError::setup(e.to_string()))?;

        let stop = stop_condition(
            shutdown,
            self.config.timeout,
            self.config.max_frames,
            Arc::clone(controller.distributor()),
        );
        let reason = controller.run_until(stop).await;
        if matches!(reason, ShutdownReason::ProducerExited) {
            info!("Source finished, shutting down");
        }

        let report = controller.shutdown().await;
        for error in &report.stop_errors {
            warn!(error = %error, "Teardown issue");
        }

        Ok(PipelineStats::from_report(report, start_time.elapsed()))
    }
}

/// Resolve on the first of: external shutdown, timeout, frame limit
async fn stop_condition<F>(
    shutdown: F,
    timeout: Option<Duration>,
    max_frames: Option<u64>,
    distributor: Arc<Distributor>,
) where
    F: Future<Output = ()>,
{
    let timeout = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };

    let frame_limit = async {
        let Some(max) = max_frames else {
            return std::future::pending().await;
        };
        let mut poll = tokio::time::interval(Duration::from_millis(10));
        while distributor.published() < max {
            poll.tick().await;
        }
    };

    tokio::select! {
        _ = shutdown => warn!("Received shutdown signal, stopping pipeline..."),
        _ = timeout => info!("Timeout reached, stopping pipeline"),
        _ = frame_limit => info!(max_frames = ?max_frames, "Frame limit reached, stopping pipeline"),
    }
}
