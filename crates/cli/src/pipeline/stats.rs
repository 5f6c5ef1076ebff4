//! Pipeline statistics and metrics.

use std::time::Duration;

use distributor::{LifecycleReport, SinkSummary};
use observability::StreamSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Frames accepted by the distributor
    pub frames_published: u64,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// How the producer loop ended, if it was joined
    pub exit_reason: Option<String>,

    /// Device failure that ended the stream, if any
    pub device_failure: Option<String>,

    /// Per-sink final state and counters
    pub sinks: Vec<SinkSummary>,

    /// Frame size / interval statistics from the producer
    pub stream: Option<StreamSummary>,

    /// Problems hit during teardown
    pub stop_errors: Vec<String>,

    /// Teardown finished without any of the above
    pub clean: bool,
}

impl PipelineStats {
    pub fn from_report(report: LifecycleReport, duration: Duration) -> Self {
        Self {
            frames_published: report.frames_published,
            duration,
            exit_reason: report
                .producer_exit
                .as_ref()
                .map(|exit| exit.reason.to_string()),
            device_failure: report.device_failure().map(ToString::to_string),
            stream: report.stream_stats().cloned(),
            stop_errors: report.stop_errors.iter().map(ToString::to_string).collect(),
            clean: report.is_clean(),
            sinks: report.sinks,
        }
    }

    /// Calculate published frames per second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_published as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Pipeline Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Frames published: {}", self.frames_published);
        println!("   ├─ FPS: {:.2}", self.fps());
        println!(
            "   └─ Source exit: {}",
            self.exit_reason.as_deref().unwrap_or("not joined")
        );

        if let Some(stream) = &self.stream {
            println!("\nStream");
            println!("   ├─ Bytes: {}", stream.total_bytes);
            println!("   ├─ Frame size (bytes): {}", stream.frame_bytes);
            println!("   └─ Frame interval (ms): {}", stream.interval_ms);
        }

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (idx, sink) in self.sinks.iter().enumerate() {
                let branch = if idx + 1 == self.sinks.len() { "└─" } else { "├─" };
                let m = &sink.metrics;
                println!(
                    "   {} {} ({:?}, {:?}): forwarded={} demands={} empty={} repeats={} failures={}",
                    branch,
                    sink.name,
                    sink.kind,
                    sink.state,
                    m.forward_count,
                    m.demand_count,
                    m.empty_count,
                    m.repeat_count,
                    m.failure_count
                );
            }
        }

        if !self.stop_errors.is_empty() {
            println!("\nTeardown issues");
            for error in &self.stop_errors {
                println!("   ├─ {}", error);
            }
        }

        println!();
    }
}
