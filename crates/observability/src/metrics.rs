//! 推流指标收集模块
//!
//! Prometheus 计数器/直方图，以及一个进程内的帧流统计聚合器。

use contracts::Frame;
use metrics::{counter, gauge, histogram};

/// 记录一次发布
///
/// `delivered` 为本次写入的帧槽数量。
pub fn record_frame_published(source_id: &str, bytes: usize, delivered: usize) {
    counter!(
        "framecast_frames_published_total",
        "source_id" => source_id.to_string()
    )
    .increment(1);
    histogram!("framecast_frame_bytes").record(bytes as f64);
    gauge!("framecast_registered_sinks").set(delivered as f64);
}

/// 记录一次向下游的转发
pub fn record_frame_forwarded(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "framecast_frames_forwarded_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// 记录一次空拉取 (帧槽中没有帧)
pub fn record_empty_pull(sink_name: &str) {
    counter!(
        "framecast_empty_pulls_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录一次重复拉取 (同一帧被再次转发)
pub fn record_repeat_pull(sink_name: &str) {
    counter!(
        "framecast_repeat_pulls_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录 sink 故障
pub fn record_sink_failure(sink_name: &str, fatal: bool) {
    counter!(
        "framecast_sink_failures_total",
        "sink" => sink_name.to_string(),
        "fatal" => if fatal { "true" } else { "false" }
    )
    .increment(1);
}

/// 记录生命周期状态 (Idle=0 .. Stopped=4)
pub fn record_lifecycle_state(code: u8) {
    gauge!("framecast_lifecycle_state").set(code as f64);
}

/// 帧流统计聚合器
///
/// 由生产线程独占，统计帧大小与帧间隔。
#[derive(Debug, Clone, Default)]
pub struct StreamStatsAggregator {
    /// 总帧数
    pub total_frames: u64,

    /// 总字节数
    pub total_bytes: u64,

    /// 帧大小统计 (字节)
    pub size_stats: RunningStats,

    /// 帧间隔统计 (毫秒)
    pub interval_stats: RunningStats,

    last_timestamp: Option<f64>,
}

impl StreamStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, frame: &Frame) {
        self.total_frames += 1;
        self.total_bytes += frame.len() as u64;
        self.size_stats.push(frame.len() as f64);

        if let Some(last) = self.last_timestamp {
            self.interval_stats
                .push((frame.timestamp - last).max(0.0) * 1000.0);
        }
        self.last_timestamp = Some(frame.timestamp);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> StreamSummary {
        let mean_interval = self.interval_stats.mean();
        StreamSummary {
            total_frames: self.total_frames,
            total_bytes: self.total_bytes,
            effective_fps: if mean_interval > 0.0 {
                1000.0 / mean_interval
            } else {
                0.0
            },
            frame_bytes: StatsSummary::from(&self.size_stats),
            interval_ms: StatsSummary::from(&self.interval_stats),
        }
    }
}

/// 帧流摘要
#[derive(Debug, Clone, Default)]
pub struct StreamSummary {
    pub total_frames: u64,
    pub total_bytes: u64,
    pub effective_fps: f64,
    pub frame_bytes: StatsSummary,
    pub interval_ms: StatsSummary,
}

impl std::fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stream Summary ===")?;
        writeln!(f, "Frames published: {}", self.total_frames)?;
        writeln!(f, "Bytes published: {}", self.total_bytes)?;
        writeln!(f, "Effective fps: {:.2}", self.effective_fps)?;
        writeln!(f, "Frame size (bytes): {}", self.frame_bytes)?;
        writeln!(f, "Frame interval (ms): {}", self.interval_ms)?;
        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.2}, max={:.2}, mean={:.2}, std={:.2} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// 在线统计 (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_tracks_size_and_interval() {
        let mut aggregator = StreamStatsAggregator::new();
        aggregator.update(&Frame::new(1, 0.0, vec![0u8; 100]));
        aggregator.update(&Frame::new(2, 0.1, vec![0u8; 300]));
        aggregator.update(&Frame::new(3, 0.2, vec![0u8; 200]));

        let summary = aggregator.summary();
        assert_eq!(summary.total_frames, 3);
        assert_eq!(summary.total_bytes, 600);
        assert_eq!(summary.interval_ms.count, 2);
        assert!((summary.effective_fps - 10.0).abs() < 1e-6);
        assert!((summary.frame_bytes.mean - 200.0).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let summary = StreamSummary {
            total_frames: 90,
            total_bytes: 9000,
            effective_fps: 30.0,
            ..Default::default()
        };

        let output = summary.to_string();
        assert!(output.contains("Frames published: 90"));
        assert!(output.contains("Effective fps: 30.00"));
        assert!(output.contains("Frame interval (ms): N/A"));
    }

    #[test]
    fn test_record_functions_without_recorder() {
        // no recorder installed: calls are no-ops
        record_frame_published("cam", 10, 2);
        record_frame_forwarded("udp", true);
        record_empty_pull("udp");
        record_repeat_pull("udp");
        record_sink_failure("udp", false);
        record_lifecycle_state(2);
    }
}
