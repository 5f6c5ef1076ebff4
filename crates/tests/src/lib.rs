//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到管道的端到端测试 (mock 帧源，无需硬件)
//! - 慢 sink 隔离
//! - 关闭后不再转发

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_blueprint_defaults() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            "[source]\nsource_type = \"mock\"\n",
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();
        assert_eq!(blueprint.version, contracts::ConfigVersion::V1);
        assert_eq!(blueprint.source.fps, 30.0);
        assert!(blueprint.sinks.is_empty());
        assert_eq!(blueprint.shutdown.grace_ms, 5000);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::future;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use capture::{MockFrameSource, MockSourceConfig};
    use contracts::{ContractError, DataSink, Frame, SinkType, SlotPolicy};
    use distributor::sinks::{FragmentHeader, NetworkSinkConfig};
    use distributor::{
        manual_demand, FileSink, LifecycleController, LifecycleState, NetworkSink, PacedDemand,
        ProducerExitReason, ShutdownReason, SinkState,
    };
    use tokio::net::UdpSocket;
    use tokio::time::{sleep, timeout};

    /// Sink that counts forwarded frames, optionally sleeping in forward
    struct CountingSink {
        name: String,
        forwarded: Arc<AtomicU64>,
        last_seq: Arc<AtomicU64>,
        delay: Duration,
    }

    impl CountingSink {
        fn new(name: &str, delay: Duration) -> (Self, Arc<AtomicU64>, Arc<AtomicU64>) {
            let forwarded = Arc::new(AtomicU64::new(0));
            let last_seq = Arc::new(AtomicU64::new(0));
            (
                Self {
                    name: name.to_string(),
                    forwarded: Arc::clone(&forwarded),
                    last_seq: Arc::clone(&last_seq),
                    delay,
                },
                forwarded,
                last_seq,
            )
        }
    }

    impl DataSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SinkType {
            SinkType::Log
        }

        async fn start(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn forward(&mut self, frame: &Frame) -> Result<(), ContractError> {
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.last_seq.fetch_max(frame.seq, Ordering::Relaxed);
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    fn mock_source(fps: f64, max_frames: Option<u64>) -> MockFrameSource {
        MockFrameSource::new(MockSourceConfig {
            source_id: "it_cam".into(),
            fps,
            frame_size: 1000,
            gop: 10,
            max_frames,
            disconnect_after: None,
            paced: true,
        })
    }

    /// End-to-end: config → mock source → file + UDP + log sinks
    ///
    /// 验证完整的数据流：
    /// 1. 配置解析生成 StreamBlueprint
    /// 2. factory 按配置启动所有 sink
    /// 3. 帧源结束后 teardown，录制文件与 UDP 数据报均到达
    #[tokio::test]
    async fn test_e2e_config_to_sinks() {
        let record_dir = tempfile::tempdir().unwrap();
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp_addr = receiver.local_addr().unwrap();

        let config = format!(
            r#"
[source]
id = "it_cam"
source_type = "mock"
fps = 100.0
params = {{ frame_size = "3000", max_frames = "20" }}

[[sinks]]
name = "udp"
sink_type = "network"
slot_policy = "drain"
demand_hz = 400.0
params = {{ addr = "{udp_addr}", max_packet_size = "1400" }}

[[sinks]]
name = "recorder"
sink_type = "file"
slot_policy = "drain"
demand_hz = 400.0
params = {{ dir = "{dir}", prefix = "it" }}

[[sinks]]
name = "log"
sink_type = "log"

[shutdown]
grace_ms = 2000
"#,
            dir = record_dir.path().display()
        );
        let blueprint =
            config_loader::ConfigLoader::load_from_str(&config, config_loader::ConfigFormat::Toml)
                .unwrap();

        let source = capture::create_source(&blueprint.source).unwrap();
        let mut controller = LifecycleController::new(blueprint.shutdown.grace());
        let handles = distributor::start_sinks(&blueprint, Some(controller.event_sender()))
            .await
            .unwrap();
        for handle in handles {
            controller.attach(handle).unwrap();
        }
        controller.start(source).unwrap();

        let reason = timeout(
            Duration::from_secs(10),
            controller.run_until(future::pending()),
        )
        .await
        .unwrap();
        assert!(matches!(reason, ShutdownReason::ProducerExited));

        let report = controller.shutdown().await;
        assert!(report.is_clean(), "report: {:?}", report.stop_errors);
        assert_eq!(report.frames_published, 20);
        assert!(matches!(
            report.producer_exit.as_ref().map(|e| &e.reason),
            Some(ProducerExitReason::EndOfStream)
        ));
        assert_eq!(report.sinks.len(), 3);
        assert!(report.sinks.iter().all(|s| s.state == SinkState::Stopped));

        let udp = report.sinks.iter().find(|s| s.name == "udp").unwrap();
        assert!(udp.metrics.forward_count > 0);

        // recording exists and holds whole frames
        let recordings: Vec<_> = std::fs::read_dir(record_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(recordings.len(), 1);
        assert_eq!(
            recordings[0].extension().and_then(|e| e.to_str()),
            Some("h265")
        );
        let recorder = report.sinks.iter().find(|s| s.name == "recorder").unwrap();
        let len = std::fs::metadata(&recordings[0]).unwrap().len();
        assert!(len >= recorder.metrics.forward_count * 3000);

        // every datagram carries a fragment header within max_packet_size
        let mut buf = vec![0u8; 2048];
        let mut datagrams = 0;
        while let Ok(Ok(n)) =
            timeout(Duration::from_millis(200), receiver.recv(&mut buf)).await
        {
            assert!(n <= 1400);
            let (header, payload) = FragmentHeader::decode(&buf[..n]).unwrap();
            assert!(header.index < header.count);
            assert!(!payload.is_empty());
            datagrams += 1;
        }
        assert!(datagrams as u64 >= udp.metrics.forward_count);
    }

    /// A sink that blocks in forward must not slow the others down
    #[tokio::test]
    async fn test_slow_sink_isolation() {
        let mut controller = LifecycleController::new(Duration::from_secs(2));

        let (fast, fast_count, fast_last) = CountingSink::new("fast", Duration::ZERO);
        let (slow, slow_count, _) = CountingSink::new("slow", Duration::from_millis(250));
        controller
            .add_sink(fast, PacedDemand::new(200.0), SlotPolicy::Drain)
            .await
            .unwrap();
        controller
            .add_sink(slow, PacedDemand::new(200.0), SlotPolicy::Drain)
            .await
            .unwrap();

        controller.start(mock_source(100.0, None)).unwrap();
        let reason = controller
            .run_until(sleep(Duration::from_millis(800)))
            .await;
        assert!(matches!(reason, ShutdownReason::Requested));
        assert_eq!(controller.state(), LifecycleState::Running);

        let report = controller.shutdown().await;
        let fast_forwarded = fast_count.load(Ordering::Relaxed);
        let slow_forwarded = slow_count.load(Ordering::Relaxed);

        assert!(fast_forwarded >= 30, "fast sink forwarded {fast_forwarded}");
        assert!(slow_forwarded <= 5, "slow sink forwarded {slow_forwarded}");
        // the fast sink tracked the head of the stream
        assert!(fast_last.load(Ordering::Relaxed) + 20 >= report.frames_published);
    }

    /// Once shutdown returns, no sink receives another frame
    #[tokio::test]
    async fn test_no_forward_after_shutdown() {
        let mut controller = LifecycleController::new(Duration::from_secs(2));
        let (sink, forwarded, _) = CountingSink::new("counter", Duration::ZERO);
        let (trigger, demand) = manual_demand();
        controller
            .add_sink(sink, demand, SlotPolicy::Peek)
            .await
            .unwrap();
        controller.start(mock_source(200.0, None)).unwrap();

        controller
            .run_until(sleep(Duration::from_millis(100)))
            .await;
        trigger.signal();
        sleep(Duration::from_millis(20)).await;

        let report = controller.shutdown().await;
        assert_eq!(report.sinks[0].state, SinkState::Stopped);
        let at_stop = forwarded.load(Ordering::Relaxed);

        for _ in 0..5 {
            trigger.signal();
        }
        sleep(Duration::from_millis(100)).await;
        assert_eq!(forwarded.load(Ordering::Relaxed), at_stop);
    }

    /// Writer that accepts `capacity` bytes and then reports a full disk
    struct FillingWriter {
        capacity: usize,
    }

    impl std::io::Write for FillingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.capacity < buf.len() {
                return Err(std::io::Error::other("no space left on device"));
            }
            self.capacity -= buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// A recording write fault removes only the recorder; streaming goes on
    #[tokio::test]
    async fn test_file_fault_leaves_network_sink_running() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut controller = LifecycleController::new(Duration::from_secs(2));

        let recorder = FileSink::with_writer(
            "recorder",
            "/dev/null",
            FillingWriter { capacity: 10_000 },
        );
        controller
            .add_sink(recorder, PacedDemand::new(200.0), SlotPolicy::Drain)
            .await
            .unwrap();
        let network = NetworkSink::new(
            "udp",
            NetworkSinkConfig::new(receiver.local_addr().unwrap()),
        );
        controller
            .add_sink(network, PacedDemand::new(200.0), SlotPolicy::Drain)
            .await
            .unwrap();

        controller.start(mock_source(100.0, None)).unwrap();
        controller
            .run_until(sleep(Duration::from_millis(300)))
            .await;

        // the failed recorder was removed while the stream kept running
        assert_eq!(controller.sinks().len(), 1);
        assert_eq!(controller.sinks()[0].name(), "udp");
        let published_mid = controller.distributor().published();

        controller
            .run_until(sleep(Duration::from_millis(200)))
            .await;
        assert!(controller.distributor().published() > published_mid);

        let report = controller.shutdown().await;
        let recorder = report.sinks.iter().find(|s| s.name == "recorder").unwrap();
        let udp = report.sinks.iter().find(|s| s.name == "udp").unwrap();
        assert_eq!(recorder.state, SinkState::Failed);
        assert_eq!(recorder.metrics.failure_count, 1);
        assert_eq!(udp.state, SinkState::Stopped);
        assert!(udp.metrics.forward_count > recorder.metrics.forward_count);
        assert!(report.device_failure().is_none());

        let mut buf = vec![0u8; 2048];
        let mut last_seq = 0;
        while let Ok(Ok(n)) =
            timeout(Duration::from_millis(200), receiver.recv(&mut buf)).await
        {
            let (header, _) = FragmentHeader::decode(&buf[..n]).unwrap();
            last_seq = last_seq.max(header.seq);
        }
        assert!(last_seq > published_mid);
    }

    /// A sink added while frames flow only ever sees later frames
    #[tokio::test]
    async fn test_late_registration_sees_only_new_frames() {
        let mut controller = LifecycleController::new(Duration::from_secs(2));
        controller.start(mock_source(200.0, None)).unwrap();
        controller
            .run_until(sleep(Duration::from_millis(100)))
            .await;

        let published_before = controller.distributor().published();
        assert!(published_before > 0);
        assert_eq!(controller.state(), LifecycleState::Running);

        let (sink, _, last_seq) = CountingSink::new("late", Duration::ZERO);
        let (trigger, demand) = manual_demand();
        controller
            .add_sink(sink, demand, SlotPolicy::Peek)
            .await
            .unwrap();
        controller
            .run_until(sleep(Duration::from_millis(50)))
            .await;
        trigger.signal();
        controller
            .run_until(sleep(Duration::from_millis(20)))
            .await;

        let seen = last_seq.load(Ordering::Relaxed);
        assert!(seen > published_before, "saw {seen}, registered after {published_before}");
        controller.shutdown().await;
    }

    /// A sink whose downstream cannot be reached fails setup, the rest roll back
    #[tokio::test]
    async fn test_bad_sink_rolls_back_startup() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[source]
source_type = "mock"

[[sinks]]
name = "log"
sink_type = "log"

[[sinks]]
name = "rec"
sink_type = "file"
params = { dir = "/proc/framecast-denied" }
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let err = distributor::start_sinks(&blueprint, None).await.err().unwrap();
        assert!(err.is_configuration_failure());
        assert!(err.to_string().contains("rec"));
    }
}
