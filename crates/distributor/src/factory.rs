//! Build running sinks from configuration

use contracts::{SinkConfig, SinkType, StreamBlueprint};
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::demand::PacedDemand;
use crate::error::DistributorError;
use crate::handle::{SinkEvent, SinkHandle};
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Create, start and spawn the pull worker for one configured sink
#[instrument(
    name = "distributor_start_sink",
    skip(config, events),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub async fn start_sink(
    config: &SinkConfig,
    demand_hz: f64,
    events: Option<mpsc::UnboundedSender<SinkEvent>>,
) -> Result<SinkHandle, DistributorError> {
    let demand = PacedDemand::new(demand_hz);
    let policy = config.slot_policy;

    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::from_params(&config.name, &config.params);
            SinkHandle::start(sink, demand, policy, events).await
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params);
            SinkHandle::start(sink, demand, policy, events).await
        }
        SinkType::Network => {
            let sink = NetworkSink::from_params(&config.name, &config.params)
                .map_err(|e| DistributorError::sink_creation(&config.name, e.to_string()))?;
            SinkHandle::start(sink, demand, policy, events).await
        }
    }
}

/// Start every sink in the blueprint, in order
///
/// If one fails, the sinks already started are stopped again before the
/// error is returned.
#[instrument(
    name = "distributor_start_sinks",
    skip(blueprint, events),
    fields(sink_count = blueprint.sinks.len())
)]
pub async fn start_sinks(
    blueprint: &StreamBlueprint,
    events: Option<mpsc::UnboundedSender<SinkEvent>>,
) -> Result<Vec<SinkHandle>, DistributorError> {
    let mut handles: Vec<SinkHandle> = Vec::with_capacity(blueprint.sinks.len());

    for config in &blueprint.sinks {
        match start_sink(config, blueprint.demand_hz_for(config), events.clone()).await {
            Ok(handle) => handles.push(handle),
            Err(e) => {
                for started in handles.iter_mut().rev() {
                    if let Err(stop_err) = started.stop().await {
                        warn!(sink = %started.name(), error = %stop_err, "stop during rollback failed");
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ShutdownConfig, SlotPolicy, SourceConfig, SourceType};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn sink(name: &str, sink_type: SinkType, params: &[(&str, &str)]) -> SinkConfig {
        SinkConfig {
            name: name.to_string(),
            sink_type,
            slot_policy: SlotPolicy::Peek,
            demand_hz: None,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn blueprint(sinks: Vec<SinkConfig>) -> StreamBlueprint {
        StreamBlueprint {
            version: Default::default(),
            source: SourceConfig {
                id: "cam".into(),
                source_type: SourceType::Mock,
                fps: 30.0,
                params: HashMap::new(),
            },
            sinks,
            shutdown: ShutdownConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_starts_every_sink_type() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().to_string_lossy().into_owned();
        let blueprint = blueprint(vec![
            sink("log", SinkType::Log, &[]),
            sink("rec", SinkType::File, &[("dir", dir.as_str())]),
            sink("udp", SinkType::Network, &[("addr", "127.0.0.1:5400")]),
        ]);

        let mut handles = start_sinks(&blueprint, None).await.unwrap();
        let kinds: Vec<SinkType> = handles.iter().map(|h| h.kind()).collect();
        assert_eq!(kinds, vec![SinkType::Log, SinkType::File, SinkType::Network]);

        for handle in handles.iter_mut() {
            handle.stop().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_bad_network_params_fail_creation() {
        let config = sink("udp", SinkType::Network, &[("addr", "not-an-addr")]);
        let err = start_sink(&config, 30.0, None).await.err().unwrap();
        assert!(matches!(err, DistributorError::SinkCreation { .. }));
        assert!(err.is_configuration_failure());
    }

    #[tokio::test]
    async fn test_failure_rolls_back_started_sinks() {
        let temp = TempDir::new().unwrap();
        // a regular file where the recording directory should be
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let bad_dir = blocker.join("rec").to_string_lossy().into_owned();

        let blueprint = blueprint(vec![
            sink("log", SinkType::Log, &[]),
            sink("rec", SinkType::File, &[("dir", bad_dir.as_str())]),
        ]);

        let err = start_sinks(&blueprint, None).await.err().unwrap();
        assert!(matches!(err, DistributorError::SinkStart { .. }));
    }
}
