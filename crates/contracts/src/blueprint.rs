//! StreamBlueprint - Config Loader 输出
//!
//! 描述完整的推流配置：帧源、输出 sink 列表、关闭策略。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的推流配置蓝图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamBlueprint {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 帧源设置
    pub source: SourceConfig,

    /// 输出路由配置
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,

    /// 关闭策略
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// 帧源配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// 帧源标识 (用于日志)
    #[serde(default = "default_source_id")]
    pub id: String,

    /// 帧源类型
    pub source_type: SourceType,

    /// 帧率 (Hz)，必须 > 0
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_source_id() -> String {
    "camera".to_string()
}

fn default_fps() -> f64 {
    30.0
}

/// 帧源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// 合成的编码帧 (无需硬件)
    Mock,
    /// 回放已录制的码流文件
    File,
}

/// Sink 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink 名称
    pub name: String,

    /// Sink 类型
    pub sink_type: SinkType,

    /// 帧槽读取策略
    #[serde(default)]
    pub slot_policy: SlotPolicy,

    /// 拉取频率 (Hz)，缺省时跟随帧源帧率
    #[serde(default)]
    pub demand_hz: Option<f64>,

    /// 类型特定参数
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// IPv4 下单个 UDP 数据报的最大负载
pub const MAX_UDP_PAYLOAD: usize = 65507;

/// network sink 的最小数据报大小，需容纳分片头与有效负载
pub const MIN_PACKET_SIZE: usize = 64;

/// Sink 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// 日志输出
    Log,
    /// 文件录制
    File,
    /// 网络输出 (UDP)
    Network,
}

/// 帧槽读取策略
///
/// `Peek` 保留当前帧，慢速消费者可能连续两次拿到同一帧；
/// `Drain` 取走后清空，没有新帧时拉取为空操作。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    #[default]
    Peek,
    Drain,
}

/// 关闭策略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 等待 sink 停止与生产线程退出的上限 (毫秒)
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
        }
    }
}

fn default_grace_ms() -> u64 {
    5000
}

impl ShutdownConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

impl StreamBlueprint {
    /// Demand rate for a sink, falling back to the source frame rate
    pub fn demand_hz_for(&self, sink: &SinkConfig) -> f64 {
        sink.demand_hz.unwrap_or(self.source.fps)
    }

    /// Find a sink configuration by name
    pub fn sink(&self, name: &str) -> Option<&SinkConfig> {
        self.sinks.iter().find(|sink| sink.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blueprint() -> StreamBlueprint {
        StreamBlueprint {
            version: ConfigVersion::V1,
            source: SourceConfig {
                id: "oak".into(),
                source_type: SourceType::Mock,
                fps: 30.0,
                params: HashMap::new(),
            },
            sinks: vec![
                SinkConfig {
                    name: "udp".into(),
                    sink_type: SinkType::Network,
                    slot_policy: SlotPolicy::Peek,
                    demand_hz: None,
                    params: HashMap::from([("addr".into(), "127.0.0.1:5400".into())]),
                },
                SinkConfig {
                    name: "record".into(),
                    sink_type: SinkType::File,
                    slot_policy: SlotPolicy::Drain,
                    demand_hz: Some(60.0),
                    params: HashMap::new(),
                },
            ],
            shutdown: ShutdownConfig::default(),
        }
    }

    #[test]
    fn demand_rate_follows_source_by_default() {
        let blueprint = sample_blueprint();
        assert_eq!(blueprint.demand_hz_for(&blueprint.sinks[0]), 30.0);
        assert_eq!(blueprint.demand_hz_for(&blueprint.sinks[1]), 60.0);
    }

    #[test]
    fn sink_lookup_by_name() {
        let blueprint = sample_blueprint();
        assert_eq!(
            blueprint.sink("record").map(|s| s.sink_type),
            Some(SinkType::File)
        );
        assert!(blueprint.sink("missing").is_none());
    }

    #[test]
    fn defaults_apply_on_deserialize() {
        let json = r#"{
            "source": { "source_type": "mock" },
            "sinks": [{ "name": "log", "sink_type": "log" }]
        }"#;
        let blueprint: StreamBlueprint = serde_json::from_str(json).unwrap();
        assert_eq!(blueprint.source.id, "camera");
        assert_eq!(blueprint.source.fps, 30.0);
        assert_eq!(blueprint.sinks[0].slot_policy, SlotPolicy::Peek);
        assert_eq!(blueprint.shutdown.grace(), Duration::from_secs(5));
    }
}
