//! 配置校验模块
//!
//! 校验规则：
//! - fps > 0
//! - file 帧源必须提供 path
//! - sink 名称非空且唯一
//! - demand_hz > 0 (若设置)
//! - network sink 的 addr / framing / max_packet_size 合法
//! - shutdown.grace_ms > 0

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{
    ContractError, SinkConfig, SinkType, SourceType, StreamBlueprint, MAX_UDP_PAYLOAD,
    MIN_PACKET_SIZE,
};

/// UDP 负载上限 (IPv4)

/// 校验 StreamBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    validate_source(blueprint)?;
    validate_sink_names(blueprint)?;
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        validate_sink(idx, sink)?;
    }
    validate_shutdown(blueprint)?;
    Ok(())
}

/// 校验帧源
fn validate_source(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    let source = &blueprint.source;

    if !(source.fps.is_finite() && source.fps > 0.0) {
        return Err(ContractError::config_validation(
            "source.fps",
            format!("fps must be > 0, got {}", source.fps),
        ));
    }

    if source.source_type == SourceType::File && !source.params.contains_key("path") {
        return Err(ContractError::config_validation(
            "source.params.path",
            "file source requires a 'path' parameter",
        ));
    }

    Ok(())
}

/// 校验 sink 名称唯一性
fn validate_sink_names(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
    }
    Ok(())
}

/// 校验单个 sink
fn validate_sink(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    if let Some(hz) = sink.demand_hz {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(ContractError::config_validation(
                format!("sinks[{}].demand_hz", idx),
                format!("demand_hz must be > 0, got {}", hz),
            ));
        }
    }

    if sink.sink_type == SinkType::Network {
        validate_network_params(idx, sink)?;
    }

    Ok(())
}

fn validate_network_params(idx: usize, sink: &SinkConfig) -> Result<(), ContractError> {
    let addr = sink.params.get("addr").ok_or_else(|| {
        ContractError::config_validation(
            format!("sinks[{}].params.addr", idx),
            "network sink requires an 'addr' parameter",
        )
    })?;

    addr.parse::<SocketAddr>().map_err(|e| {
        ContractError::config_validation(
            format!("sinks[{}].params.addr", idx),
            format!("invalid address '{}': {}", addr, e),
        )
    })?;

    if let Some(framing) = sink.params.get("framing") {
        if framing != "raw" && framing != "fragmented" {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.framing", idx),
                format!("unknown framing '{}'", framing),
            ));
        }
    }

    if let Some(size) = sink.params.get("max_packet_size") {
        match size.parse::<usize>() {
            Ok(n) if (MIN_PACKET_SIZE..=MAX_UDP_PAYLOAD).contains(&n) => {}
            _ => {
                return Err(ContractError::config_validation(
                    format!("sinks[{}].params.max_packet_size", idx),
                    format!(
                        "max_packet_size must be in {}..={}",
                        MIN_PACKET_SIZE, MAX_UDP_PAYLOAD
                    ),
                ))
            }
        }
    }

    Ok(())
}

/// 校验关闭策略
fn validate_shutdown(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
    if blueprint.shutdown.grace_ms == 0 {
        return Err(ContractError::config_validation(
            "shutdown.grace_ms",
            "grace_ms must be > 0",
        ));
    }
    Ok(())
}
