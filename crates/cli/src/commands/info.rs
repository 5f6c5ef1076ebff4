//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::StreamBlueprint;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    source: SourceInfo,
    sinks: Vec<SinkInfo>,
    shutdown_grace_ms: u64,
}

#[derive(Serialize)]
struct SourceInfo {
    id: String,
    source_type: String,
    fps: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    slot_policy: String,
    demand_hz: f64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args.params);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(blueprint: &StreamBlueprint, with_params: bool) -> ConfigInfo {
    let params = |map: &std::collections::HashMap<String, String>| -> BTreeMap<String, String> {
        if with_params {
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        } else {
            BTreeMap::new()
        }
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        source: SourceInfo {
            id: blueprint.source.id.clone(),
            source_type: format!("{:?}", blueprint.source.source_type),
            fps: blueprint.source.fps,
            params: params(&blueprint.source.params),
        },
        sinks: blueprint
            .sinks
            .iter()
            .map(|sink| SinkInfo {
                name: sink.name.clone(),
                sink_type: format!("{:?}", sink.sink_type),
                slot_policy: format!("{:?}", sink.slot_policy),
                demand_hz: blueprint.demand_hz_for(sink),
                params: params(&sink.params),
            })
            .collect(),
        shutdown_grace_ms: blueprint.shutdown.grace_ms,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 framecast Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("📷 Source");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ ID: {}", info.source.id);
    println!("   ├─ Type: {}", info.source.source_type);
    if info.source.params.is_empty() {
        println!("   └─ FPS: {}", info.source.fps);
    } else {
        println!("   ├─ FPS: {}", info.source.fps);
        print_params("   ", &info.source.params);
    }

    if info.sinks.is_empty() {
        println!("\n📤 Sinks: none");
    } else {
        println!("\n📤 Sinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let is_last = i == info.sinks.len() - 1;
            let prefix = if is_last { "└─" } else { "├─" };
            let child_prefix = if is_last { "      " } else { "   │  " };
            println!(
                "   {} {} ({}, {}, {:.1} Hz)",
                prefix, sink.name, sink.sink_type, sink.slot_policy, sink.demand_hz
            );
            if !sink.params.is_empty() {
                print_params(child_prefix, &sink.params);
            }
        }
    }

    println!("\n⏱  Shutdown grace: {} ms", info.shutdown_grace_ms);
    println!();
}

fn print_params(indent: &str, params: &BTreeMap<String, String>) {
    for (j, (key, value)) in params.iter().enumerate() {
        let prefix = if j == params.len() - 1 { "└─" } else { "├─" };
        println!("{}{} {} = {}", indent, prefix, key, value);
    }
}
