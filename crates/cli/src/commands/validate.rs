//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{SinkType, SlotPolicy, StreamBlueprint};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    source_id: String,
    source_type: String,
    fps: f64,
    sink_count: usize,
    grace_ms: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    source_id: blueprint.source.id.clone(),
                    source_type: format!("{:?}", blueprint.source.source_type),
                    fps: blueprint.source.fps,
                    sink_count: blueprint.sinks.len(),
                    grace_ms: blueprint.shutdown.grace_ms,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &StreamBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - published frames will be discarded".to_string());
    }

    for sink in &blueprint.sinks {
        let hz = blueprint.demand_hz_for(sink);
        if hz > blueprint.source.fps && sink.slot_policy == SlotPolicy::Peek {
            warnings.push(format!(
                "Sink '{}' pulls at {:.1} Hz above source fps {:.1} - frames will be forwarded more than once",
                sink.name, hz, blueprint.source.fps
            ));
        }
        if sink.sink_type == SinkType::File && !sink.params.contains_key("dir") {
            warnings.push(format!(
                "Sink '{}' has no 'dir' parameter - recording to ./recordings",
                sink.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!(
                "  Source: {} ({}, {} fps)",
                summary.source_id, summary.source_type, summary.fps
            );
            println!("  Sinks: {}", summary.sink_count);
            println!("  Shutdown grace: {} ms", summary.grace_ms);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
