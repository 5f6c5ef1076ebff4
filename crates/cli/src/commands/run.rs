//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::{SinkType, StreamBlueprint};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);
    config_loader::ConfigLoader::validate(&blueprint)
        .map_err(CliError::from)
        .context("Configuration invalid after command-line overrides")?;

    info!(
        source_id = %blueprint.source.id,
        source_type = ?blueprint.source.source_type,
        fps = blueprint.source.fps,
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        max_frames: (args.max_frames > 0).then_some(args.max_frames),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        frames_published = stats.frames_published,
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Pipeline finished"
    );
    stats.print_summary();

    if let Some(message) = stats.device_failure {
        return Err(CliError::DeviceFailure { message }.into());
    }
    if !stats.stop_errors.is_empty() {
        return Err(CliError::Shutdown {
            message: stats.stop_errors.join("; "),
        }
        .into());
    }

    info!("framecast finished");
    Ok(())
}

/// Apply command-line overrides on top of the file configuration
fn apply_overrides(blueprint: &mut StreamBlueprint, args: &RunArgs) {
    if let Some(fps) = args.fps {
        info!(fps, "Overriding source fps from CLI");
        blueprint.source.fps = fps;
    }

    for sink in &mut blueprint.sinks {
        match sink.sink_type {
            SinkType::Network => {
                if let Some(addr) = args.udp_addr {
                    info!(sink = %sink.name, %addr, "Overriding network destination from CLI");
                    sink.params.insert("addr".to_string(), addr.to_string());
                }
            }
            SinkType::File => {
                if let Some(dir) = &args.record_dir {
                    info!(sink = %sink.name, dir = %dir.display(), "Overriding recording directory from CLI");
                    sink.params
                        .insert("dir".to_string(), dir.display().to_string());
                }
            }
            SinkType::Log => {}
        }
    }
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &StreamBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Source:");
    println!("  ID: {}", blueprint.source.id);
    println!("  Type: {:?}", blueprint.source.source_type);
    println!("  FPS: {}", blueprint.source.fps);

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!(
                "  - {} ({:?}, {:?}, {:.1} Hz)",
                sink.name,
                sink.sink_type,
                sink.slot_policy,
                blueprint.demand_hz_for(sink)
            );
        }
    }

    println!("\nShutdown grace: {} ms", blueprint.shutdown.grace_ms);
    println!();
}
