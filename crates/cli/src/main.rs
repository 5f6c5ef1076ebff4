//! # framecast CLI
//!
//! 命令行入口。
//!
//! 退出码：0 正常结束，1 配置或运行错误，2 采集设备故障 (已完成优雅关闭)。

mod cli;
mod commands;
mod error;
mod pipeline;

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};
use error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = observability::init_tracing(cli.log_format.into(), cli.log_level()) {
        eprintln!("framecast: {e:#}");
        return ExitCode::FAILURE;
    }

    info!(version = env!("CARGO_PKG_VERSION"), "framecast starting");

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Command failed");
            exit_code(&e)
        }
    }
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    match error.downcast_ref::<CliError>() {
        Some(CliError::DeviceFailure { .. }) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
