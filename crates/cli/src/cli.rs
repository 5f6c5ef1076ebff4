//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// framecast - capture an encoded video stream and fan it out to sinks
#[derive(Parser, Debug)]
#[command(
    name = "framecast",
    author,
    version,
    about = "Capture an encoded video stream and fan it out to live sinks",
    long_about = "Pulls encoded frames from a capture source and distributes the latest \n\
                  frame to every configured sink (UDP stream, file recording, log).\n\n\
                  Each sink pulls at its own pace; a slow sink never stalls the others."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "FRAMECAST_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "FRAMECAST_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log level implied by -v / -q
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the capture and distribution pipeline
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "framecast.toml",
        env = "FRAMECAST_CONFIG"
    )]
    pub config: PathBuf,

    /// Override the source frame rate
    #[arg(long, env = "FRAMECAST_FPS")]
    pub fps: Option<f64>,

    /// Override the destination of every network sink
    #[arg(long, env = "FRAMECAST_UDP_ADDR")]
    pub udp_addr: Option<SocketAddr>,

    /// Override the output directory of every file sink
    #[arg(long, env = "FRAMECAST_RECORD_DIR")]
    pub record_dir: Option<PathBuf>,

    /// Stop after this many published frames (0 = unlimited)
    #[arg(long, default_value = "0", env = "FRAMECAST_MAX_FRAMES")]
    pub max_frames: u64,

    /// Stop after this many seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "FRAMECAST_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without running pipeline
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "FRAMECAST_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "framecast.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "framecast.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink parameters
    #[arg(long)]
    pub params: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
