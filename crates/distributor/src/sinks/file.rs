//! FileSink - records the encoded stream to a timestamped file
//!
//! Units are appended as-is, so the output is a playable elementary
//! stream (.h265 / .h264). The file name is fixed when the sink is built;
//! the file itself is created on `start()`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use contracts::{ContractError, DataSink, Frame, SinkType};
use tracing::{debug, info, instrument, warn};

const WRITE_BUFFER: usize = 256 * 1024;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output directory
    pub dir: PathBuf,
    /// File name prefix
    pub prefix: String,
    /// File extension, without the dot
    pub extension: String,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./recordings"),
            prefix: "recording".to_string(),
            extension: "h265".to_string(),
        }
    }
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            dir: params.get("dir").map(PathBuf::from).unwrap_or(defaults.dir),
            prefix: params.get("prefix").cloned().unwrap_or(defaults.prefix),
            extension: params
                .get("extension")
                .map(|e| e.trim_start_matches('.').to_string())
                .unwrap_or(defaults.extension),
        }
    }

    /// `{dir}/{prefix}_{YYYYmmdd_HHMMSS.mmm}.{ext}` for the current local time
    pub fn timestamped_path(&self) -> PathBuf {
        let stamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
        self.dir
            .join(format!("{}_{}.{}", self.prefix, stamp, self.extension))
    }
}

/// Sink that appends every forwarded frame to a file
pub struct FileSink {
    name: String,
    path: PathBuf,
    writer: Option<Box<dyn Write + Send>>,
    bytes_written: u64,
    frames_written: u64,
}

impl FileSink {
    /// Create a new FileSink, choosing its output path now
    pub fn new(name: impl Into<String>, config: &FileSinkConfig) -> Self {
        Self {
            name: name.into(),
            path: config.timestamped_path(),
            writer: None,
            bytes_written: 0,
            frames_written: 0,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(name: impl Into<String>, params: &HashMap<String, String>) -> Self {
        Self::new(name, &FileSinkConfig::from_params(params))
    }

    /// Write into an already opened writer instead of creating `path`
    pub fn with_writer(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        writer: impl Write + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            writer: Some(Box::new(writer)),
            bytes_written: 0,
            frames_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Create the output file without ever overwriting an existing one
    fn create_output(&mut self) -> io::Result<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned());

        let mut candidate = self.path.clone();
        for attempt in 1..=100u32 {
            match File::create_new(&candidate) {
                Ok(file) => {
                    self.path = candidate;
                    return Ok(file);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let name = match &extension {
                        Some(ext) => format!("{}-{}.{}", stem, attempt, ext),
                        None => format!("{}-{}", stem, attempt),
                    };
                    candidate = self.path.with_file_name(name);
                }
                Err(e) => return Err(e),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free file name next to {}", self.path.display()),
        ))
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SinkType {
        SinkType::File
    }

    #[instrument(name = "file_sink_start", skip(self), fields(sink = %self.name))]
    async fn start(&mut self) -> Result<(), ContractError> {
        if self.writer.is_none() {
            let file = self
                .create_output()
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
            self.writer = Some(Box::new(BufWriter::with_capacity(WRITE_BUFFER, file)));
        }
        info!(sink = %self.name, path = %self.path.display(), "recording started");
        Ok(())
    }

    async fn forward(&mut self, frame: &Frame) -> Result<(), ContractError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink not started"))?;

        writer.write_all(&frame.data).map_err(|e| {
            ContractError::sink_write(&self.name, format!("seq {}: {}", frame.seq, e))
        })?;

        self.bytes_written += frame.len() as u64;
        self.frames_written += 1;
        Ok(())
    }

    #[instrument(name = "file_sink_stop", skip(self), fields(sink = %self.name))]
    async fn stop(&mut self) -> Result<(), ContractError> {
        let Some(mut writer) = self.writer.take() else {
            debug!(sink = %self.name, "already stopped");
            return Ok(());
        };

        if let Err(e) = writer.flush() {
            warn!(sink = %self.name, error = %e, "flush failed on stop");
            return Err(ContractError::sink_write(&self.name, e.to_string()));
        }

        info!(
            sink = %self.name,
            path = %self.path.display(),
            frames = self.frames_written,
            bytes = self.bytes_written,
            "recording finished"
        );
        Ok(())
    }
}
