//! File 帧源 - 回放已录制的 Annex-B 码流
//!
//! 读取 FileSink 录制的 .h265/.h264 文件，按访问单元切分后按帧率回放。

use std::path::PathBuf;

use bytes::Bytes;
use contracts::{ContractError, Frame, FrameSource};
use tracing::{debug, info};

use crate::error::{CaptureError, Result};
use crate::nal::{split_access_units, Codec};
use crate::pacer::Pacer;

/// File 帧源配置
#[derive(Debug, Clone)]
pub struct FileSourceConfig {
    /// 帧源 ID
    pub source_id: String,

    /// 码流文件路径
    pub path: PathBuf,

    /// 码流编码
    pub codec: Codec,

    /// 回放帧率 (Hz)
    pub fps: f64,

    /// 读到结尾后是否从头循环
    pub loop_playback: bool,
}

/// File 帧源
pub struct FileFrameSource {
    config: FileSourceConfig,
    units: Vec<Bytes>,
    cursor: usize,
    seq: u64,
    pacer: Pacer,
}

impl FileFrameSource {
    /// 打开码流文件并切分访问单元
    pub fn open(config: FileSourceConfig) -> Result<Self> {
        let data = std::fs::read(&config.path).map_err(|source| CaptureError::Open {
            path: config.path.clone(),
            source,
        })?;
        let units = split_access_units(&Bytes::from(data), config.codec);
        if units.is_empty() {
            return Err(CaptureError::EmptyStream {
                path: config.path.clone(),
            });
        }

        info!(
            source_id = %config.source_id,
            path = %config.path.display(),
            units = units.len(),
            loop_playback = config.loop_playback,
            "file frame source opened"
        );

        Ok(Self {
            pacer: Pacer::new(config.fps),
            config,
            units,
            cursor: 0,
            seq: 0,
        })
    }

    /// 访问单元数量
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl FrameSource for FileFrameSource {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn next_frame(&mut self) -> std::result::Result<Frame, ContractError> {
        if self.cursor >= self.units.len() {
            if !self.config.loop_playback {
                return Err(ContractError::end_of_stream(&self.config.source_id));
            }
            debug!(source_id = %self.config.source_id, "rewinding stream file");
            self.cursor = 0;
        }

        self.pacer.wait();

        let data = self.units[self.cursor].clone();
        self.cursor += 1;
        self.seq += 1;

        Ok(Frame::new(self.seq, self.pacer.elapsed_secs(), data))
    }
}
