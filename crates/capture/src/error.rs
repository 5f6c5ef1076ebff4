//! Capture 错误类型

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Capture 错误
#[derive(Debug, Error)]
pub enum CaptureError {
    /// 采集通道已关闭
    #[error("capture channel closed for source {source_id}")]
    ChannelClosed {
        /// 帧源 ID
        source_id: String,
    },

    /// 码流文件打开失败
    #[error("failed to open stream file {path}: {source}")]
    Open {
        /// 文件路径
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 码流中没有可用的帧
    #[error("stream file {path} contains no access units")]
    EmptyStream {
        /// 文件路径
        path: PathBuf,
    },

    /// 参数非法
    #[error("invalid source parameter '{name}': {message}")]
    InvalidParam {
        /// 参数名
        name: String,
        /// 错误消息
        message: String,
    },
}

impl CaptureError {
    pub fn invalid_param(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<CaptureError> for ContractError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::ChannelClosed { source_id } => {
                ContractError::device_disconnected(source_id, "capture channel closed")
            }
            CaptureError::InvalidParam { name, message } => {
                ContractError::config_validation(format!("source.params.{name}"), message)
            }
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Capture Result 类型别名
pub type Result<T> = std::result::Result<T, CaptureError>;
