//! 配置解析模块
//!
//! TOML 为主要格式，JSON 供脚本生成配置使用。

use std::fmt;
use std::path::Path;

use contracts::{ContractError, StreamBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式 (不区分大小写)
    pub fn from_extension(ext: &str) -> Option<Self> {
        if ext.eq_ignore_ascii_case("toml") {
            Some(Self::Toml)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// 从路径推断格式
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "cannot determine config format of {}: no extension",
                path.display()
            ))
        })?;
        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => f.write_str("TOML"),
            Self::Json => f.write_str("JSON"),
        }
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 按格式反序列化 StreamBlueprint，不做校验
pub fn parse(content: &str, format: ConfigFormat) -> Result<StreamBlueprint, ContractError> {
    let parsed: Result<StreamBlueprint, BoxError> = match format {
        ConfigFormat::Toml => toml::from_str(content).map_err(BoxError::from),
        ConfigFormat::Json => serde_json::from_str(content).map_err(BoxError::from),
    };
    parsed.map_err(|e| ContractError::ConfigParse {
        message: format!("{format} parse error: {e}"),
        source: Some(e),
    })
}

/// 按格式序列化 StreamBlueprint
pub fn render(blueprint: &StreamBlueprint, format: ConfigFormat) -> Result<String, ContractError> {
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(blueprint).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(blueprint).map_err(|e| e.to_string()),
    };
    rendered.map_err(|e| ContractError::config_parse(format!("{format} serialize error: {e}")))
}
