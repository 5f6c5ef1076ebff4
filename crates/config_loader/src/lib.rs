//! # Config Loader
//!
//! Turns a `framecast.toml` (or `.json`) file into a validated
//! [`StreamBlueprint`].
//!
//! Relative filesystem paths in the file (`source.params.path` of a file
//! source, `params.dir` of a file sink) are resolved against the directory
//! holding the configuration file, so a config can be run from anywhere.
//! Strings loaded with [`ConfigLoader::load_from_str`] are left untouched.
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), contracts::ContractError> {
//! let blueprint = ConfigLoader::load_from_path(Path::new("framecast.toml"))?;
//! println!("{} sinks at {} fps", blueprint.sinks.len(), blueprint.source.fps);
//! # Ok(())
//! # }
//! ```

mod parser;
mod validator;

pub use contracts::StreamBlueprint;
pub use parser::ConfigFormat;

use std::path::{Path, PathBuf};

use contracts::{ContractError, SinkType, SourceType};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load, resolve and validate a configuration file
    ///
    /// The format follows the file extension (`.toml` / `.json`).
    pub fn load_from_path(path: &Path) -> Result<StreamBlueprint, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let mut blueprint = parser::parse(&content, format)?;

        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            resolve_relative_paths(&mut blueprint, base);
        }

        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Parse and validate configuration text
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<StreamBlueprint, ContractError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }

    /// Validate an already constructed blueprint (e.g. after CLI overrides)
    pub fn validate(blueprint: &StreamBlueprint) -> Result<(), ContractError> {
        validator::validate(blueprint)
    }

    pub fn to_toml(blueprint: &StreamBlueprint) -> Result<String, ContractError> {
        parser::render(blueprint, ConfigFormat::Toml)
    }

    pub fn to_json(blueprint: &StreamBlueprint) -> Result<String, ContractError> {
        parser::render(blueprint, ConfigFormat::Json)
    }
}

fn resolve_relative_paths(blueprint: &mut StreamBlueprint, base: &Path) {
    if blueprint.source.source_type == SourceType::File {
        rebase_param(&mut blueprint.source.params, "path", base);
    }
    for sink in &mut blueprint.sinks {
        if sink.sink_type == SinkType::File {
            rebase_param(&mut sink.params, "dir", base);
        }
    }
}

fn rebase_param(params: &mut std::collections::HashMap<String, String>, key: &str, base: &Path) {
    if let Some(value) = params.get_mut(key) {
        let path = PathBuf::from(value.as_str());
        if path.is_relative() {
            *value = base.join(path).display().to_string();
        }
    }
}
