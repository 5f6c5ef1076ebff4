//! Build a frame source from its configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use contracts::{FrameSource, SourceConfig, SourceType};
use tracing::instrument;

use crate::error::{CaptureError, Result};
use crate::file::{FileFrameSource, FileSourceConfig};
use crate::mock::{MockFrameSource, MockSourceConfig};
use crate::nal::Codec;

/// Create the frame source described by `config`
#[instrument(
    name = "capture_create_source",
    skip(config),
    fields(source_id = %config.id, source_type = ?config.source_type)
)]
pub fn create_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config.source_type {
        SourceType::Mock => {
            let defaults = MockSourceConfig::default();
            let mock = MockSourceConfig {
                source_id: config.id.clone(),
                fps: config.fps,
                frame_size: param(&config.params, "frame_size")?.unwrap_or(defaults.frame_size),
                gop: param(&config.params, "gop")?.unwrap_or(defaults.gop),
                max_frames: param(&config.params, "max_frames")?,
                disconnect_after: param(&config.params, "disconnect_after")?,
                paced: true,
            };
            Ok(Box::new(MockFrameSource::new(mock)))
        }
        SourceType::File => {
            let path = config
                .params
                .get("path")
                .map(PathBuf::from)
                .ok_or_else(|| CaptureError::invalid_param("path", "missing"))?;
            let codec = match config.params.get("codec") {
                Some(name) => Codec::from_name(name)
                    .ok_or_else(|| CaptureError::invalid_param("codec", name.clone()))?,
                None => Codec::default(),
            };
            let file = FileSourceConfig {
                source_id: config.id.clone(),
                path,
                codec,
                fps: config.fps,
                loop_playback: param(&config.params, "loop")?.unwrap_or(false),
            };
            Ok(Box::new(FileFrameSource::open(file)?))
        }
    }
}

fn param<T: FromStr>(params: &HashMap<String, String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    params
        .get(name)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| CaptureError::invalid_param(name, format!("'{}': {}", raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_config(source_type: SourceType, params: &[(&str, &str)]) -> SourceConfig {
        SourceConfig {
            id: "cam".into(),
            source_type,
            fps: 500.0,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn builds_mock_with_params() {
        let config = source_config(SourceType::Mock, &[("frame_size", "8"), ("max_frames", "1")]);
        let mut source = create_source(&config).unwrap();
        assert_eq!(source.source_id(), "cam");
        assert!(source.next_frame().is_ok());
        assert!(source.next_frame().unwrap_err().is_end_of_stream());
    }

    #[test]
    fn rejects_bad_numeric_param() {
        let config = source_config(SourceType::Mock, &[("gop", "often")]);
        let err = create_source(&config).err().unwrap();
        assert!(err.to_string().contains("gop"));
    }

    #[test]
    fn file_source_requires_path_and_known_codec() {
        let config = source_config(SourceType::File, &[]);
        assert!(matches!(
            create_source(&config).err().unwrap(),
            CaptureError::InvalidParam { .. }
        ));

        let config = source_config(SourceType::File, &[("path", "x.ivf"), ("codec", "vp9")]);
        let err = create_source(&config).err().unwrap();
        assert!(err.to_string().contains("codec"));
    }
}
