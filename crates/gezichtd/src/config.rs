use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Server configuration.
///
/// Layered as: built-in defaults, then the TOML file named by `GEZICHT_CONFIG`
/// (if set), then individual `GEZICHT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// V4L2 device used by `detect-picam` (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width.
    pub camera_width: u32,
    /// Requested capture height.
    pub camera_height: u32,
    /// Euclidean distance under which two encodings match.
    pub match_tolerance: f32,
    /// Frames larger than this on either side are downscaled before detection.
    pub max_dimension: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: gezicht_core::default_model_dir(),
            camera_device: "/dev/video0".to_string(),
            camera_width: 320,
            camera_height: 240,
            match_tolerance: gezicht_core::DEFAULT_TOLERANCE,
            max_dimension: crate::pipeline::DEFAULT_MAX_DIMENSION,
        }
    }
}

impl Config {
    /// Load configuration from the optional config file and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("GEZICHT_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Parse a TOML config file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `GEZICHT_*` overrides looked up through `lookup`.
    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup("GEZICHT_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(device) = lookup("GEZICHT_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        override_parsed(&lookup, "GEZICHT_CAMERA_WIDTH", &mut self.camera_width);
        override_parsed(&lookup, "GEZICHT_CAMERA_HEIGHT", &mut self.camera_height);
        override_parsed(&lookup, "GEZICHT_MATCH_TOLERANCE", &mut self.match_tolerance);
        override_parsed(&lookup, "GEZICHT_MAX_DIMENSION", &mut self.max_dimension);
        self
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(gezicht_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(gezicht_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

fn override_parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config override"),
    }
}
