//! gezicht-core: face registry, matching, and the face engine.
//!
//! The engine uses SCRFD for face detection and ArcFace for face encoding,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod engine;
pub mod recognizer;
pub mod registry;
pub mod types;

use std::path::PathBuf;

pub use engine::{DetectedEncoding, EngineError, FaceEngine, OnnxEngine};
pub use registry::Registry;
pub use types::{
    compare_faces, BoundingBox, DistanceMatcher, Embedding, FaceLocation, Matcher, DEFAULT_TOLERANCE,
};

/// SCRFD detection model file name.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// ArcFace recognition model file name.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default directory holding the ONNX model files.
///
/// `$XDG_DATA_HOME/gezicht/models`, falling back to `~/.local/share/gezicht/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("gezicht/models")
}
