//! The face engine seam: detection plus encoding in one call.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, FaceLocation};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// One face found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedEncoding {
    pub location: FaceLocation,
    pub encoding: Embedding,
}

/// Finds every face in a frame and encodes it.
///
/// An empty result is not an error.
pub trait FaceEngine {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedEncoding>, EngineError>;
}

/// SCRFD detection followed by ArcFace encoding.
pub struct OnnxEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEngine {
    /// Load both models. Fails if either file is missing or unreadable.
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, EngineError> {
        let detector = FaceDetector::load(scrfd_path)?;
        tracing::info!(path = scrfd_path, "SCRFD detector loaded");

        let recognizer = FaceRecognizer::load(arcface_path)?;
        tracing::info!(path = arcface_path, "ArcFace recognizer loaded");

        Ok(Self { detector, recognizer })
    }
}

impl FaceEngine for OnnxEngine {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedEncoding>, EngineError> {
        let faces = self.detector.detect(image)?;
        let (width, height) = image.dimensions();

        faces
            .iter()
            .map(|face| {
                let encoding = self.recognizer.extract(image, face)?;
                Ok(DetectedEncoding {
                    location: face.to_location(width, height),
                    encoding,
                })
            })
            .collect()
    }
}
