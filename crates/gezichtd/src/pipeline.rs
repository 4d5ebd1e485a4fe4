//! Detect-and-match: downscale, detect, name each face against the registry.

use crate::protocol::{DetectResult, DetectedFace, Size};
use gezicht_core::{EngineError, FaceEngine, Matcher, Registry};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Frames with a side longer than this are downscaled before detection.
pub const DEFAULT_MAX_DIMENSION: u32 = 450;

/// Target size when the larger side exceeds `max_dimension`, scaled uniformly
/// by `max_dimension / max(width, height)`.
pub fn downscale_size(width: u32, height: u32, max_dimension: u32) -> Option<Size> {
    let largest = width.max(height);
    if largest <= max_dimension {
        return None;
    }
    let coef = max_dimension as f64 / largest as f64;
    let scale = |v: u32| ((v as f64 * coef).round() as u32).max(1);
    Some(Size {
        width: scale(width),
        height: scale(height),
    })
}

/// Run the engine on `image` (downscaled if needed) and name every face found.
pub fn detect_and_match(
    image: RgbImage,
    engine: &mut dyn FaceEngine,
    registry: &mut Registry,
    matcher: &dyn Matcher,
    max_dimension: u32,
) -> Result<DetectResult, EngineError> {
    let (width, height) = image.dimensions();
    let original_size = Size { width, height };

    let resized = downscale_size(width, height, max_dimension);
    let frame = match resized {
        Some(size) => {
            tracing::debug!(width, height, to_width = size.width, to_height = size.height, "downscaling frame");
            imageops::resize(&image, size.width, size.height, FilterType::Triangle)
        }
        None => image,
    };

    let detections = engine.detect(&frame)?;

    let faces: Vec<DetectedFace> = detections
        .into_iter()
        .map(|d| DetectedFace {
            location: d.location,
            name: registry
                .lookup_and_rotate(&d.encoding, matcher)
                .unwrap_or_default(),
        })
        .collect();

    tracing::debug!(
        faces = faces.len(),
        recognized = faces.iter().filter(|f| !f.name.is_empty()).count(),
        "detect-and-match done"
    );

    Ok(DetectResult {
        original_size,
        resized,
        faces,
    })
}
