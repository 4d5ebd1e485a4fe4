use serde::{Deserialize, Serialize};

/// Euclidean distance under which two ArcFace encodings count as the same person.
///
/// Encodings are L2-normalised, so distance `d` relates to cosine similarity `s`
/// by `d = sqrt(2 - 2s)`; 1.10 corresponds to a similarity of roughly 0.40.
pub const DEFAULT_TOLERANCE: f32 = 1.10;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Intersection-over-union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let inter_h =
            ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = inter_w * inter_h;
        let union = self.width * self.height + other.width * other.height - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }

    /// Convert to a pixel rectangle clamped to a `frame_width` × `frame_height` frame.
    pub fn to_location(&self, frame_width: u32, frame_height: u32) -> FaceLocation {
        let clamp = |v: f32, max: u32| v.round().clamp(0.0, max as f32) as u32;
        FaceLocation {
            top: clamp(self.y, frame_height),
            right: clamp(self.x + self.width, frame_width),
            bottom: clamp(self.y + self.height, frame_height),
            left: clamp(self.x, frame_width),
        }
    }
}

/// Face rectangle in pixel offsets, ordered the way it goes over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

/// Face encoding: the identity signature of one detected face.
///
/// Serialized as a bare array of numbers so clients can cache and replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance. Encodings of different length are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Element-wise test of a candidate encoding against known encodings.
pub trait Matcher {
    /// Returns one flag per entry of `known`, true where it matches `candidate`.
    fn compare(&self, known: &[Embedding], candidate: &Embedding) -> Vec<bool>;
}

/// Distance-under-threshold matcher.
#[derive(Debug, Clone, Copy)]
pub struct DistanceMatcher {
    pub tolerance: f32,
}

impl Default for DistanceMatcher {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Matcher for DistanceMatcher {
    fn compare(&self, known: &[Embedding], candidate: &Embedding) -> Vec<bool> {
        compare_faces(known, candidate, self.tolerance)
    }
}

/// Flag every known encoding whose distance to `candidate` is within `tolerance`.
pub fn compare_faces(known: &[Embedding], candidate: &Embedding, tolerance: f32) -> Vec<bool> {
    known
        .iter()
        .map(|k| k.euclidean_distance(candidate) <= tolerance)
        .collect()
}
