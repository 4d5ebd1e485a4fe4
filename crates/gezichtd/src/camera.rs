//! Lazily opened camera for `detect-picam`.

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("camera capture failed: {0}")]
    Capture(String),
}

/// Something that hands out RGB frames.
pub trait FrameSource {
    fn capture(&mut self) -> Result<RgbImage, CaptureError>;
}

/// Opens the camera device on demand.
pub type CameraOpener = Box<dyn FnMut() -> Result<Box<dyn FrameSource>, CaptureError>>;

/// Camera handle opened on first use and held for the rest of the process.
///
/// A failed open leaves the slot empty so the next request tries again; an
/// open handle is never replaced.
pub struct LazyCamera {
    opener: CameraOpener,
    handle: Option<Box<dyn FrameSource>>,
}

impl LazyCamera {
    pub fn new(opener: CameraOpener) -> Self {
        Self { opener, handle: None }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Capture one frame, opening the device first if needed.
    pub fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        let source = match self.handle.take() {
            Some(source) => source,
            None => {
                let source = (self.opener)()?;
                tracing::info!("camera opened");
                source
            }
        };
        self.handle.insert(source).capture()
    }
}

#[cfg(feature = "camera")]
mod v4l_camera {
    use super::{CameraOpener, CaptureError, FrameSource};
    use gezicht_hw::{Camera, CameraError};
    use image::RgbImage;

    struct V4lSource(Camera);

    impl FrameSource for V4lSource {
        fn capture(&mut self) -> Result<RgbImage, CaptureError> {
            let frame = self
                .0
                .capture_frame()
                .map_err(|e| CaptureError::Capture(e.to_string()))?;
            frame
                .into_image()
                .map_err(|e| CaptureError::Capture(e.to_string()))
        }
    }

    /// Opener for a V4L2 device at a fixed resolution.
    pub fn opener(device: String, width: u32, height: u32) -> CameraOpener {
        Box::new(move || {
            let camera = Camera::open(&device, width, height).map_err(|e| match e {
                CameraError::CaptureFailed(_) => CaptureError::Capture(e.to_string()),
                _ => CaptureError::Unavailable(e.to_string()),
            })?;
            tracing::info!(
                device = %camera.device_path,
                width = camera.width,
                height = camera.height,
                "V4L2 camera ready"
            );
            Ok(Box::new(V4lSource(camera)) as Box<dyn FrameSource>)
        })
    }
}

/// Opener for the configured camera device.
#[cfg(feature = "camera")]
pub fn device_opener(device: String, width: u32, height: u32) -> CameraOpener {
    v4l_camera::opener(device, width, height)
}

/// Built without camera support: every open fails.
#[cfg(not(feature = "camera"))]
pub fn device_opener(device: String, _width: u32, _height: u32) -> CameraOpener {
    Box::new(move || {
        Err(CaptureError::Unavailable(format!(
            "{device}: built without camera support"
        )))
    })
}
