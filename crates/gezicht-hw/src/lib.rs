//! gezicht-hw: V4L2 camera capture delivering RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, PixelFormat};
pub use frame::{Frame, FrameError};
