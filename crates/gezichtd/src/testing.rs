//! Test doubles for the face engine and the camera.

use crate::camera::{CameraOpener, CaptureError, FrameSource};
use gezicht_core::{DetectedEncoding, Embedding, EngineError, FaceEngine, FaceLocation};
use image::{Rgb, RgbImage};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub fn solid(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
    RgbImage::from_pixel(width, height, color)
}

/// Black frame whose top row carries one fake face per colour.
pub fn faces(width: u32, height: u32, colors: &[Rgb<u8>]) -> RgbImage {
    let mut image = RgbImage::new(width, height);
    for (x, color) in colors.iter().enumerate() {
        image.put_pixel(x as u32, 0, *color);
    }
    image
}

/// Encoding the fake engine produces for a pixel.
pub fn encoding_of(color: Rgb<u8>) -> Embedding {
    Embedding::new(color.0.iter().map(|&c| c as f32 / 255.0).collect())
}

/// Write `image` as a PNG into `dir` and return its path.
pub fn write_png(dir: &Path, name: &str, image: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    image.save(&path).unwrap();
    path
}

/// Reads faces off the top row: every non-black pixel in row 0 is a face
/// whose encoding is that pixel's colour, located at `left = x`.
///
/// Records the dimensions of every frame it is given.
#[derive(Default)]
pub struct FakeEngine {
    pub frames: Rc<RefCell<Vec<(u32, u32)>>>,
}

impl FaceEngine for FakeEngine {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectedEncoding>, EngineError> {
        self.frames.borrow_mut().push(image.dimensions());

        Ok((0..image.width())
            .filter_map(|x| {
                let pixel = *image.get_pixel(x, 0);
                (pixel.0 != [0, 0, 0]).then(|| DetectedEncoding {
                    location: FaceLocation { top: 0, right: x + 1, bottom: 1, left: x },
                    encoding: encoding_of(pixel),
                })
            })
            .collect())
    }
}

/// Camera returning the same frame forever.
pub struct FakeCamera(RgbImage);

impl FrameSource for FakeCamera {
    fn capture(&mut self) -> Result<RgbImage, CaptureError> {
        Ok(self.0.clone())
    }
}

impl FakeCamera {
    /// Opener producing a `FakeCamera`, plus a counter of how often it ran.
    pub fn opener(frame: RgbImage) -> (CameraOpener, Rc<Cell<usize>>) {
        let opens = Rc::new(Cell::new(0));
        let counter = opens.clone();
        let opener: CameraOpener = Box::new(move || {
            counter.set(counter.get() + 1);
            Ok(Box::new(FakeCamera(frame.clone())) as Box<dyn FrameSource>)
        });
        (opener, opens)
    }
}
