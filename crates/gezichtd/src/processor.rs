use crate::camera::{CaptureError, LazyCamera};
use crate::pipeline;
use crate::protocol::{
    AddResult, Command, CommandResult, DetectResult, Empty, LearnResult, Request, Response,
};
use crate::source::{self, SourceError};
use gezicht_core::{DistanceMatcher, Embedding, EngineError, FaceEngine, Registry};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("face engine failed: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Camera(#[from] CaptureError),
    #[error("no face found in {0}")]
    NoFace(String),
    #[error("encoding {0} is empty")]
    EmptyEncoding(usize),
    #[error("learn-face stopped at path {position} of {total} ({path}), {succeeded} succeeded, nothing stored: {source}")]
    LearnAborted {
        position: usize,
        total: usize,
        succeeded: usize,
        path: String,
        source: Box<CommandError>,
    },
}

/// Owns the registry, the engine and the camera; turns requests into responses.
pub struct CommandProcessor {
    engine: Box<dyn FaceEngine>,
    registry: Registry,
    matcher: DistanceMatcher,
    camera: LazyCamera,
    max_dimension: u32,
}

impl CommandProcessor {
    pub fn new(
        engine: Box<dyn FaceEngine>,
        camera: LazyCamera,
        matcher: DistanceMatcher,
        max_dimension: u32,
    ) -> Self {
        Self {
            engine,
            registry: Registry::new(),
            matcher,
            camera,
            max_dimension,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one request. Failures become error responses; nothing here panics
    /// or ends the loop.
    pub fn handle(&mut self, request: Request) -> Response {
        let Request { id, command } = request;
        let kind = command.name();
        tracing::debug!(command = kind, id = %id, "handling request");

        let outcome = match command {
            Command::LearnFace { name, paths } => {
                self.learn_face(&name, &paths).map(CommandResult::Learn)
            }
            Command::AddFaceEncoding { name, encodings } => {
                self.add_face_encoding(&name, encodings).map(CommandResult::Add)
            }
            Command::DetectFace { file_path } => self.detect_face(&file_path).map(CommandResult::Detect),
            Command::DetectPicam => self.detect_picam().map(CommandResult::Detect),
            Command::DetectStream { stream_path } => {
                self.detect_stream(&stream_path).map(CommandResult::Detect)
            }
        };

        match outcome {
            Ok(result) => Response::success(id, result),
            Err(err) => {
                tracing::warn!(command = kind, id = %id, error = %err, "command failed");
                let result = match kind {
                    "learn-face" => CommandResult::Learn(LearnResult::default()),
                    _ => CommandResult::Empty(Empty {}),
                };
                Response::failure(id, result, err.to_string())
            }
        }
    }

    /// Encode the first face of every path, then store them all or none.
    fn learn_face(&mut self, name: &str, paths: &[PathBuf]) -> Result<LearnResult, CommandError> {
        let mut learned = Vec::with_capacity(paths.len());

        for (index, path) in paths.iter().enumerate() {
            let encoding = self.first_encoding(path).map_err(|source| CommandError::LearnAborted {
                position: index + 1,
                total: paths.len(),
                succeeded: index,
                path: path.display().to_string(),
                source: Box::new(source),
            })?;
            learned.push(encoding);
        }

        self.registry.append(name, learned.iter().cloned());
        tracing::info!(name, count = learned.len(), "learned face");

        Ok(LearnResult {
            count: learned.len(),
            encodings: learned,
        })
    }

    fn first_encoding(&mut self, path: &Path) -> Result<Embedding, CommandError> {
        let image = source::load_image_file(path)?;
        self.engine
            .detect(&image)?
            .into_iter()
            .next()
            .map(|face| face.encoding)
            .ok_or_else(|| CommandError::NoFace(path.display().to_string()))
    }

    fn add_face_encoding(&mut self, name: &str, encodings: Vec<Embedding>) -> Result<AddResult, CommandError> {
        if let Some(index) = encodings.iter().position(|e| e.values.is_empty()) {
            return Err(CommandError::EmptyEncoding(index));
        }

        let count = self.registry.append(name, encodings);
        tracing::info!(name, count, "added face encodings");
        Ok(AddResult { count })
    }

    fn detect_face(&mut self, path: &Path) -> Result<DetectResult, CommandError> {
        let image = source::load_image_file(path)?;
        self.detect(image)
    }

    fn detect_picam(&mut self) -> Result<DetectResult, CommandError> {
        tracing::debug!(camera_open = self.camera.is_open(), "detect-picam");
        let image = self.camera.capture()?;
        self.detect(image)
    }

    fn detect_stream(&mut self, path: &Path) -> Result<DetectResult, CommandError> {
        let bytes = source::read_stream(path)?;
        let image = source::load_image_bytes(&bytes)?;
        self.detect(image)
    }

    fn detect(&mut self, image: RgbImage) -> Result<DetectResult, CommandError> {
        Ok(pipeline::detect_and_match(
            image,
            self.engine.as_mut(),
            &mut self.registry,
            &self.matcher,
            self.max_dimension,
        )?)
    }
}
