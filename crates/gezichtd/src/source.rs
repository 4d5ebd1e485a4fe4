//! Image sources: files on disk, in-memory buffers, and Unix-socket streams.

use image::RgbImage;
use std::io::Read;
use std::os::unix::net::UnixStream;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to load image {path}: {source}")]
    File {
        path: String,
        source: image::ImageError,
    },
    #[error("failed to decode image data: {0}")]
    Decode(image::ImageError),
    #[error("failed to connect to stream {path}: {source}")]
    Connect {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to read stream {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("stream {0} closed without sending any data")]
    EmptyStream(String),
}

/// Decode an image file into RGB pixels.
pub fn load_image_file(path: &Path) -> Result<RgbImage, SourceError> {
    let image = image::open(path).map_err(|source| SourceError::File {
        path: path.display().to_string(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Decode an in-memory encoded image (format guessed from its header).
pub fn load_image_bytes(bytes: &[u8]) -> Result<RgbImage, SourceError> {
    let image = image::load_from_memory(bytes).map_err(SourceError::Decode)?;
    Ok(image.to_rgb8())
}

/// Connect to a Unix socket and read until the peer closes the connection.
///
/// Blocks with no timeout.
pub fn read_stream(path: &Path) -> Result<Vec<u8>, SourceError> {
    let display = || path.display().to_string();

    let mut stream = UnixStream::connect(path).map_err(|source| SourceError::Connect {
        path: display(),
        source,
    })?;

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).map_err(|source| SourceError::Read {
        path: display(),
        source,
    })?;

    if buf.is_empty() {
        return Err(SourceError::EmptyStream(display()));
    }

    tracing::debug!(path = %path.display(), bytes = buf.len(), "stream read complete");
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::{Cursor, Write};
    use std::os::unix::net::UnixListener;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// Serve `payload` to the first client on a fresh socket, then close.
    fn serve_once(dir: &Path, payload: Vec<u8>) -> (std::path::PathBuf, std::thread::JoinHandle<()>) {
        let path = dir.join("stream.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let handle = std::thread::spawn(move || {
            let (mut client, _) = listener.accept().unwrap();
            for chunk in payload.chunks(7) {
                client.write_all(chunk).unwrap();
            }
        });
        (path, handle)
    }

    #[test]
    fn test_load_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])).save(&path).unwrap();

        let image = load_image_file(&path).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_load_image_file_missing() {
        let err = load_image_file(Path::new("/nonexistent/face.png")).unwrap_err();
        assert!(matches!(err, SourceError::File { .. }));
        assert!(err.to_string().contains("/nonexistent/face.png"));
    }

    #[test]
    fn test_load_image_bytes() {
        let bytes = png_bytes(&RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));
        assert_eq!(load_image_bytes(&bytes).unwrap().dimensions(), (2, 2));
        assert!(matches!(load_image_bytes(b"garbage"), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_read_stream_accumulates_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let payload: Vec<u8> = (0..=255).collect();
        let (path, handle) = serve_once(dir.path(), payload.clone());

        assert_eq!(read_stream(&path).unwrap(), payload);
        handle.join().unwrap();
    }

    #[test]
    fn test_read_stream_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let (path, handle) = serve_once(dir.path(), Vec::new());

        assert!(matches!(read_stream(&path), Err(SourceError::EmptyStream(_))));
        handle.join().unwrap();
    }

    #[test]
    fn test_read_stream_connect_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_stream(&dir.path().join("missing.sock")).unwrap_err();
        assert!(matches!(err, SourceError::Connect { .. }));
    }
}
