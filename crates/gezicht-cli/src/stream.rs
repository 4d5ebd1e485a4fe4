//! Feeds an image file to the server through a throwaway Unix socket.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long `finish` waits for a transfer the server has already consumed.
const FINISH_GRACE: Duration = Duration::from_millis(500);

/// A listening socket that writes one file to its first client, then closes.
///
/// The socket file is removed on `finish` or drop.
pub struct StreamSocket {
    path: PathBuf,
    sender: Option<JoinHandle<Result<u64>>>,
}

impl StreamSocket {
    /// Bind `gezicht_stream_<uuid>` in the temp dir and start serving `file`.
    pub async fn serve_file(file: &Path) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("gezicht_stream_{}", Uuid::new_v4()));
        Self::serve_file_at(file, path).await
    }

    async fn serve_file_at(file: &Path, path: PathBuf) -> Result<Self> {
        let mut source = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("opening {}", file.display()))?;
        let listener =
            UnixListener::bind(&path).with_context(|| format!("binding {}", path.display()))?;
        tracing::debug!(socket = %path.display(), file = %file.display(), "stream socket ready");

        let sender = tokio::spawn(async move {
            let (mut client, _) = listener.accept().await.context("accepting stream client")?;
            let sent = tokio::io::copy(&mut source, &mut client)
                .await
                .context("sending image")?;
            client.shutdown().await.context("closing stream")?;
            Ok(sent)
        });

        Ok(Self {
            path,
            sender: Some(sender),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the transfer and report how many bytes went out.
    pub async fn finish(mut self) -> Result<u64> {
        let mut sender = self.sender.take().context("stream already finished")?;
        match tokio::time::timeout(FINISH_GRACE, &mut sender).await {
            Ok(joined) => joined.context("stream sender panicked")?,
            Err(_) => {
                // The server answered without reading the socket.
                sender.abort();
                Ok(0)
            }
        }
    }
}

impl Drop for StreamSocket {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            sender.abort();
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(socket = %self.path.display(), error = %e, "socket cleanup");
        }
    }
}
