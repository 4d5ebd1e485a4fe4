//! Talks to a running gezichtd over its stdin/stdout.
//!
//! Requests carry a fresh UUID; a background task reads response lines and
//! hands each one to whoever is waiting on that id.

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

type Reply = Result<Value, String>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>;

/// One request/response channel to the server.
pub struct Connection<W> {
    writer: W,
    pending: Pending,
    router: JoinHandle<()>,
}

impl<W: AsyncWrite + Unpin> Connection<W> {
    pub fn new<R>(writer: W, reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let pending: Pending = Arc::default();
        let router = tokio::spawn(route_responses(reader, pending.clone()));
        Self {
            writer,
            pending,
            router,
        }
    }

    /// Send `command` with the fields of `args` and wait for its result.
    ///
    /// A response carrying an `error` becomes an `Err` with that message.
    pub async fn request(&mut self, command: &str, args: Value) -> Result<Value> {
        let id = Uuid::new_v4().to_string();

        let mut message = match args {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => bail!("request arguments must be an object, got {other}"),
        };
        message.insert("id".into(), Value::String(id.clone()));
        message.insert("command".into(), Value::String(command.into()));

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);

        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        if let Err(e) = self.send_line(&line).await {
            lock(&self.pending).remove(&id);
            return Err(e);
        }
        tracing::debug!(command, id = %id, "request sent");

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(message)) => Err(anyhow!("{command} failed: {message}")),
            Err(_) => bail!("server closed before answering {command}"),
        }
    }

    async fn send_line(&mut self, line: &[u8]) -> Result<()> {
        self.writer
            .write_all(line)
            .await
            .context("writing request to server")?;
        self.writer.flush().await.context("flushing request to server")
    }

    pub async fn learn_face(&mut self, name: &str, paths: &[impl AsRef<Path>]) -> Result<Value> {
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.as_ref().display().to_string())
            .collect();
        self.request("learn-face", json!({ "name": name, "paths": paths }))
            .await
    }

    pub async fn add_face_encoding(&mut self, name: &str, encodings: &[Vec<f32>]) -> Result<Value> {
        self.request(
            "add-face-encoding",
            json!({ "name": name, "encodings": encodings }),
        )
        .await
    }

    /// Detect faces in an image file. The result gains a `duration` field:
    /// milliseconds from sending the request to receiving the answer.
    pub async fn detect_face(&mut self, path: &Path) -> Result<Value> {
        let start = Instant::now();
        let mut result = self
            .request("detect-face", json!({ "file_path": path.display().to_string() }))
            .await?;
        if let Value::Object(fields) = &mut result {
            fields.insert("duration".into(), json!(start.elapsed().as_millis() as u64));
        }
        Ok(result)
    }

    /// Run `detect_face` on each image in turn over this one connection.
    pub async fn detect_faces(&mut self, images: &[PathBuf]) -> Result<Vec<Value>> {
        let mut results = Vec::with_capacity(images.len());
        for image in images {
            results.push(self.detect_face(image).await?);
        }
        Ok(results)
    }

    pub async fn detect_picam(&mut self) -> Result<Value> {
        self.request("detect-picam", Value::Null).await
    }

    pub async fn detect_stream(&mut self, socket: &Path) -> Result<Value> {
        self.request("detect-stream", json!({ "stream_path": socket.display().to_string() }))
            .await
    }

    /// Close the request side and wait for the router to drain.
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(error = %e, "closing server input");
        }
        drop(self.writer);
        self.router.await.context("response router panicked")
    }
}

/// A spawned gezichtd child plus the connection to it.
pub struct ServerProcess {
    child: Child,
    connection: Connection<ChildStdin>,
}

impl ServerProcess {
    pub fn spawn(program: &str) -> Result<Self> {
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("starting {program}"))?;

        let stdin = child.stdin.take().context("server stdin not captured")?;
        let stdout = child.stdout.take().context("server stdout not captured")?;

        tracing::info!(program, pid = child.id(), "server started");

        Ok(Self {
            child,
            connection: Connection::new(stdin, BufReader::new(stdout)),
        })
    }

    pub fn connection(&mut self) -> &mut Connection<ChildStdin> {
        &mut self.connection
    }

    /// Close the server's stdin and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            mut child,
            connection,
        } = self;
        connection.close().await?;
        let status = child.wait().await.context("waiting for server")?;
        tracing::info!(%status, "server exited");
        if !status.success() {
            bail!("server exited with {status}");
        }
        Ok(())
    }
}

async fn route_responses<R: AsyncBufRead + Unpin>(reader: R, pending: Pending) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => dispatch_line(&line, &pending),
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "reading server output failed");
                break;
            }
        }
    }
    // Anyone still waiting gets a closed channel.
    lock(&pending).clear();
}

fn dispatch_line(line: &str, pending: &Pending) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let data: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, line, "server sent invalid JSON");
            return;
        }
    };

    let Some(id) = data.get("id").and_then(Value::as_str) else {
        tracing::warn!(error = ?data.get("error"), "server response without a usable id");
        return;
    };

    let Some(waiter) = lock(pending).remove(id) else {
        tracing::warn!(id, "response for unknown request");
        return;
    };

    let reply = match data.get("error").and_then(Value::as_str) {
        Some(message) => Err(message.to_string()),
        None => Ok(data.get("result").cloned().unwrap_or(Value::Null)),
    };
    // The requester may have given up; that's fine.
    let _ = waiter.send(reply);
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Reply>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, DuplexStream, WriteHalf};

    /// A fake server answering each request line through `answer`.
    fn fake_server<F>(answer: F) -> Connection<WriteHalf<DuplexStream>>
    where
        F: Fn(&Value) -> Option<Value> + Send + 'static,
    {
        let (client, server) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, mut server_write) = tokio::io::split(server);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                if let Some(response) = answer(&request) {
                    let mut out = serde_json::to_vec(&response).unwrap();
                    out.push(b'\n');
                    server_write.write_all(&out).await.unwrap();
                }
            }
        });

        Connection::new(client_write, BufReader::new(client_read))
    }

    #[tokio::test]
    async fn test_request_carries_command_and_id() {
        let mut conn = fake_server(|req| {
            Some(json!({ "id": req["id"], "result": { "echo": req } }))
        });

        let result = conn
            .learn_face("alice", &["/a.png", "/b.png"])
            .await
            .unwrap();

        let echo = &result["echo"];
        assert_eq!(echo["command"], "learn-face");
        assert_eq!(echo["name"], "alice");
        assert_eq!(echo["paths"], json!(["/a.png", "/b.png"]));
        assert!(Uuid::parse_str(echo["id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_error_field_becomes_err() {
        let mut conn = fake_server(|req| {
            Some(json!({ "id": req["id"], "result": {}, "error": "no face found in x.png" }))
        });

        let err = conn.detect_face(Path::new("x.png")).await.unwrap_err();
        assert_eq!(err.to_string(), "detect-face failed: no face found in x.png");
    }

    #[tokio::test]
    async fn test_each_request_gets_its_own_id() {
        let mut conn = fake_server(|req| Some(json!({ "id": req["id"], "result": req["id"] })));

        let first = conn.detect_picam().await.unwrap();
        let second = conn.detect_picam().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_detect_faces_times_each_request() {
        let mut conn = fake_server(|req| {
            if req["file_path"] == "slow.png" {
                std::thread::sleep(Duration::from_millis(30));
            }
            Some(json!({ "id": req["id"], "result": { "file": req["file_path"], "faces": [] } }))
        });

        let images = [PathBuf::from("slow.png"), PathBuf::from("fast.png")];
        let results = conn.detect_faces(&images).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["file"], "slow.png");
        assert_eq!(results[1]["file"], "fast.png");
        assert!(results[0]["duration"].as_u64().unwrap() >= 30, "{}", results[0]);
        assert!(results[1]["duration"].is_u64(), "{}", results[1]);
        assert_eq!(results[1]["faces"], json!([]));
    }

    #[tokio::test]
    async fn test_close_shuts_input_and_drains_router() {
        let mut conn = fake_server(|req| Some(json!({ "id": req["id"], "result": {} })));
        conn.detect_picam().await.unwrap();

        // The fake server stops on input EOF, which ends the router.
        tokio::time::timeout(Duration::from_secs(1), conn.close())
            .await
            .expect("router did not finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_id_and_ignores_noise() {
        let pending = Pending::default();
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        lock(&pending).insert("a".into(), tx_a);
        lock(&pending).insert("b".into(), tx_b);

        dispatch_line("not json", &pending);
        dispatch_line(r#"{"id":null,"result":{},"error":"invalid request"}"#, &pending);
        dispatch_line(r#"{"id":"zzz","result":{}}"#, &pending);
        dispatch_line(r#"{"id":"b","result":{"count":2}}"#, &pending);
        dispatch_line(r#"{"id":"a","result":{},"error":"boom"}"#, &pending);

        assert_eq!(rx_b.await.unwrap(), Ok(json!({ "count": 2 })));
        assert_eq!(rx_a.await.unwrap(), Err("boom".to_string()));
        assert!(lock(&pending).is_empty());
    }

    #[tokio::test]
    async fn test_router_end_drops_waiters() {
        let pending = Pending::default();
        let (tx, rx) = oneshot::channel();
        lock(&pending).insert("a".into(), tx);

        route_responses(BufReader::new(&b"{\"id\":\"x\"}\n"[..]), pending.clone()).await;

        assert!(rx.await.is_err());
    }
}
