//! Wire types for the line-delimited JSON protocol.
//!
//! Requests are `{"id": ..., "command": "...", ...fields}`; responses are
//! `{"id": ..., "result": {...}, "error"?: "..."}`. The `id` is echoed as-is.

use gezicht_core::{Embedding, FaceLocation};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// One parsed command.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum Command {
    LearnFace {
        name: String,
        #[serde(deserialize_with = "one_or_many")]
        paths: Vec<PathBuf>,
    },
    AddFaceEncoding {
        name: String,
        #[serde(deserialize_with = "one_or_many")]
        encodings: Vec<Embedding>,
    },
    DetectFace {
        file_path: PathBuf,
    },
    DetectPicam,
    DetectStream {
        stream_path: PathBuf,
    },
}

impl Command {
    /// Wire name of the command, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Command::LearnFace { .. } => "learn-face",
            Command::AddFaceEncoding { .. } => "add-face-encoding",
            Command::DetectFace { .. } => "detect-face",
            Command::DetectPicam => "detect-picam",
            Command::DetectStream { .. } => "detect-stream",
        }
    }
}

/// Accept either a single value or a list of them.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // Many first, so `[]` is an empty list rather than one empty value.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(items) => items,
        OneOrMany::One(item) => vec![item],
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: Value,
    pub command: Command,
}

/// A line that could not be turned into a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    /// Echoed id when the line was at least a JSON object carrying one.
    pub id: Value,
    pub message: String,
}

/// Parse one input line.
pub fn parse_request(line: &[u8]) -> Result<Request, Rejected> {
    let value: Value = serde_json::from_slice(line).map_err(|e| Rejected {
        id: Value::Null,
        message: format!("invalid request: {e}"),
    })?;

    let Value::Object(mut fields) = value else {
        return Err(Rejected {
            id: Value::Null,
            message: "invalid request: expected a JSON object".to_string(),
        });
    };

    let id = fields.remove("id").unwrap_or(Value::Null);
    match serde_json::from_value(Value::Object(fields)) {
        Ok(command) => Ok(Request { id, command }),
        Err(e) => Err(Rejected {
            id,
            message: format!("invalid command: {e}"),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedFace {
    #[serde(flatten)]
    pub location: FaceLocation,
    /// Registry name, or empty when unrecognized.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LearnResult {
    pub count: usize,
    pub encodings: Vec<Embedding>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddResult {
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectResult {
    pub original_size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resized: Option<Size>,
    pub faces: Vec<DetectedFace>,
}

/// Serializes as `{}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandResult {
    Learn(LearnResult),
    Add(AddResult),
    Detect(DetectResult),
    Empty(Empty),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    pub result: CommandResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(id: Value, result: CommandResult) -> Self {
        Self { id, result, error: None }
    }

    pub fn failure(id: Value, result: CommandResult, error: String) -> Self {
        Self { id, result, error: Some(error) }
    }
}

impl From<Rejected> for Response {
    fn from(rejected: Rejected) -> Self {
        Self::failure(rejected.id, CommandResult::Empty(Empty {}), rejected.message)
    }
}
