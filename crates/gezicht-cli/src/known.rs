//! Known faces handed to the server before detecting: cached encodings and
//! `name=path` image pairs.

use crate::client::Connection;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWrite;

/// Encodings cache: person name to the encodings learned for them.
pub type EncodingCache = BTreeMap<String, Vec<Vec<f32>>>;

/// Parse a `NAME=PATH` argument.
pub fn parse_face(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got `{arg}`")),
    }
}

/// Group `name=path` pairs by name, keeping the paths in argument order.
pub fn group_faces(faces: &[(String, PathBuf)]) -> BTreeMap<&str, Vec<&Path>> {
    let mut grouped: BTreeMap<&str, Vec<&Path>> = BTreeMap::new();
    for (name, path) in faces {
        grouped.entry(name).or_default().push(path);
    }
    grouped
}

/// Read a cache file. A missing file is an empty cache.
pub fn load_cache(path: &Path) -> Result<EncodingCache> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(EncodingCache::new()),
        Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
    };
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn save_cache(path: &Path, cache: &EncodingCache) -> Result<()> {
    let text = serde_json::to_string_pretty(cache)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

/// Pull the `encodings` array out of a learn-face result.
pub fn learned_encodings(result: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let Some(encodings) = result.get("encodings") else {
        bail!("learn-face result has no encodings");
    };
    serde_json::from_value(encodings.clone()).context("decoding learned encodings")
}

/// Register everything we know with the server: cache first, then images.
pub async fn restore<W: AsyncWrite + Unpin>(
    conn: &mut Connection<W>,
    cache: &EncodingCache,
    faces: &[(String, PathBuf)],
) -> Result<usize> {
    let mut people = 0;

    for (name, encodings) in cache {
        if encodings.is_empty() {
            continue;
        }
        conn.add_face_encoding(name, encodings).await?;
        tracing::debug!(name, count = encodings.len(), "restored cached encodings");
        people += 1;
    }

    for (name, paths) in group_faces(faces) {
        conn.learn_face(name, paths.as_slice()).await?;
        tracing::debug!(name, images = paths.len(), "learned face");
        people += 1;
    }

    Ok(people)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_face() {
        assert_eq!(
            parse_face("alice=/img/a.jpg").unwrap(),
            ("alice".to_string(), PathBuf::from("/img/a.jpg"))
        );
        // Only the first `=` splits.
        assert_eq!(parse_face("bob=x=y.png").unwrap().1, PathBuf::from("x=y.png"));
        assert!(parse_face("alice").is_err());
        assert!(parse_face("=a.jpg").is_err());
        assert!(parse_face("alice=").is_err());
    }

    #[test]
    fn test_group_faces_keeps_order() {
        let faces = vec![
            ("bob".to_string(), PathBuf::from("b1")),
            ("alice".to_string(), PathBuf::from("a1")),
            ("bob".to_string(), PathBuf::from("b2")),
        ];
        let grouped = group_faces(&faces);
        assert_eq!(grouped["bob"], vec![Path::new("b1"), Path::new("b2")]);
        assert_eq!(grouped["alice"], vec![Path::new("a1")]);
    }

    #[test]
    fn test_cache_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        assert!(load_cache(&path).unwrap().is_empty());

        let mut cache = EncodingCache::new();
        cache.insert("alice".into(), vec![vec![0.5, -0.25], vec![1.0, 0.0]]);
        save_cache(&path, &cache).unwrap();

        assert_eq!(load_cache(&path).unwrap(), cache);
    }

    #[test]
    fn test_cache_rejects_wrong_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, r#"{"alice": [0.5, 0.25]}"#).unwrap();

        let err = load_cache(&path).unwrap_err();
        assert!(err.to_string().contains("parsing"));
    }

    #[test]
    fn test_learned_encodings() {
        let result = json!({ "count": 1, "encodings": [[0.5, 0.25]] });
        assert_eq!(learned_encodings(&result).unwrap(), vec![vec![0.5, 0.25]]);
        assert!(learned_encodings(&json!({})).is_err());
    }
}
