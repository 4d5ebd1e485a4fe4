//! The stdio loop: one request line in, one response line out.

use crate::processor::CommandProcessor;
use crate::protocol::{self, Response};
use std::io::{self, BufRead, Write};

/// Serve requests from `input` until EOF, writing one response line per
/// non-blank request line.
///
/// Only I/O errors on the streams themselves end the loop.
pub fn serve<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    processor: &mut CommandProcessor,
) -> io::Result<()> {
    let mut line = Vec::new();
    let mut served = 0u64;

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        let response = match protocol::parse_request(&line) {
            Ok(request) => processor.handle(request),
            Err(rejected) => {
                tracing::warn!(id = %rejected.id, error = %rejected.message, "rejected request line");
                Response::from(rejected)
            }
        };

        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        served += 1;
    }

    tracing::info!(served, "input closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::LazyCamera;
    use crate::testing::{encoding_of, faces, write_png, FakeCamera, FakeEngine};
    use gezicht_core::DistanceMatcher;
    use image::Rgb;
    use serde_json::{json, Value};

    fn processor() -> CommandProcessor {
        let (opener, _) = FakeCamera::opener(faces(320, 240, &[]));
        CommandProcessor::new(
            Box::new(FakeEngine::default()),
            LazyCamera::new(opener),
            DistanceMatcher { tolerance: 0.1 },
            450,
        )
    }

    fn serve_lines(input: &str, p: &mut CommandProcessor) -> Vec<Value> {
        let mut out = Vec::new();
        serve(input.as_bytes(), &mut out, p).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_end_to_end_add_then_detect() {
        let dir = tempfile::tempdir().unwrap();
        let alice = write_png(dir.path(), "alice.png", &faces(20, 10, &[Rgb([0, 255, 0])]));
        let encoding = serde_json::to_string(&encoding_of(Rgb([0, 255, 0]))).unwrap();

        let input = format!(
            "{}\n{}\n",
            format_args!(r#"{{"id":1,"command":"add-face-encoding","name":"alice","encodings":[{encoding}]}}"#),
            json!({"id": 2, "command": "detect-face", "file_path": alice}),
        );

        let mut p = processor();
        let responses = serve_lines(&input, &mut p);
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0], json!({"id": 1, "result": {"count": 1}}));
        assert_eq!(
            responses[1]["result"]["faces"],
            json!([{"top": 0, "right": 1, "bottom": 1, "left": 0, "name": "alice"}])
        );
    }

    #[test]
    fn test_bad_lines_do_not_stop_the_loop() {
        let input = concat!(
            "{broken\n",
            "\n",
            "   \n",
            "{\"id\":\"u1\",\"command\":\"nope\"}\n",
            "\u{fffd}\u{fffd}\n",
            "{\"id\":3,\"command\":\"detect-picam\"}\n",
        );

        let mut p = processor();
        let responses = serve_lines(input, &mut p);
        assert_eq!(responses.len(), 4);

        assert_eq!(responses[0]["id"], Value::Null);
        assert_eq!(responses[0]["result"], json!({}));
        assert!(responses[0]["error"].as_str().unwrap().starts_with("invalid request"));

        assert_eq!(responses[1]["id"], json!("u1"));
        assert!(responses[1]["error"].as_str().unwrap().starts_with("invalid command"));

        assert_eq!(responses[2]["id"], Value::Null);

        assert_eq!(responses[3], json!({
            "id": 3,
            "result": {"original_size": {"width": 320, "height": 240}, "faces": []}
        }));
    }

    #[test]
    fn test_invalid_utf8_is_rejected_not_fatal() {
        let mut input = b"\xff\xfe{}\n".to_vec();
        input.extend_from_slice(b"{\"id\":1,\"command\":\"add-face-encoding\",\"name\":\"a\",\"encodings\":[]}\n");

        let mut out = Vec::new();
        serve(input.as_slice(), &mut out, &mut processor()).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0]["error"].is_string());
        assert_eq!(lines[1], json!({"id": 1, "result": {"count": 0}}));
    }

    #[test]
    fn test_last_line_without_newline_is_served() {
        let mut p = processor();
        let responses = serve_lines(r#"{"id":7,"command":"detect-picam"}"#, &mut p);
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["id"], json!(7));
    }

    #[test]
    fn test_empty_input_writes_nothing() {
        let mut p = processor();
        assert!(serve_lines("", &mut p).is_empty());
    }
}
