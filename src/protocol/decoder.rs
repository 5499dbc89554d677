//! Incremental decoder for the engine's multiplexed output stream.
//!
//! The stream is a sequence of newline-delimited chunks, each optionally
//! prefixed with `data: `, terminated by `[DONE]`. Every chunk is one JSON
//! object: `{"stdout": ...}`, `{"stderr": ...}`, or a [`Frame`].

use serde_json::{Map, Value};
use tracing::debug;

use crate::types::Frame;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Payload of a `stdout` chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum StdoutChunk {
    /// A JSON string, decoded once.
    Text(String),
    /// An object; in chat mode this is the chat envelope.
    Envelope(Map<String, Value>),
    /// Any other JSON value, re-serialized.
    Raw(String),
}

/// One decoded unit, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUnit {
    Stdout(StdoutChunk),
    Stderr(String),
    Frame(Box<Frame>),
}

/// Stateful decoder. Feed it bytes as they arrive; it returns whatever
/// complete units those bytes finished.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Bytes after the last newline.
    buffer: Vec<u8>,
    /// Lines that so far only form the start of a JSON value.
    carry: String,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminator has been seen. Later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Decode the units completed by `bytes`. An empty slice is a no-op.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamUnit> {
        let mut units = Vec::new();
        if self.done {
            return units;
        }

        self.buffer.extend_from_slice(bytes);
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(unit) = self.decode_line(&line) {
                units.push(unit);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        units
    }

    /// Flush at end of stream. A trailing line without a newline is decoded;
    /// a fragment that never became valid JSON is dropped.
    pub fn finish(&mut self) -> Vec<StreamUnit> {
        let mut units = Vec::new();
        if !self.done && !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            if let Some(unit) = self.decode_line(&rest) {
                units.push(unit);
            }
        }
        if !self.carry.is_empty() {
            debug!(
                fragment_len = self.carry.len(),
                "dropping incomplete fragment at end of stream"
            );
            self.carry.clear();
        }
        self.done = true;
        units
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<StreamUnit> {
        let text = String::from_utf8_lossy(raw);
        let mut line = text.trim();
        if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            line = data.trim();
        }
        if line.is_empty() {
            return None;
        }
        if line == DONE_SENTINEL {
            self.done = true;
            return None;
        }

        let candidate = if self.carry.is_empty() {
            line.to_string()
        } else {
            format!("{}\n{}", self.carry, line)
        };

        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                self.carry.clear();
                classify(value)
            }
            Err(err) if err.is_eof() => {
                self.carry = candidate;
                None
            }
            Err(err) if !self.carry.is_empty() => {
                debug!(error = %err, "discarding fragment that never completed");
                self.carry.clear();
                self.decode_line(line.as_bytes())
            }
            Err(err) => {
                debug!(error = %err, line = %line, "skipping undecodable chunk");
                None
            }
        }
    }
}

/// Sort a decoded JSON value into stdout, stderr or frame.
fn classify(value: Value) -> Option<StreamUnit> {
    let Value::Object(mut object) = value else {
        debug!("skipping non-object chunk");
        return None;
    };

    if let Some(stdout) = object.remove("stdout") {
        let chunk = match stdout {
            Value::String(s) => StdoutChunk::Text(s),
            Value::Object(envelope) => StdoutChunk::Envelope(envelope),
            other => StdoutChunk::Raw(other.to_string()),
        };
        return Some(StreamUnit::Stdout(chunk));
    }

    if let Some(stderr) = object.remove("stderr") {
        let text = match stderr {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return Some(StreamUnit::Stderr(text));
    }

    match serde_json::from_value::<Frame>(Value::Object(object)) {
        Ok(frame) => Some(StreamUnit::Frame(Box::new(frame))),
        Err(err) => {
            debug!(error = %err, "skipping chunk that is not a frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode_all(input: &str) -> Vec<StreamUnit> {
        let mut decoder = FrameDecoder::new();
        let mut units = decoder.feed(input.as_bytes());
        units.extend(decoder.finish());
        units
    }

    #[test]
    fn decodes_stdout_text_and_stops_at_done() {
        let units = decode_all(
            "data: {\"stdout\":\"\\\"Washington, D.C.\\\"\"}\n\ndata: [DONE]\n\n{\"stdout\":\"late\"}\n\n",
        );
        assert_eq!(
            units,
            vec![StreamUnit::Stdout(StdoutChunk::Text("\"Washington, D.C.\"".into()))]
        );
    }

    #[test]
    fn empty_lines_and_empty_reads_are_no_ops() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"").is_empty());
        assert!(decoder.feed(b"\n\n   \n").is_empty());
        assert!(!decoder.is_done());
    }

    #[test]
    fn json_split_across_reads_yields_one_frame() {
        let chunk = "{\"call\":{\"id\":\"c1\",\"type\":\"callStart\"}}\n\n";
        for offset in 1..chunk.len() - 2 {
            let mut decoder = FrameDecoder::new();
            let mut units = decoder.feed(&chunk.as_bytes()[..offset]);
            units.extend(decoder.feed(&chunk.as_bytes()[offset..]));
            units.extend(decoder.finish());
            assert_eq!(units.len(), 1, "split at {offset}");
            assert!(matches!(&units[0], StreamUnit::Frame(f) if f.as_call().is_some()));
        }
    }

    #[test]
    fn object_broken_across_lines_is_carried() {
        let units = decode_all("{\"run\":\n{\"id\":\"r1\",\"type\":\"runStart\"}}\n");
        assert_eq!(units.len(), 1);
        match &units[0] {
            StreamUnit::Frame(frame) => assert_eq!(frame.as_run().unwrap().id, "r1"),
            other => panic!("expected run frame, got {other:?}"),
        }
    }

    #[test]
    fn incomplete_trailing_fragment_is_dropped() {
        let units = decode_all("{\"stdout\":\"a\"}\n{\"call\":{\"id\":");
        assert_eq!(units, vec![StreamUnit::Stdout(StdoutChunk::Text("a".into()))]);
    }

    #[test]
    fn stale_carry_does_not_swallow_next_chunk() {
        let units = decode_all("{\"call\":\n}garbage\n{\"stderr\":\"oops\"}\n");
        assert_eq!(units, vec![StreamUnit::Stderr("oops".into())]);
    }

    #[test]
    fn stdout_shapes_are_distinguished() {
        let units = decode_all(
            "{\"stdout\":{\"content\":\"hi\",\"done\":false}}\n{\"stdout\":[1,2]}\n{\"stderr\":\"warn\"}\n",
        );
        assert_eq!(units.len(), 3);
        match &units[0] {
            StreamUnit::Stdout(StdoutChunk::Envelope(env)) => {
                assert_eq!(env["content"], "hi");
                assert_eq!(env["done"], false);
            }
            other => panic!("expected envelope, got {other:?}"),
        }
        assert_eq!(units[1], StreamUnit::Stdout(StdoutChunk::Raw("[1,2]".into())));
        assert_eq!(units[2], StreamUnit::Stderr("warn".into()));
    }

    #[test]
    fn unknown_objects_are_skipped() {
        let units = decode_all("{\"mystery\":1}\n{\"stdout\":\"ok\"}\n");
        assert_eq!(units, vec![StreamUnit::Stdout(StdoutChunk::Text("ok".into()))]);
    }

    #[test]
    fn trailing_line_without_newline_is_decoded_on_finish() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(b"{\"stdout\":\"tail\"}").is_empty());
        assert_eq!(
            decoder.finish(),
            vec![StreamUnit::Stdout(StdoutChunk::Text("tail".into()))]
        );
    }
}
