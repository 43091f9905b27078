//! Incremental parsing of JSON objects streamed in an HTTP response body. Two
//! framings are supported: newline-delimited JSON, and the `data:` subset of
//! server-sent events. The parser consumes the byte stream produced by
//! [`reqwest::Response::bytes_stream`] and yields one object at a time.

use bytes::Bytes;
use futures_core::stream::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::marker::Unpin;

use super::ReqwestError;

/// Bodies are buffered up to this size while looking for a record boundary.
const DEFAULT_MAX_BUFFER: usize = 1 << 24;

#[derive(Debug, Clone, Copy)]
pub(crate) enum StreamFormat {
    /// Newline-delimited JSON
    /// See https://github.com/ndjson/ndjson-spec
    Ndjson,
    /// Server-sent events carrying JSON in their `data` field
    Sse,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("unsupported server-sent event field \"{0}\"")]
    UnsupportedSseField(String),

    #[error("the response overflowed the {0} byte streaming buffer")]
    ResponseExceededBuffer(usize),

    #[error("failed to deserialize a streamed JSON object \"{blob}\": {source}")]
    DeserializationFailed {
        blob: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("the source stream failed: {0}")]
    StreamFailed(#[source] ReqwestError),
}

pub(crate) struct JsonStreamParser<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: S,
    format: StreamFormat,
    max_size: usize,
    /// Bytes received but not yet split into lines
    pending: Vec<u8>,
    /// The record being assembled
    record: Vec<u8>,
    exhausted: bool,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> JsonStreamParser<S> {
    pub(crate) fn new(stream: S, format: StreamFormat) -> JsonStreamParser<S> {
        Self::with_max_size(stream, format, DEFAULT_MAX_BUFFER)
    }

    pub(crate) fn with_max_size(
        stream: S,
        format: StreamFormat,
        max_size: usize,
    ) -> JsonStreamParser<S> {
        JsonStreamParser {
            stream,
            format,
            max_size,
            pending: Vec::with_capacity(1 << 10),
            record: Vec::new(),
            exhausted: false,
        }
    }

    /// Removes the next complete line from the pending bytes, without its
    /// line terminator.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let newline = self.pending.iter().position(|&b| b == b'\n')?;

        let mut line: Vec<u8> = self.pending.drain(..=newline).collect();
        line.pop();

        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(line)
    }

    /// Pulls the next chunk off the underlying stream. Returns `false` once the
    /// stream has ended.
    async fn fill(&mut self) -> Result<bool, Error> {
        match self.stream.next().await {
            Some(Ok(chunk)) => {
                if self.pending.len() + chunk.len() > self.max_size {
                    return Err(Error::ResponseExceededBuffer(self.max_size));
                }

                self.pending.extend_from_slice(&chunk);

                Ok(true)
            }
            Some(Err(err)) => Err(Error::StreamFailed(err.into())),
            None => Ok(false),
        }
    }

    /// Feeds one line into the record. Returns `true` when the record is complete.
    fn feed_line(&mut self, line: &[u8]) -> Result<bool, Error> {
        match self.format {
            StreamFormat::Ndjson => {
                if line.iter().all(u8::is_ascii_whitespace) {
                    return Ok(false);
                }

                self.record.extend_from_slice(line);

                Ok(true)
            }
            StreamFormat::Sse => {
                // A blank line dispatches the event
                if line.is_empty() {
                    if self.record.is_empty() {
                        return Ok(false);
                    }

                    self.record.pop();

                    return Ok(true);
                }

                let (field, value) = match line.iter().position(|&b| b == b':') {
                    Some(colon) => (&line[..colon], &line[colon + 1..]),
                    None => (line, &line[line.len()..]),
                };

                let value = value.strip_prefix(b" ").unwrap_or(value);

                match field {
                    // Comment
                    b"" => {}
                    b"data" => {
                        if value != b"[DONE]" {
                            // The assembled event is held to the same limit
                            if self.record.len() + value.len() + 1 > self.max_size {
                                return Err(Error::ResponseExceededBuffer(self.max_size));
                            }

                            self.record.extend_from_slice(value);
                            self.record.push(b'\n');
                        }
                    }
                    b"event" | b"id" | b"retry" => {}
                    other => {
                        return Err(Error::UnsupportedSseField(
                            String::from_utf8_lossy(other).into_owned(),
                        ))
                    }
                }

                Ok(false)
            }
        }
    }

    /// Assembles the next record. Returns `Ok(false)` at the end of the stream.
    async fn next_record(&mut self) -> Result<bool, Error> {
        self.record.clear();

        loop {
            while let Some(line) = self.take_line() {
                if self.feed_line(&line)? {
                    return Ok(true);
                }
            }

            if self.exhausted {
                break;
            }

            if !self.fill().await? {
                self.exhausted = true;

                // Terminate a trailing line which is missing its newline
                if !self.pending.is_empty() {
                    self.pending.push(b'\n');
                }

                // Dispatch an event which is missing its blank line
                if matches!(self.format, StreamFormat::Sse) {
                    self.pending.push(b'\n');
                }
            }
        }

        Ok(false)
    }

    /// Parses the next object in the stream, or `None` once it is exhausted.
    pub(crate) async fn parse<T: DeserializeOwned>(&mut self) -> Option<Result<T, Error>> {
        match self.next_record().await {
            Ok(true) => Some(serde_json::from_slice::<T>(&self.record).map_err(|source| {
                Error::DeserializationFailed {
                    blob: String::from_utf8_lossy(&self.record).into_owned(),
                    source,
                }
            })),
            Ok(false) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use serde::Deserialize;

    const NDJSON_STREAM: &str = "\n{\"model\":\"gemma:2b\",\"done\":false}\n\r\n{\"model\":\"llama3\",\"done\":true}";

    const SSE_STREAM: &str = r#": keep-alive

data: {"model":"gemma:2b","done":false}

event: message
data:{"model":"llama3",
data: "done":true}

data: [DONE]

"#;

    const SSE_BAD_FIELD: &str = "hello: {}\n\n";

    #[derive(Debug, Deserialize)]
    struct ModelJson {
        model: String,
        done: bool,
    }

    type ChunkStream = stream::Iter<std::vec::IntoIter<reqwest::Result<Bytes>>>;

    fn stream_parser(chunk_size: usize, body: &'static str, format: StreamFormat) -> JsonStreamParser<ChunkStream> {
        let chunks: Vec<reqwest::Result<Bytes>> = body
            .as_bytes()
            .chunks(chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        JsonStreamParser::new(stream::iter(chunks), format)
    }

    #[tokio::test]
    async fn test_ndjson_any_chunking() {
        for chunk_size in 1..=NDJSON_STREAM.len() {
            let mut parser = stream_parser(chunk_size, NDJSON_STREAM, StreamFormat::Ndjson);

            let first = parser.parse::<ModelJson>().await.unwrap().unwrap();
            assert_eq!(first.model, "gemma:2b");
            assert!(!first.done);

            // The final line has no trailing newline
            let second = parser.parse::<ModelJson>().await.unwrap().unwrap();
            assert_eq!(second.model, "llama3");
            assert!(second.done);

            assert!(parser.parse::<ModelJson>().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_sse_any_chunking() {
        for chunk_size in 1..=16 {
            let mut parser = stream_parser(chunk_size, SSE_STREAM, StreamFormat::Sse);

            let first = parser.parse::<ModelJson>().await.unwrap().unwrap();
            assert_eq!(first.model, "gemma:2b");

            // Multi-line data fields are joined with a newline
            let second = parser.parse::<ModelJson>().await.unwrap().unwrap();
            assert_eq!(second.model, "llama3");
            assert!(second.done);

            assert!(parser.parse::<ModelJson>().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_sse_unsupported_field() {
        let mut parser = stream_parser(4, SSE_BAD_FIELD, StreamFormat::Sse);

        let result = parser.parse::<ModelJson>().await.unwrap();

        assert!(matches!(result, Err(Error::UnsupportedSseField(field)) if field == "hello"));
    }

    #[tokio::test]
    async fn test_malformed_object() {
        let mut parser = stream_parser(8, "{\"model\": 1}\n", StreamFormat::Ndjson);

        let result = parser.parse::<ModelJson>().await.unwrap();

        assert!(matches!(result, Err(Error::DeserializationFailed { .. })));
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from_static(&[b'x'; 64]))];

        let mut parser =
            JsonStreamParser::with_max_size(stream::iter(chunks), StreamFormat::Ndjson, 32);

        let result = parser.parse::<ModelJson>().await.unwrap();

        assert!(matches!(result, Err(Error::ResponseExceededBuffer(32))));
    }

    #[tokio::test]
    async fn test_sse_event_without_dispatch_is_bounded() {
        // Data lines which never end in a blank line
        let chunks: Vec<reqwest::Result<Bytes>> = (0..200)
            .map(|_| Ok(Bytes::from_static(b"data: xxxxxxxxxxxxx\n")))
            .collect();

        let mut parser =
            JsonStreamParser::with_max_size(stream::iter(chunks), StreamFormat::Sse, 32);

        let result = parser.parse::<ModelJson>().await.unwrap();

        assert!(matches!(result, Err(Error::ResponseExceededBuffer(32))));
        assert!(parser.record.len() <= 32);
    }
}
