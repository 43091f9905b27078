use super::json_stream_parser::{JsonStreamParser, StreamFormat};
use super::ByteStream;

pub(crate) trait ReqwestResponseStreamExt {
    fn stream_ndjson(self) -> JsonStreamParser<ByteStream>;
    fn stream_sse(self) -> JsonStreamParser<ByteStream>;
}

impl ReqwestResponseStreamExt for reqwest::Response {
    fn stream_ndjson(self) -> JsonStreamParser<ByteStream> {
        JsonStreamParser::new(Box::pin(self.bytes_stream()), StreamFormat::Ndjson)
    }

    fn stream_sse(self) -> JsonStreamParser<ByteStream> {
        JsonStreamParser::new(Box::pin(self.bytes_stream()), StreamFormat::Sse)
    }
}
