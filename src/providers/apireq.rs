//! Helpers for making and parsing API requests.

mod error;
mod json_stream_parser;
mod provider;
mod stream_ext;

pub(crate) use error::Error as ReqwestError;
pub(crate) use reqwest::Url;

pub(crate) use json_stream_parser::Error as JsonStreamError;
pub(crate) use json_stream_parser::JsonStreamParser;
pub(crate) use stream_ext::ReqwestResponseStreamExt;

use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

/// The body of a streamed response.
pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Joins `endpoint` onto an API base, keeping any path prefix the base carries
/// (e.g. a proxy mounted under `/llm/`).
pub(crate) fn endpoint_url(api_base: &Url, endpoint: &str) -> Result<Url, url::ParseError> {
    if api_base.path().ends_with('/') {
        api_base.join(endpoint)
    } else {
        let mut base = api_base.clone();
        base.set_path(&format!("{}/", api_base.path()));
        base.join(endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_keeps_prefix() {
        let base = Url::parse("https://proxy.example.com/llm").unwrap();
        let url = endpoint_url(&base, "v1/models").unwrap();
        assert_eq!(url.as_str(), "https://proxy.example.com/llm/v1/models");

        let base = Url::parse("http://localhost:11434").unwrap();
        let url = endpoint_url(&base, "api/tags").unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/api/tags");
    }
}
