use bytes::Bytes;
use futures_core::Stream;
use reqwest::{Client, IntoUrl, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::providers::apireq::{
    self, endpoint_url, ByteStream, JsonStreamError, JsonStreamParser, ReqwestResponseStreamExt,
    Url,
};

pub(super) const OLLAMA_DEFAULT_ENDPOINT: &str = "http://localhost:11434";

#[derive(Debug, Error)]
pub(super) enum Error {
    #[error("invalid ollama api base: {0}")]
    InvalidApiBase(reqwest::Error),

    #[error("invalid ollama endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("a request to ollama failed: {0}")]
    RequestFailed(#[from] apireq::ReqwestError),

    #[error("failed to query ollama resource: {0}")]
    NotFound(String),

    #[error("request to the ollama api failed: {0}")]
    BadRequest(String),

    #[error("ollama encountered an internal error: {0}")]
    InternalError(String),

    #[error("the ollama API returned an unspecified error: {0}")]
    UnspecifiedError(String),

    #[error("could not parse streamed response: {0}")]
    StreamParser(#[from] JsonStreamError),
}

/* === IO === */

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    Assistant,
    User,
    System,
}

// Structures to serialize /api/chat
#[derive(Serialize, Debug)]
pub(super) struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Sampling options, in the names the Ollama runtime uses.
#[derive(Serialize, Debug, Default)]
pub(super) struct ModelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'m> {
    model: &'m str,
    messages: &'m [ChatMessage],
    options: &'m ModelOptions,
}

// Structures to deserialize /api/chat
#[derive(Deserialize, Debug)]
pub(super) struct MessageDelta {
    pub role: Role,
    pub content: String,
}

#[derive(Deserialize, Debug, Default, PartialEq, Eq)]
pub(super) enum DoneReason {
    #[default]
    None,
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "load")]
    Load,
}

#[derive(Deserialize, Debug)]
pub(super) struct StreamingChatDelta {
    pub message: MessageDelta,
    #[serde(default)]
    pub prompt_eval_count: Option<usize>,
    #[serde(default)]
    pub eval_count: Option<usize>,
    #[serde(default)]
    pub done_reason: DoneReason,
    pub done: bool,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum StreamChatChunk {
    Delta(StreamingChatDelta),
    Error(ApiError),
}

// Structures to deserialize /api/tags

#[derive(Debug, Deserialize)]
pub(super) struct Tag {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub digest: String,
}

#[derive(Debug, Deserialize)]
struct TagsList {
    models: Vec<Tag>,
}

// Errors
#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

pub(super) struct StreamingChatResponse<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: JsonStreamParser<S>,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> StreamingChatResponse<S> {
    pub(super) async fn next(&mut self) -> Option<Result<StreamingChatDelta, Error>> {
        let chunk = self.stream.parse::<StreamChatChunk>().await?;

        Some(
            chunk
                .map_err(Error::StreamParser)
                .and_then(|chunk| match chunk {
                    StreamChatChunk::Delta(d) => Ok(d),
                    StreamChatChunk::Error(e) => Err(Error::UnspecifiedError(e.error)),
                }),
        )
    }
}

pub(super) struct OllamaApi {
    api_base: Url,
    client: Client,
}

impl OllamaApi {
    pub(super) fn with_api_base<U: IntoUrl>(api_base: U) -> Result<OllamaApi, Error> {
        Ok(OllamaApi {
            api_base: api_base.into_url().map_err(Error::InvalidApiBase)?,
            client: Client::new(),
        })
    }

    pub(super) fn api_base(&self) -> &Url {
        &self.api_base
    }

    async fn maybe_parse_api_error(res: Response) -> Result<Response, Error> {
        let status = res.status();

        if status.is_success() {
            return Ok(res);
        }

        // Ollama reports errors as {"error": "..."}, fall back to the raw body
        let body = res
            .text()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let message = match serde_json::from_str::<ApiError>(&body) {
            Ok(err) => err.error,
            Err(_) => body,
        };

        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(message)),
            code => match code.as_u16() {
                400..=499 => Err(Error::BadRequest(message)),
                500..=599 => Err(Error::InternalError(message)),
                _ => Err(Error::UnspecifiedError(message)),
            },
        }
    }

    pub(super) fn tags_url(&self) -> Result<Url, Error> {
        Ok(endpoint_url(&self.api_base, "api/tags")?)
    }

    pub(super) fn chat_url(&self) -> Result<Url, Error> {
        Ok(endpoint_url(&self.api_base, "api/chat")?)
    }

    pub(super) async fn tags(&self) -> Result<Vec<Tag>, Error> {
        let res = self
            .client
            .get(self.tags_url()?)
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::maybe_parse_api_error(res).await?;

        let tags: TagsList = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Ok(tags.models)
    }

    pub(super) async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ModelOptions,
    ) -> Result<StreamingChatResponse<ByteStream>, Error> {
        let res = self
            .client
            .post(self.chat_url()?)
            .json(&ChatRequest {
                model,
                messages,
                options,
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::maybe_parse_api_error(res).await?;

        Ok(StreamingChatResponse {
            stream: res.stream_ndjson(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_models_list() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [
                    {
                        "name": "gemma:2b",
                        "model": "gemma:2b",
                        "modified_at": "2024-05-01T00:00:00Z",
                        "size": 1678456656,
                        "digest": "b50d6c999e592ae4f79acae23b4feaefbdfceaa7cd366df2610e3072c052a160",
                        "details": { "family": "gemma", "families": null }
                    },
                    { "name": "llama3:latest" }
                ]
            })))
            .mount(&server)
            .await;

        let api = OllamaApi::with_api_base(server.uri()).unwrap();

        let tags = api.tags().await.unwrap();

        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].name, "gemma:2b");
        assert_eq!(tags[0].size, 1678456656);
        assert_eq!(tags[1].name, "llama3:latest");
    }

    #[tokio::test]
    async fn test_api_error_deserialization() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({ "error": "model \"_nonexistent_\" not found" })),
            )
            .mount(&server)
            .await;

        let api = OllamaApi::with_api_base(server.uri()).unwrap();

        let messages = [ChatMessage {
            role: Role::User,
            content: "Hello!".to_string(),
        }];

        let stream = api
            .chat("_nonexistent_", &messages, &ModelOptions::default())
            .await;

        assert!(matches!(stream, Err(Error::NotFound(msg)) if msg.contains("_nonexistent_")));
    }

    #[tokio::test]
    async fn test_plain_text_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let api = OllamaApi::with_api_base(server.uri()).unwrap();

        let tags = api.tags().await;

        assert!(matches!(tags, Err(Error::InternalError(msg)) if msg == "bad gateway"));
    }

    #[tokio::test]
    async fn test_streaming_chat() {
        let server = MockServer::start().await;

        let body = concat!(
            "{\"model\":\"gemma:2b\",\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "{\"model\":\"gemma:2b\",\"message\":{\"role\":\"assistant\",\"content\":\"lo\"},\"done\":false}\n",
            "{\"model\":\"gemma:2b\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,",
            "\"done_reason\":\"stop\",\"prompt_eval_count\":11,\"eval_count\":2}\n",
        );

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "gemma:2b",
                "options": { "num_predict": 32 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let api = OllamaApi::with_api_base(server.uri()).unwrap();

        let messages = [ChatMessage {
            role: Role::User,
            content: "Hello!".to_string(),
        }];

        let options = ModelOptions {
            num_predict: Some(32),
            ..Default::default()
        };

        let mut stream = api.chat("gemma:2b", &messages, &options).await.unwrap();

        let mut content = String::new();
        let mut last = None;

        while let Some(delta) = stream.next().await {
            let delta = delta.unwrap();
            content.push_str(&delta.message.content);
            last = Some(delta);
        }

        let last = last.unwrap();

        assert_eq!(content, "Hello");
        assert!(last.done);
        assert_eq!(last.done_reason, DoneReason::Stop);
        assert_eq!(last.eval_count, Some(2));
    }
}
