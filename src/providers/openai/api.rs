use bytes::Bytes;
use futures_core::Stream;
use reqwest::{Client, IntoUrl, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::providers::apireq::{
    self, endpoint_url, ByteStream, JsonStreamParser, ReqwestResponseStreamExt, Url,
};

pub(super) const DEFAULT_API_BASE: &str = "https://api.openai.com";

#[derive(thiserror::Error, Debug)]
pub(super) enum Error {
    /// The API Base is not a URL that can be used in a network request
    #[error("invalid api base")]
    InvalidApiBase(#[source] reqwest::Error),

    /// No API base was given and the server has no well-known address
    #[error("no api base is configured")]
    MissingApiBase,

    /// Endpoint URL is invalid
    #[error("invalid endpoint")]
    InvalidEndpoint(
        #[from]
        #[source]
        url::ParseError,
    ),

    /// A bad response: the parser failed to parse the
    /// response stream
    #[error("failed to parse streamed response")]
    StreamParser(
        #[from]
        #[source]
        apireq::JsonStreamError,
    ),

    /// Some issue with the request
    #[error("{}", .0)]
    RequestFailed(
        #[from]
        #[source]
        apireq::ReqwestError,
    ),

    /// Your request was malformed or missing some required parameters,
    /// such as a token or an input.
    #[error("{}", .0.message)]
    BadRequest(ApiErrorPayload),

    /// An "Authentication" Error is an umbrella error with three possibilities:
    /// (1) Invalid Authentication
    /// (2) The requesting API key is not correct.
    /// (3) Your account is not part of an organization.
    #[error("{}", .0.message)]
    Authentication(ApiErrorPayload),

    /// You don't have access to the requested resource.
    #[error("{}", .0.message)]
    PermissionDenied(ApiErrorPayload),

    /// Requested resource does not exist.
    #[error("{}", .0.message)]
    NotFound(ApiErrorPayload),

    /// The resource was updated by another request.
    #[error("{}", .0.message)]
    Conflict(ApiErrorPayload),

    /// Unable to process the request despite the format being correct.
    #[error("{}", .0.message)]
    UnprocessableEntity(ApiErrorPayload),

    /// You have hit your assigned rate limit.
    #[error("{}", .0.message)]
    RateLimit(ApiErrorPayload),

    /// The server has an internal issue
    #[error("{}", .0.message)]
    InternalError(ApiErrorPayload),

    /// The engine is currently overloaded, please try again later
    #[error("{}", .0.message)]
    ApiOverloaded(ApiErrorPayload),

    /// Some unknown error was returned by the API
    #[error("{}", .0.message)]
    UnknownStatus(ApiErrorPayload),
}

impl Error {
    fn from_status(status: u16, payload: ApiErrorPayload) -> Error {
        match status {
            400 => Error::BadRequest(payload),
            401 => Error::Authentication(payload),
            403 => Error::PermissionDenied(payload),
            404 => Error::NotFound(payload),
            409 => Error::Conflict(payload),
            422 => Error::UnprocessableEntity(payload),
            429 => Error::RateLimit(payload),
            500 => Error::InternalError(payload),
            503 => Error::ApiOverloaded(payload),
            _ => Error::UnknownStatus(payload),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(super) enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct ChatMessage {
    pub content: String,
    pub role: Role,
}

/* Structures to serialize /v1/chat/completions */

#[derive(Serialize, Debug, Default)]
pub(super) struct ChatCompletionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// A stable identifier for the end user, used by the API for abuse monitoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Serialize, Debug)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'o> {
    model: &'o str,
    messages: &'o [ChatMessage],
    #[serde(flatten)]
    options: &'o ChatCompletionOptions,
    stream: bool,
    stream_options: StreamOptions,
}

/* Structures to deserialize /v1/chat/completions */

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FinishReason {
    #[serde(rename = "stop")]
    Stop,
    #[serde(rename = "length")]
    Length,
    #[serde(rename = "content_filter")]
    ContentFilter,
    #[serde(rename = "tool_calls")]
    ToolCalls,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub(super) struct Delta {
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub(super) struct Choice {
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct Usage {
    pub completion_tokens: usize,
    pub prompt_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub(super) struct ChatCompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

/* Structures to deserialize /v1/models */

#[derive(Deserialize, Debug)]
pub(super) struct ApiModel {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ModelList {
    data: Vec<ApiModel>,
}

/* API Errors */

#[derive(Deserialize, Debug)]
pub(super) struct ApiErrorPayload {
    message: String,
    #[serde(rename = "type", default)]
    typ: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    error: ApiErrorPayload,
}

pub(super) struct StreamingChatResponse<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    stream: JsonStreamParser<S>,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin> StreamingChatResponse<S> {
    pub(super) async fn next(&mut self) -> Option<Result<ChatCompletionChunk, Error>> {
        let chunk = self.stream.parse::<ChatCompletionChunk>().await?;

        Some(chunk.map_err(Error::from))
    }
}

pub(super) struct OpenAIApi {
    api_base: Url,
    api_key: Option<String>,
    client: Client,
}

impl OpenAIApi {
    pub(super) fn new<U: IntoUrl>(api_key: Option<&str>, api_base: U) -> Result<OpenAIApi, Error> {
        let api_base = api_base.into_url().map_err(Error::InvalidApiBase)?;

        Ok(OpenAIApi {
            api_base,
            api_key: api_key.map(str::to_string),
            client: Client::new(),
        })
    }

    pub(super) fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub(super) fn models_url(&self) -> Result<Url, Error> {
        Ok(endpoint_url(&self.api_base, "v1/models")?)
    }

    pub(super) fn chat_url(&self) -> Result<Url, Error> {
        Ok(endpoint_url(&self.api_base, "v1/chat/completions")?)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(api_key) => req.bearer_auth(api_key),
            None => req,
        }
    }

    async fn maybe_parse_api_error(res: Response) -> Result<Response, Error> {
        let status = res.status();

        if status.is_success() {
            return Ok(res);
        }

        let body = res
            .text()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        // Compatible servers do not always follow the error schema
        let payload = match serde_json::from_str::<ApiErrorResponse>(&body) {
            Ok(err) => err.error,
            Err(_) => ApiErrorPayload {
                message: body,
                typ: None,
            },
        };

        Err(Error::from_status(status.as_u16(), payload))
    }

    pub(super) async fn models(&self) -> Result<Vec<ApiModel>, Error> {
        let req = self.authorize(self.client.get(self.models_url()?));

        let res = req
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::maybe_parse_api_error(res).await?;

        let models: ModelList = res
            .json()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        Ok(models.data)
    }

    pub(super) async fn streaming_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<StreamingChatResponse<ByteStream>, Error> {
        let req = self.authorize(self.client.post(self.chat_url()?));

        let res = req
            .json(&ChatCompletionRequest {
                model,
                messages,
                options,
                stream: true,
                stream_options: StreamOptions {
                    include_usage: true,
                },
            })
            .send()
            .await
            .map_err(|e| Error::RequestFailed(e.into()))?;

        let res = Self::maybe_parse_api_error(res).await?;

        Ok(StreamingChatResponse {
            stream: res.stream_sse(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHAT_STREAM: &str = concat!(
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"id\":\"c1\",\"model\":\"gpt-4o-mini\",\"choices\":[],\"usage\":{\"completion_tokens\":1,\"prompt_tokens\":8,\"total_tokens\":9}}\n\n",
        "data: [DONE]\n\n",
    );

    #[tokio::test]
    async fn test_models_list() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [
                    { "id": "gpt-4o", "object": "model", "owned_by": "system" },
                    { "id": "gpt-3.5-turbo", "object": "model", "owned_by": "openai" }
                ]
            })))
            .mount(&server)
            .await;

        let api = OpenAIApi::new(Some("sk-test"), server.uri()).unwrap();

        let models = api.models().await.unwrap();
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();

        assert_eq!(ids, ["gpt-4o", "gpt-3.5-turbo"]);
        assert_eq!(models[0].owned_by.as_deref(), Some("system"));
    }

    #[tokio::test]
    async fn test_invalid_creds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "message": "Incorrect API key provided",
                    "type": "invalid_request_error"
                }
            })))
            .mount(&server)
            .await;

        let api = OpenAIApi::new(Some("not_a_valid_key"), server.uri()).unwrap();

        let result = api.models().await;

        assert!(matches!(result, Err(Error::Authentication(ref p)) if p.message == "Incorrect API key provided"));
    }

    #[tokio::test]
    async fn test_non_schema_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such route"))
            .mount(&server)
            .await;

        let api = OpenAIApi::new(None, server.uri()).unwrap();

        let result = api.models().await;

        assert!(matches!(result, Err(Error::NotFound(ref p)) if p.message == "no such route"));
    }

    #[tokio::test]
    async fn test_streaming_chat_completion() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "stream": true,
                "max_tokens": 16,
                "user": "corr-id"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(CHAT_STREAM),
            )
            .mount(&server)
            .await;

        let api = OpenAIApi::new(Some("sk-test"), server.uri()).unwrap();

        let messages = [ChatMessage {
            content: "Hello".to_string(),
            role: Role::User,
        }];

        let options = ChatCompletionOptions {
            max_tokens: Some(16),
            user: Some("corr-id".to_string()),
            ..Default::default()
        };

        let mut stream = api
            .streaming_chat_completion("gpt-4o-mini", &messages, &options)
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("Hi"));
        assert_eq!(chunks[2].choices[0].finish_reason, Some(FinishReason::Stop));
        assert_eq!(chunks[3].usage.as_ref().unwrap().total_tokens, 9);
    }
}
