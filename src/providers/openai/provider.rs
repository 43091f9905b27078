use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::env::VarError;

use crate::chat::{Message, Role};
use crate::providers::{
    openai::api, providers::ProviderIdentifier, AsyncMessageIterator, ChatClient, ClientOptions,
    CompletionOptions, Error, ErrorKind, FinishReason, MessageDelta, Model, Usage,
};

const OPENAI_ENV_KEY_VAR: &str = "OPENAI_API_KEY";

impl From<api::Error> for Error {
    fn from(value: api::Error) -> Self {
        let kind = match &value {
            api::Error::Authentication(_) | api::Error::PermissionDenied(_) => {
                ErrorKind::Authentication
            }
            api::Error::InvalidApiBase(_)
            | api::Error::MissingApiBase
            | api::Error::InvalidEndpoint(_) => ErrorKind::InvalidConfiguration,
            api::Error::BadRequest(_) | api::Error::UnprocessableEntity(_) => {
                ErrorKind::BadRequest
            }
            // Request invalidated by a race condition
            api::Error::Conflict(_) => ErrorKind::BadRequest,
            api::Error::InternalError(_) => ErrorKind::InternalError,
            api::Error::NotFound(_) => ErrorKind::NotFound,
            api::Error::RateLimit(_) => ErrorKind::ExcessUsage,
            api::Error::UnknownStatus(_) => ErrorKind::UnspecifiedError,
            api::Error::ApiOverloaded(_) => ErrorKind::ApiOverloaded,
            api::Error::RequestFailed(_) | api::Error::StreamParser(_) => {
                ErrorKind::UnspecifiedError
            }
        };

        match value {
            api::Error::RequestFailed(err) => err.into(),
            api::Error::StreamParser(err) => err.into(),
            value => Error::from_source(kind, Box::new(value)),
        }
    }
}

impl From<api::FinishReason> for FinishReason {
    fn from(value: api::FinishReason) -> Self {
        match value {
            api::FinishReason::Stop | api::FinishReason::ToolCalls => FinishReason::Stop,
            api::FinishReason::ContentFilter => FinishReason::ContentFilter,
            api::FinishReason::Length => FinishReason::Length,
        }
    }
}

impl From<api::Role> for Role {
    fn from(value: api::Role) -> Self {
        match value {
            api::Role::Assistant | api::Role::Tool => Role::Model,
            api::Role::System => Role::System,
            api::Role::User => Role::User,
        }
    }
}

impl From<Role> for api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::Model => api::Role::Assistant,
            Role::System => api::Role::System,
            Role::User => api::Role::User,
        }
    }
}

impl From<api::ApiModel> for Model {
    fn from(value: api::ApiModel) -> Self {
        Model::with_id(value.id)
    }
}

fn openai_api_key() -> Option<String> {
    match std::env::var(OPENAI_ENV_KEY_VAR) {
        Ok(api_key) => Some(api_key),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(_)) => {
            tracing::warn!("ignoring {}, it is not valid unicode", OPENAI_ENV_KEY_VAR);
            None
        }
    }
}

/// A client for any server speaking the OpenAI chat completions protocol: the
/// OpenAI API itself, local OpenAI-compatible runtimes, and the managed proxy.
pub(crate) struct OpenAIClient {
    id: ProviderIdentifier,
    api: api::OpenAIApi,
    options: ClientOptions,
}

impl OpenAIClient {
    fn with_api_base(
        id: ProviderIdentifier,
        api_base: &str,
        api_key: Option<&str>,
        options: ClientOptions,
    ) -> Result<OpenAIClient, Error> {
        Ok(OpenAIClient {
            id,
            api: api::OpenAIApi::new(api_key, api_base)?,
            options,
        })
    }

    /// A client for the OpenAI API. The API key falls back to `OPENAI_API_KEY`.
    pub(crate) fn openai(options: ClientOptions) -> Result<OpenAIClient, Error> {
        let api_key = options.api_key.clone().or_else(openai_api_key);
        let api_base = options
            .api_base
            .clone()
            .unwrap_or_else(|| api::DEFAULT_API_BASE.to_string());

        Self::with_api_base(
            ProviderIdentifier::OpenAI,
            &api_base,
            api_key.as_deref(),
            options,
        )
    }

    /// A client for a local runtime which serves the OpenAI protocol.
    pub(crate) fn compatible(
        id: ProviderIdentifier,
        default_api_base: &str,
        options: ClientOptions,
    ) -> Result<OpenAIClient, Error> {
        let api_key = options.api_key.clone();
        let api_base = options
            .api_base
            .clone()
            .unwrap_or_else(|| default_api_base.to_string());

        Self::with_api_base(id, &api_base, api_key.as_deref(), options)
    }

    /// A client for the managed proxy. The proxy has no well-known address,
    /// so the API base is required.
    pub(crate) fn proxy(options: ClientOptions) -> Result<OpenAIClient, Error> {
        let api_base = options.api_base.clone().ok_or(api::Error::MissingApiBase)?;
        let api_key = options.api_key.clone();

        Self::with_api_base(
            ProviderIdentifier::Proxy,
            &api_base,
            api_key.as_deref(),
            options,
        )
    }
}

pub(crate) struct OpenAICompletionResponse<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    inner: api::StreamingChatResponse<S>,
    role: Role,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
}

impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin + Send> OpenAICompletionResponse<S> {
    fn new(inner: api::StreamingChatResponse<S>) -> OpenAICompletionResponse<S> {
        OpenAICompletionResponse {
            inner,
            role: Role::Model,
            finish_reason: None,
            usage: None,
        }
    }
}

#[async_trait]
impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin + Send> AsyncMessageIterator
    for OpenAICompletionResponse<S>
{
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
        loop {
            let mut chunk = match self.inner.next().await? {
                Ok(chunk) => chunk,
                Err(err) => return Some(Err(err.into())),
            };

            // The usage arrives in a trailing chunk without choices
            if let Some(usage) = chunk.usage.take() {
                self.usage = Some(Usage {
                    prompt_tokens: Some(usage.prompt_tokens),
                    completion_tokens: Some(usage.completion_tokens),
                });
            }

            let choice = match chunk.choices.first_mut() {
                Some(choice) => std::mem::take(choice),
                None => continue,
            };

            if let Some(finish_reason) = choice.finish_reason {
                self.finish_reason = Some(finish_reason.into());
            }

            if let Some(role) = choice.delta.role {
                self.role = role.into();
            }

            match choice.delta.content {
                Some(content) if !content.is_empty() => {
                    return Some(Ok(MessageDelta {
                        role: self.role,
                        content,
                    }))
                }
                _ => continue,
            }
        }
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

#[async_trait]
impl ChatClient for OpenAIClient {
    fn id(&self) -> ProviderIdentifier {
        self.id
    }

    fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn api_base(&self) -> &str {
        self.api.api_base().as_str()
    }

    async fn models(&self) -> Result<Vec<Model>, Error> {
        self.options
            .log_sink
            .write_log(format!(
                "[{}] GET {}",
                self.options.unique_id,
                self.api.models_url()?
            ))
            .await;

        let models = self.api.models().await?;

        Ok(models.into_iter().map(Model::from).collect())
    }

    async fn stream_completion(
        &self,
        messages: &[Message],
        overrides: Option<&CompletionOptions>,
    ) -> Result<Box<dyn AsyncMessageIterator>, Error> {
        let model = self.options.request_model(overrides);
        let options = self.options.request_options(overrides);

        let messages: Vec<api::ChatMessage> = messages
            .iter()
            .map(|m| api::ChatMessage {
                role: m.role.into(),
                content: m.content.clone(),
            })
            .collect();

        let request_options = api::ChatCompletionOptions {
            temperature: options.temperature,
            top_p: options.top_p,
            stop: options.stop,
            max_tokens: options.max_tokens,
            user: Some(self.options.unique_id.clone()),
        };

        self.options
            .log_sink
            .write_log(format!(
                "[{}] POST {} model={} messages={}",
                self.options.unique_id,
                self.api.chat_url()?,
                model,
                messages.len()
            ))
            .await;

        let iterator = self
            .api
            .streaming_chat_completion(model, &messages, &request_options)
            .await?;

        Ok(Box::new(OpenAICompletionResponse::new(iterator)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::log::tests::RecordingLogSink;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(model: &str, api_base: Option<String>) -> ClientOptions {
        ClientOptions {
            model: model.to_string(),
            title: "Test".to_string(),
            completion_options: CompletionOptions {
                model: Some("gpt-4o".to_string()),
                max_tokens: Some(64),
                ..Default::default()
            },
            unique_id: "corr-id".to_string(),
            log_sink: Arc::new(RecordingLogSink::default()),
            api_base,
            api_key: Some("sk-test".to_string()),
        }
    }

    #[test]
    fn test_proxy_requires_api_base() {
        let result = OpenAIClient::proxy(options("acme/assistant/openai/gpt-4o", None));

        assert!(matches!(result, Err(e) if e.kind() == ErrorKind::InvalidConfiguration));
    }

    #[test]
    fn test_compatible_default_api_base() {
        let client =
            OpenAIClient::compatible(ProviderIdentifier::LmStudio, "http://localhost:1234", options("qwen", None))
                .unwrap();

        assert_eq!(client.id(), ProviderIdentifier::LmStudio);
        assert_eq!(client.api_base(), "http://localhost:1234/");
    }

    #[tokio::test]
    async fn test_proxy_sends_composite_model() {
        let server = MockServer::start().await;

        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"length\"}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"completion_tokens\":2,\"prompt_tokens\":5,\"total_tokens\":7}}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/llm/v1/chat/completions"))
            .and(body_partial_json(json!({
                "model": "acme/assistant/openai/gpt-4o",
                "max_tokens": 8,
                "user": "corr-id"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = OpenAIClient::proxy(options(
            "acme/assistant/openai/gpt-4o",
            Some(format!("{}/llm", server.uri())),
        ))
        .unwrap();

        // The call-site override wins over the baseline max tokens
        let overrides = CompletionOptions {
            max_tokens: Some(8),
            ..Default::default()
        };

        let mut stream = client
            .stream_completion(&[Message::user("Hello".to_string())], Some(&overrides))
            .await
            .unwrap();

        let mut content = String::new();
        while let Some(delta) = stream.next().await {
            let delta = delta.unwrap();
            assert_eq!(delta.role, Role::Model);
            content.push_str(&delta.content);
        }

        assert_eq!(content, "Hello");
        assert_eq!(stream.finish_reason(), Some(FinishReason::Length));
        assert_eq!(stream.usage().unwrap().completion_tokens, Some(2));
    }

    #[tokio::test]
    async fn test_listing_failure_is_categorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "slow down", "type": "rate_limit" }
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::openai(options("gpt-4o", Some(server.uri()))).unwrap();

        let err = client.models().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExcessUsage);
        assert!(err.to_string().contains("slow down"));
    }
}
