use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use super::api;
use crate::chat::{Message, Role};
use crate::providers::{
    providers::ProviderIdentifier, AsyncMessageIterator, ChatClient, ClientOptions,
    CompletionOptions, Error, ErrorKind, FinishReason, MessageDelta, Model, Usage,
};

impl From<api::Role> for Role {
    fn from(value: api::Role) -> Self {
        match value {
            api::Role::User => Role::User,
            api::Role::System => Role::System,
            api::Role::Assistant => Role::Model,
        }
    }
}

impl From<Role> for api::Role {
    fn from(value: Role) -> Self {
        match value {
            Role::User => api::Role::User,
            Role::System => api::Role::System,
            Role::Model => api::Role::Assistant,
        }
    }
}

impl From<api::Tag> for Model {
    fn from(value: api::Tag) -> Self {
        Model::with_id(value.name)
    }
}

impl From<&CompletionOptions> for api::ModelOptions {
    fn from(value: &CompletionOptions) -> Self {
        api::ModelOptions {
            num_predict: value.max_tokens,
            temperature: value.temperature,
            top_p: value.top_p,
            stop: value.stop.clone(),
        }
    }
}

impl From<api::Error> for Error {
    fn from(value: api::Error) -> Self {
        match value {
            api::Error::RequestFailed(err) => err.into(),
            api::Error::StreamParser(err) => err.into(),
            value => {
                let kind = match &value {
                    api::Error::InternalError(_) => ErrorKind::InternalError,
                    api::Error::InvalidApiBase(_) | api::Error::InvalidEndpoint(_) => {
                        ErrorKind::InvalidConfiguration
                    }
                    api::Error::NotFound(_) => ErrorKind::NotFound,
                    api::Error::BadRequest(_) => ErrorKind::BadRequest,
                    _ => ErrorKind::UnspecifiedError,
                };

                Error::from_source(kind, Box::new(value))
            }
        }
    }
}

/// A client for a model served by the Ollama runtime.
pub(crate) struct OllamaClient {
    api: api::OllamaApi,
    options: ClientOptions,
}

impl OllamaClient {
    pub(crate) fn new(options: ClientOptions) -> Result<OllamaClient, Error> {
        let api_base = options
            .api_base
            .as_deref()
            .unwrap_or(api::OLLAMA_DEFAULT_ENDPOINT);

        Ok(OllamaClient {
            api: api::OllamaApi::with_api_base(api_base)?,
            options,
        })
    }
}

pub(crate) struct OllamaCompletionResponse<S>
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin,
{
    inner: api::StreamingChatResponse<S>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

#[async_trait]
impl<S: Stream<Item = reqwest::Result<Bytes>> + Unpin + Send> AsyncMessageIterator
    for OllamaCompletionResponse<S>
{
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>> {
        let msg = match self.inner.next().await? {
            Ok(msg) => msg,
            Err(err) => return Some(Err(err.into())),
        };

        if !msg.done {
            return Some(Ok(MessageDelta {
                role: msg.message.role.into(),
                content: msg.message.content,
            }));
        }

        self.finish_reason = Some(match msg.done_reason {
            api::DoneReason::Length => FinishReason::Length,
            _ => FinishReason::Stop,
        });

        // The "prompt eval count" disappears when the prompt is cached.
        self.usage = Some(Usage {
            prompt_tokens: msg.prompt_eval_count,
            completion_tokens: msg.eval_count,
        });

        if msg.message.content.is_empty() {
            None
        } else {
            Some(Ok(MessageDelta {
                role: msg.message.role.into(),
                content: msg.message.content,
            }))
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
impl ChatClient for OllamaClient {
    fn id(&self) -> ProviderIdentifier {
        ProviderIdentifier::Ollama
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
                self.api.tags_url()?
            ))
            .await;

        let tags = self.api.tags().await?;

        Ok(tags.into_iter().map(Model::from).collect())
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

        let completion = self
            .api
            .chat(model, &messages, &api::ModelOptions::from(&options))
            .await?;

        Ok(Box::new(OllamaCompletionResponse {
            inner: completion,
            finish_reason: None,
            usage: None,
        }))
    }
}
