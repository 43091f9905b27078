//! Traits and type definitions for chat clients and provider interactions.
//!
//! The interface for every resolved model is the [`ChatClient`] trait. A chat
//! client is bound to exactly one model at construction time: it owns its
//! connection configuration, its title, the effective model identifier it sends
//! on the wire, and the merged completion options that every request starts from.
//!
//! Chat clients support two operations:
//! - Models: list the models served by the endpoint the client is connected to.
//!   This is what model auto-detection is built on.
//! - Completion: take a list of messages and stream back a model-generated message.
//!
//! Clients are built from a [`ClientOptions`] value by the constructors held in the
//! [`crate::registry`]. Each client reports every outgoing request to the
//! [`log::LogSink`] it was constructed with.
//!
//! ## Error Handling
//!
//! Each API has its own bespoke error system. For example, the Ollama API
//! documentation does not describe any errors that can be raised by the API, while
//! the OpenAI API is very explicit. Providers each have their own error types. These
//! are encapsulated in [`Error`], and the [`ErrorKind`] enum provides an indication
//! of the category of error that was raised.

mod apireq;
mod ollama;
mod openai;

pub(crate) mod log;
pub(crate) mod options;
pub(crate) mod providers;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::fmt;

pub(crate) use self::log::SharedLogSink;
pub(crate) use self::options::{ClientOptions, CompletionOptions};
use self::providers::ProviderIdentifier;
use crate::chat::{Message, Role};

/// This is a list specifying general categories of errors that
/// can be returned by a [`ChatClient`]. This list may be updated
/// as providers are added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// Failed to connect to the underlying API service.
    /// This could be due to network issues like DNS
    /// resolution, connectivity issues, or routing problems.
    Connection,
    /// A request timed out.
    TimedOut,
    /// An API key was not provided or service-specific
    /// permissions are needed.
    Authentication,
    /// A rate limit was reached or a quota was exceeded.
    ExcessUsage,
    /// The servers are overloaded. This is non-fatal
    /// and indicates that a retry may be needed later.
    ApiOverloaded,
    /// The requested resource was not found. This likely means that
    /// the requested model does not exist.
    NotFound,
    /// The request was malformed or is otherwise improper. This
    /// often corresponds to errors with HTTP status codes in
    /// the 400s.
    BadRequest,
    /// The server encountered an error. This often corresponds to
    /// errors with HTTP status codes in the 500s.
    InternalError,
    /// An API response was unable to be deserialized, malformed,
    /// or otherwise violated the assumptions of the client.
    UnexpectedResponse,
    /// The client could not be built from its options, e.g. the
    /// API base is not a usable URL.
    InvalidConfiguration,
    /// An error that does not fit into any of the other categories.
    UnspecifiedError,
}

#[derive(Debug)]
pub(crate) struct Error {
    kind: ErrorKind,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    #[cfg(test)]
    pub(crate) fn from_kind(kind: ErrorKind) -> Error {
        Error { kind, source: None }
    }

    pub(crate) fn from_source(kind: ErrorKind, source: Box<dyn StdError + Send + Sync>) -> Error {
        Error {
            kind,
            source: Some(source),
        }
    }

    pub(crate) fn kind(&self) -> ErrorKind {
        self.kind
    }

    fn message(&self) -> &'static str {
        match self.kind {
            ErrorKind::Connection => "failed to connect to the API service",
            ErrorKind::TimedOut => "request timed out",
            ErrorKind::Authentication => "authentication failed or not provided",
            ErrorKind::ExcessUsage => "rate limit exceeded or quota crossed",
            ErrorKind::ApiOverloaded => "API server(s) are currently overloaded",
            ErrorKind::NotFound => "the requested resource was not found",
            ErrorKind::BadRequest => "the request was bad or malformed",
            ErrorKind::InternalError => "the server encountered an internal error",
            ErrorKind::UnexpectedResponse => "API response was unexpected or malformed",
            ErrorKind::InvalidConfiguration => "the client configuration is invalid",
            ErrorKind::UnspecifiedError => "an unspecified error occurred",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {}", self.message(), source),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

/// The reason why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinishReason {
    /// The model generated a stop token, terminating
    /// its response.
    Stop,
    /// An API content filter was triggered.
    ContentFilter,
    /// The requested message length was reached.
    Length,
}

/// A message delta represents a "chunk" of a streamed message.
/// Usually, this consists of a single token.
#[derive(Debug, Clone)]
pub(crate) struct MessageDelta {
    /// The role of the message.
    pub role: Role,
    /// The content of the message.
    pub content: String,
}

/// The context usage metadata.
#[derive(Debug, Clone, Default)]
pub(crate) struct Usage {
    /// The number of tokens in the prompt.
    pub prompt_tokens: Option<usize>,
    /// The number of tokens in the response.
    pub completion_tokens: Option<usize>,
}

/// A streamed response from a completion.
#[async_trait]
pub(crate) trait AsyncMessageIterator: Send {
    /// The next chunk of the message.
    async fn next(&mut self) -> Option<Result<MessageDelta, Error>>;

    /// The reason the model stopped generating. `None` until the
    /// iterator is exhausted.
    fn finish_reason(&self) -> Option<FinishReason>;

    /// The usage for this request. `None` until the iterator is
    /// exhausted, or if the API did not report it.
    fn usage(&self) -> Option<&Usage>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Model {
    /// The ID of the model, as the provider reports it.
    pub id: String,
}

impl Model {
    pub(crate) fn with_id(id: String) -> Model {
        Model { id }
    }
}

/// A trait implemented by all chat clients.
#[async_trait]
pub(crate) trait ChatClient: Send + Sync {
    /// Returns the adapter this client was built from.
    fn id(&self) -> ProviderIdentifier;

    /// Returns the options the client was constructed with.
    fn options(&self) -> &ClientOptions;

    /// The human-readable title of the client.
    fn title(&self) -> &str {
        &self.options().title
    }

    /// The model identifier sent to the API. For proxied clients this is
    /// the composite proxy name rather than the provider's model name.
    fn model(&self) -> &str {
        &self.options().model
    }

    /// The endpoint requests are sent to.
    fn api_base(&self) -> &str;

    /// Returns the models served by the endpoint this client talks to.
    async fn models(&self) -> Result<Vec<Model>, Error>;

    /// Takes a series of messages that are part of a chat conversation
    /// and produces a new message generated by the model in response.
    ///
    /// `overrides` take precedence over the client's baseline completion
    /// options for this call only.
    async fn stream_completion(
        &self,
        messages: &[Message],
        overrides: Option<&CompletionOptions>,
    ) -> Result<Box<dyn AsyncMessageIterator>, Error>;
}
