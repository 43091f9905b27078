//! Options a chat client is constructed with, and the completion options
//! layered on top of one another to form each request.
//!
//! Completion options are merged in a fixed order of precedence:
//!
//! ```text
//! call-site overrides > descriptor defaults > client class defaults
//! ```
//!
//! The client factory computes the baseline (descriptor over class default)
//! once, at construction. Call-site overrides are applied per request with
//! [`CompletionOptions::overlay`].

use serde::{Deserialize, Serialize};

use super::log::SharedLogSink;

/// Sampling and length options for a completion request. Every field is
/// optional; an unset field leaves the decision to the next layer down, and
/// ultimately to the API.
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
pub(crate) struct CompletionOptions {
    /// The provider's name for the model. This is the literal model name from
    /// the descriptor, even when requests are routed through the proxy.
    pub model: Option<String>,
    /// The maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Option<Vec<String>>,
}

/// Defaults registered alongside a client constructor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ClientDefaults {
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    /// Returns a copy of `self` where every field set in `top` replaces the
    /// corresponding field of `self`.
    pub(crate) fn overlay(&self, top: &CompletionOptions) -> CompletionOptions {
        CompletionOptions {
            model: top.model.clone().or_else(|| self.model.clone()),
            max_tokens: top.max_tokens.or(self.max_tokens),
            temperature: top.temperature.or(self.temperature),
            top_p: top.top_p.or(self.top_p),
            stop: top.stop.clone().or_else(|| self.stop.clone()),
        }
    }

    /// Computes the options a client starts from: the descriptor's defaults,
    /// with `model` set to the literal model name and `max_tokens` falling back
    /// to the class default when the descriptor leaves it unset.
    pub(crate) fn baseline(
        descriptor: Option<&CompletionOptions>,
        model: &str,
        defaults: &ClientDefaults,
    ) -> CompletionOptions {
        let mut options = descriptor.cloned().unwrap_or_default();

        options.model = Some(model.to_string());
        options.max_tokens = options.max_tokens.or(defaults.max_tokens);

        options
    }
}

/// Everything a client constructor receives.
#[derive(Clone)]
pub(crate) struct ClientOptions {
    /// The model identifier sent on the wire.
    pub model: String,
    /// Display title.
    pub title: String,
    /// Baseline completion options.
    pub completion_options: CompletionOptions,
    /// Correlation id attached to requests, where the API has room for one.
    pub unique_id: String,
    pub log_sink: SharedLogSink,
    /// Overrides the adapter's default API base.
    pub api_base: Option<String>,
    pub api_key: Option<String>,
}

impl ClientOptions {
    /// The completion options for a single request.
    pub(crate) fn request_options(&self, overrides: Option<&CompletionOptions>) -> CompletionOptions {
        match overrides {
            Some(overrides) => self.completion_options.overlay(overrides),
            None => self.completion_options.clone(),
        }
    }

    /// The model identifier for a single request. A call-site model override
    /// replaces the effective identifier; the baseline `model` field does not,
    /// since for proxied clients it holds the provider's name rather than the
    /// proxy's.
    pub(crate) fn request_model<'o>(&'o self, overrides: Option<&'o CompletionOptions>) -> &'o str {
        overrides
            .and_then(|o| o.model.as_deref())
            .unwrap_or(&self.model)
    }
}
