//! An umbrella module for the OpenAI provider and the servers which speak its
//! protocol: local OpenAI-compatible runtimes and the managed proxy.

mod api;
mod provider;

pub(crate) use self::provider::OpenAIClient;
