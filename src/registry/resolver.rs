use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use super::registry::Registry;
use super::routing::{route, PlatformMetadata, Route};
use super::Error;
use crate::providers::{ChatClient, ClientOptions, CompletionOptions, SharedLogSink};

/// The reserved model name which asks for every model the provider serves.
pub(crate) const AUTODETECT: &str = "AUTODETECT";

/// A declarative description of one model, as written in the configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub(crate) struct ModelDescriptor {
    #[serde(rename = "name")]
    pub title: String,
    pub provider: String,
    pub model: String,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub default_completion_options: Option<CompletionOptions>,
}

/// How the managed proxy is reached.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProxySettings {
    pub api_base: Option<String>,
    pub access_token: Option<String>,
}

pub(crate) type Client = Box<dyn ChatClient>;

/// Resolves descriptors against a registry. The resolver holds everything which
/// is shared by all the clients it builds.
pub(crate) struct Resolver {
    registry: Registry,
    unique_id: String,
    log_sink: SharedLogSink,
    platform: Option<PlatformMetadata>,
    proxy: ProxySettings,
}

impl Resolver {
    pub(crate) fn new(registry: Registry, unique_id: String, log_sink: SharedLogSink) -> Resolver {
        Resolver {
            registry,
            unique_id,
            log_sink,
            platform: None,
            proxy: ProxySettings::default(),
        }
    }

    pub(crate) fn with_platform(mut self, platform: Option<PlatformMetadata>) -> Resolver {
        self.platform = platform;
        self
    }

    pub(crate) fn with_proxy(mut self, proxy: ProxySettings) -> Resolver {
        self.proxy = proxy;
        self
    }

    /// Builds the client for a single descriptor, without expanding it.
    /// Returns `Ok(None)` when no adapter serves the descriptor's provider.
    pub(crate) fn build_client(&self, descriptor: &ModelDescriptor) -> Result<Option<Client>, Error> {
        let route = route(&descriptor.provider, self.platform.as_ref());

        let registration = match route {
            Route::Proxy(_) => Some(self.registry.proxy()),
            Route::Direct => self.registry.lookup(&descriptor.provider),
        };

        let registration = match registration {
            Some(registration) => registration,
            None => {
                tracing::debug!(
                    "no adapter serves provider \"{}\", skipping \"{}\"",
                    descriptor.provider,
                    descriptor.title
                );
                return Ok(None);
            }
        };

        let (model, api_base, api_key) = match route {
            Route::Proxy(platform) => (
                platform.proxy_model_name(&descriptor.provider, &descriptor.model),
                self.proxy.api_base.clone(),
                self.proxy.access_token.clone(),
            ),
            Route::Direct => (
                descriptor.model.clone(),
                descriptor.api_base.clone(),
                descriptor.api_key.clone(),
            ),
        };

        let completion_options = CompletionOptions::baseline(
            descriptor.default_completion_options.as_ref(),
            &descriptor.model,
            &registration.defaults,
        );

        tracing::debug!(
            "building \"{}\" with adapter \"{}\" as model \"{}\"",
            descriptor.title,
            registration.name,
            model
        );

        let client = registration
            .construct(ClientOptions {
                model,
                title: descriptor.title.clone(),
                completion_options,
                unique_id: self.unique_id.clone(),
                log_sink: self.log_sink.clone(),
                api_base,
                api_key,
            })
            .map_err(|source| Error::ConstructionFailed {
                provider: descriptor.provider.clone(),
                title: descriptor.title.clone(),
                source,
            })?;

        Ok(Some(client))
    }

    /// Builds one client per model served by the endpoint `base` talks to.
    /// A failure to list the models is logged and yields no clients.
    pub(crate) async fn expand(&self, base: &dyn ChatClient, descriptor: &ModelDescriptor) -> Vec<Client> {
        let models = match base.models().await {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(
                    "failed to list models for \"{}\": {}",
                    descriptor.title,
                    err
                );
                return Vec::new();
            }
        };

        let mut clients = Vec::new();

        for model in models {
            // Never expand the sentinel twice
            if model.id == AUTODETECT {
                continue;
            }

            let discovered = ModelDescriptor {
                title: format!("{} - {}", base.title(), model.id),
                model: model.id,
                ..descriptor.clone()
            };

            match self.build_client(&discovered) {
                Ok(Some(client)) => clients.push(client),
                Ok(None) => {}
                Err(err) => tracing::warn!("{}", err),
            }
        }

        clients
    }

    /// Resolves a descriptor to the clients it denotes: none, one, or one per
    /// discovered model.
    pub(crate) async fn resolve(&self, descriptor: &ModelDescriptor) -> Result<Vec<Client>, Error> {
        let base = match self.build_client(descriptor)? {
            Some(base) => base,
            None => return Ok(Vec::new()),
        };

        if descriptor.model == AUTODETECT {
            Ok(self.expand(base.as_ref(), descriptor).await)
        } else {
            Ok(vec![base])
        }
    }

    /// Resolves every descriptor concurrently, preserving their order. A
    /// descriptor which fails to resolve is logged and contributes no clients.
    pub(crate) async fn resolve_all(&self, descriptors: &[ModelDescriptor]) -> Vec<Client> {
        let resolved = join_all(descriptors.iter().map(|d| self.resolve(d))).await;

        let mut clients = Vec::new();

        for result in resolved {
            match result {
                Ok(resolved) => clients.extend(resolved),
                Err(err) => tracing::warn!("{}", err),
            }
        }

        clients
    }
}
