use std::fmt;
use std::sync::Arc;

use crate::providers::{
    self,
    options::ClientDefaults,
    providers::{OllamaClient, OpenAIClient, ProviderIdentifier},
    ChatClient, ClientOptions,
};

pub(crate) type ClientConstructor = Arc<
    dyn Fn(ClientOptions) -> Result<Box<dyn ChatClient>, providers::Error> + Send + Sync,
>;

/// An adapter known to the registry: a constructor, along with the options the
/// adapter falls back to when a descriptor leaves them unset.
#[derive(Clone)]
pub(crate) struct ClientRegistration {
    pub name: String,
    pub constructor: ClientConstructor,
    pub defaults: ClientDefaults,
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("name", &self.name)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ClientRegistration {
    pub(crate) fn new<F, C>(name: &str, defaults: ClientDefaults, constructor: F) -> ClientRegistration
    where
        F: Fn(ClientOptions) -> Result<C, providers::Error> + Send + Sync + 'static,
        C: ChatClient + 'static,
    {
        ClientRegistration {
            name: name.to_string(),
            constructor: Arc::new(move |options| {
                constructor(options).map(|client| Box::new(client) as Box<dyn ChatClient>)
            }),
            defaults,
        }
    }

    pub(crate) fn construct(&self, options: ClientOptions) -> Result<Box<dyn ChatClient>, providers::Error> {
        (self.constructor)(options)
    }
}

const OPENAI_MAX_TOKENS: u32 = 4096;

fn compatible(id: ProviderIdentifier, default_api_base: &'static str) -> ClientRegistration {
    ClientRegistration::new(id.name(), ClientDefaults::default(), move |options| {
        OpenAIClient::compatible(id, default_api_base, options)
    })
}

/// An ordered collection of adapters. Lookups return the first registration
/// with a matching name. The proxy adapter is held apart from the others: no
/// descriptor names it, it is only reached through routing.
#[derive(Debug, Clone)]
pub(crate) struct Registry {
    entries: Vec<ClientRegistration>,
    proxy: ClientRegistration,
}

impl Registry {
    pub(crate) fn new(proxy: ClientRegistration) -> Registry {
        Registry {
            entries: Vec::new(),
            proxy,
        }
    }

    /// The adapters shipped with this crate.
    pub(crate) fn builtin() -> Registry {
        let openai_defaults = ClientDefaults {
            max_tokens: Some(OPENAI_MAX_TOKENS),
        };

        let mut registry = Registry::new(ClientRegistration::new(
            ProviderIdentifier::Proxy.name(),
            openai_defaults,
            OpenAIClient::proxy,
        ));

        registry.register(ClientRegistration::new(
            ProviderIdentifier::Ollama.name(),
            ClientDefaults::default(),
            OllamaClient::new,
        ));
        registry.register(ClientRegistration::new(
            ProviderIdentifier::OpenAI.name(),
            openai_defaults,
            OpenAIClient::openai,
        ));
        registry.register(compatible(ProviderIdentifier::LmStudio, "http://localhost:1234"));
        registry.register(compatible(ProviderIdentifier::Llamafile, "http://localhost:8080"));
        registry.register(compatible(ProviderIdentifier::LlamaCpp, "http://localhost:8080"));
        registry.register(compatible(ProviderIdentifier::Msty, "http://localhost:10000"));

        registry
    }

    /// Appends an adapter. An adapter registered under a name which is already
    /// taken is never looked up.
    pub(crate) fn register(&mut self, registration: ClientRegistration) {
        if self.lookup(&registration.name).is_some() {
            tracing::debug!(
                "adapter \"{}\" is shadowed by an earlier registration",
                registration.name
            );
        }

        self.entries.push(registration);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&ClientRegistration> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub(crate) fn proxy(&self) -> &ClientRegistration {
        &self.proxy
    }

    pub(crate) fn entries(&self) -> &[ClientRegistration] {
        &self.entries
    }
}
