//! Concrete types for providers, along with their identifiers

use strum_macros;

/// The `ProviderIdentifier` names a client adapter. It is used to
/// differentiate clients at runtime in code which is generic over different
/// providers.
///
/// The `to_string` and `FromStr` are the provider names used in configuration
/// files and should remain stable.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum ProviderIdentifier {
    Ollama,
    OpenAI,
    LmStudio,
    Llamafile,
    #[strum(serialize = "llama.cpp")]
    LlamaCpp,
    Msty,
    /// The managed proxy. It is never named by a descriptor, only reached
    /// through routing.
    Proxy,
}

impl ProviderIdentifier {
    /// The provider name, as written in configuration files.
    pub(crate) fn name(self) -> &'static str {
        self.into()
    }
}

pub(crate) use super::ollama::OllamaClient;
pub(crate) use super::openai::OpenAIClient;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_provider_names_are_stable() {
        assert_eq!(ProviderIdentifier::Ollama.name(), "ollama");
        assert_eq!(ProviderIdentifier::OpenAI.name(), "openai");
        assert_eq!(ProviderIdentifier::LmStudio.name(), "lmstudio");
        assert_eq!(ProviderIdentifier::LlamaCpp.name(), "llama.cpp");
        assert_eq!(ProviderIdentifier::LlamaCpp.to_string(), "llama.cpp");

        assert_eq!(
            ProviderIdentifier::from_str("llama.cpp").unwrap(),
            ProviderIdentifier::LlamaCpp
        );
    }

    #[test]
    fn test_every_name_parses() {
        for id in ProviderIdentifier::iter() {
            assert_eq!(ProviderIdentifier::from_str(id.name()).unwrap(), id);
        }
    }
}
