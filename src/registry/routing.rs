//! Routing between direct provider connections and the managed proxy.

use serde::{Deserialize, Serialize};

/// Providers which run on the user's machine. The proxy cannot reach them, so
/// they are always connected to directly.
pub(crate) const ALWAYS_LOCAL_PROVIDERS: [&str; 5] =
    ["ollama", "lmstudio", "llamafile", "llama.cpp", "msty"];

/// Identifies the package a model configuration belongs to. When present,
/// remote providers are reached through the managed proxy.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlatformMetadata {
    pub owner_slug: String,
    pub package_slug: String,
}

impl PlatformMetadata {
    /// The name the proxy knows a model by.
    pub(crate) fn proxy_model_name(&self, provider: &str, model: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.owner_slug, self.package_slug, provider, model
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route<'p> {
    /// Connect to the provider's own endpoint
    Direct,
    /// Connect through the proxy, on behalf of the given package
    Proxy(&'p PlatformMetadata),
}

pub(crate) fn is_always_local(provider: &str) -> bool {
    ALWAYS_LOCAL_PROVIDERS.contains(&provider)
}

pub(crate) fn should_use_proxy(provider: &str, platform: Option<&PlatformMetadata>) -> bool {
    platform.is_some() && !is_always_local(provider)
}

pub(crate) fn route<'p>(provider: &str, platform: Option<&'p PlatformMetadata>) -> Route<'p> {
    match platform {
        Some(platform) if should_use_proxy(provider, Some(platform)) => Route::Proxy(platform),
        _ => Route::Direct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> PlatformMetadata {
        PlatformMetadata {
            owner_slug: "acme".to_string(),
            package_slug: "assistant".to_string(),
        }
    }

    #[test]
    fn test_no_metadata_is_direct() {
        for provider in ["openai", "ollama", "anthropic"] {
            assert!(!should_use_proxy(provider, None));
            assert_eq!(route(provider, None), Route::Direct);
        }
    }

    #[test]
    fn test_local_providers_are_never_proxied() {
        let platform = platform();

        for provider in ALWAYS_LOCAL_PROVIDERS {
            assert!(!should_use_proxy(provider, Some(&platform)));
            assert_eq!(route(provider, Some(&platform)), Route::Direct);
        }
    }

    #[test]
    fn test_remote_providers_are_proxied() {
        let platform = platform();

        // Unknown providers are routed too; the proxy decides what it serves
        for provider in ["openai", "anthropic", "mistral"] {
            assert!(should_use_proxy(provider, Some(&platform)));
            assert_eq!(route(provider, Some(&platform)), Route::Proxy(&platform));
        }
    }

    #[test]
    fn test_proxy_model_name() {
        assert_eq!(
            platform().proxy_model_name("openai", "gpt-4o"),
            "acme/assistant/openai/gpt-4o"
        );
    }
}
