//! The registry turns model descriptors into live chat clients.
//!
//! A descriptor names a provider and a model. Resolution happens in three steps:
//!
//! 1. Routing decides whether the descriptor is served directly by its provider's
//!    adapter or indirectly through the managed proxy. Only the provider name and
//!    the presence of platform metadata matter; local runtimes are never proxied.
//! 2. The client factory looks up the adapter in the [`Registry`], computes the
//!    model identifier sent on the wire and the baseline completion options, and
//!    constructs the client. This step performs no network I/O.
//! 3. A descriptor whose model is the [`resolver::AUTODETECT`] sentinel is expanded: the
//!    client built in step 2 lists the models its endpoint serves, and one client
//!    is built per discovered model.
//!
//! A descriptor naming a provider which has no adapter resolves to nothing. This
//! is not an error.

pub(crate) mod registry;
pub(crate) mod resolver;
pub(crate) mod routing;

pub(crate) use self::registry::{ClientRegistration, Registry};
pub(crate) use self::resolver::{ModelDescriptor, ProxySettings, Resolver};
pub(crate) use self::routing::PlatformMetadata;

use crate::providers;
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum Error {
    /// The adapter rejected the options it was constructed with
    #[error("failed to construct a \"{provider}\" client for \"{title}\": {source}")]
    ConstructionFailed {
        provider: String,
        title: String,
        #[source]
        source: providers::Error,
    },
}
