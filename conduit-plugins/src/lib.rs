#![deny(missing_docs)]
//! Reference plugins for conduit pipelines.
//!
//! Nothing here is required by the kernel. These handlers exist so a fresh
//! deployment can run a plan end to end, and as templates for real plugins.

mod access;
mod cache;
mod echo;
mod merge;
mod tracing_hook;

pub use access::{ACCESS_ALLOWED_KEY, AllowAllGate};
pub use cache::{CACHE_HIT_KEY, DEFAULT_CACHE_CAPACITY, InMemoryCache};
pub use echo::EchoTool;
pub use merge::{AllOrNothing, DEGRADED_KEY, FirstSuccess, PartialDegrade};
pub use tracing_hook::TracingHook;

use conduit_registry::{
    ActivityRegistryBuilder, CustomBucketBuilder, PredefinedBucketBuilder, PredefinedStage,
};
use stage0::{DEFAULT_PLUGIN_ID, Handler, RegistryError};

/// Bucket builders with every reference plugin registered.
#[derive(Debug, Default)]
pub struct DefaultPlugins {
    /// `ACCESS` and `CACHE` default variants.
    pub predefined: PredefinedBucketBuilder,
    /// The three merge policies.
    pub activities: ActivityRegistryBuilder,
    /// `EchoTool`.
    pub custom: CustomBucketBuilder,
}

/// Register the reference plugins into the given builders.
///
/// Fails if any of the names is already taken.
pub fn register_defaults(plugins: DefaultPlugins) -> Result<DefaultPlugins, RegistryError> {
    let predefined = plugins
        .predefined
        .register(PredefinedStage::Access, DEFAULT_PLUGIN_ID, Handler::stage(AllowAllGate))?
        .register(PredefinedStage::Cache, DEFAULT_PLUGIN_ID, Handler::stage(InMemoryCache::new()))?;
    let activities = plugins
        .activities
        .register("FirstSuccess", Handler::merge(FirstSuccess))?
        .register("AllOrNothing", Handler::merge(AllOrNothing))?
        .register("PartialDegrade", Handler::merge(PartialDegrade))?;
    let custom = plugins
        .custom
        .register("EchoTool", Handler::capability(EchoTool))?;
    Ok(DefaultPlugins {
        predefined,
        activities,
        custom,
    })
}
