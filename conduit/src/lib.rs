#![deny(missing_docs)]
//! # conduit - umbrella crate
//!
//! A single import surface for the conduit pipeline kernel: the protocol
//! crate, the registries, the validator and the kernel, plus configuration
//! loading and a [`Runtime`] that wires them together. The reference
//! plugins are re-exported behind the `plugins` feature (on by default).

pub mod bootstrap;
mod config;
mod runtime;

pub use bootstrap::{ConfigError, ConfigSource, EnvSource, FileSource, StaticSource, load_config};
pub use config::ConduitConfig;
pub use runtime::{Runtime, RuntimeBuilder};

pub use conduit_kernel;
#[cfg(feature = "plugins")]
pub use conduit_plugins;
pub use conduit_registry;
pub use conduit_validator;
pub use stage0;

/// Happy-path imports for building and running plans.
pub mod prelude {
    pub use crate::{ConduitConfig, Runtime, load_config};

    pub use stage0::{
        CapabilityHandler, ExecutionCommand, ExecutionOutcome, ExecutionSignal, Handler,
        KernelError, MergePolicy, OutputMap, StageDefinition, StageError, StageHandler, StagePlan,
    };

    pub use conduit_kernel::{CancelHandle, HookAction, HookPoint, KernelHook};

    pub use conduit_registry::PredefinedStage;

    #[cfg(feature = "plugins")]
    pub use conduit_plugins::TracingHook;
}
