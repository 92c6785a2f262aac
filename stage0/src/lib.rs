//! # stage0 - Protocol types for staged request pipelines
//!
//! This crate defines the data model and the protocol boundaries that the
//! conduit kernel interprets.
//!
//! ## The Model
//!
//! | Piece | Types | What it is |
//! |-------|-------|-----------|
//! | Plan | [`StagePlan`], [`StageGroupSpec`], [`StageDefinition`] | What to run, in which order |
//! | Context | [`ExecutionCommand`], [`ExecutionContext`] | The state of one execution |
//! | Results | [`StageResult`], [`CapabilityResult`], [`AsyncGroupResultEntry`] | What handlers return |
//!
//! ## The Protocols
//!
//! | Protocol | Trait | What it does |
//! |----------|-------|-------------|
//! | Stage | [`StageHandler`] | One pipeline step (access, retrieval, model, ...) |
//! | Capability | [`CapabilityHandler`] | One tool/action call |
//! | Merge | [`MergePolicy`] | Reconcile the members of an async group |
//! | Invocation | [`StageInvoker`] | Carry a request to a handler, with retries |
//!
//! Handlers never see the kernel. They receive a [`StageRequest`] snapshot
//! and return data; the kernel alone decides how that data is folded into
//! the accumulated output.
//!
//! ## Dependency Notes
//!
//! Mappings are `serde_json::Map` built with `preserve_order`, so folding a
//! stage result keeps the position of keys that already existed.

#![deny(missing_docs)]

pub mod context;
pub mod duration;
pub mod error;
pub mod handler;
pub mod id;
pub mod invoke;
pub mod outcome;
pub mod plan;
pub mod result;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use context::{ExecutionCommand, ExecutionContext, OutputMap, PlanRef, Scratch};
pub use duration::DurationMs;
pub use error::{InvokeError, KernelError, RegistryError, StageError, ValidationError};
pub use handler::{CapabilityHandler, Handler, HandlerKind, MergePolicy, StageHandler};
pub use id::{PlanId, RequestId, TenantId};
pub use invoke::{InvocationOptions, MergeRequest, RetryPolicy, StageInvoker, StageRequest};
pub use outcome::{ExecutionOutcome, ExecutionSignal, FailureKind};
pub use plan::{
    CapabilityPlan, DEFAULT_PLUGIN_ID, GroupMode, PlanCatalog, StageDefinition, StageGroupSpec,
    StagePlan,
};
pub use result::{AsyncGroupResultEntry, CapabilityResult, StageFailure, StageResult};
