//! Handler protocols and the closed set of handler variants.

use crate::context::OutputMap;
use crate::error::StageError;
use crate::invoke::{MergeRequest, StageRequest};
use crate::result::{CapabilityResult, StageResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A pipeline step: access control, retrieval, model call, post-processing.
///
/// Handlers may be invoked more than once for the same request (the
/// invocation boundary retries with at-least-once delivery), so they must
/// be idempotent.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Run the stage against a snapshot of the execution state.
    async fn execute(&self, request: &StageRequest) -> Result<StageResult, StageError>;
}

/// A tool or action. Same contract as [`StageHandler`] with its own result type.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Run the capability against a snapshot of the execution state.
    async fn invoke(&self, request: &StageRequest) -> Result<CapabilityResult, StageError>;
}

/// Reconciles the members of an async group into the next accumulated output.
///
/// The returned map replaces the accumulated output in full. The kernel
/// applies no conflict resolution of its own. Implementations must return
/// the same map for the same request, since executions can be replayed.
#[async_trait]
pub trait MergePolicy: Send + Sync {
    /// Produce the successor accumulated output.
    async fn merge(&self, request: &MergeRequest) -> Result<OutputMap, StageError>;
}

/// Discriminant of [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// [`StageHandler`].
    Stage,
    /// [`CapabilityHandler`].
    Capability,
    /// [`MergePolicy`].
    Merge,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stage => "stage",
            Self::Capability => "capability",
            Self::Merge => "merge",
        })
    }
}

/// Everything a registry can hold.
#[derive(Clone)]
pub enum Handler {
    /// A pipeline stage.
    Stage(Arc<dyn StageHandler>),
    /// A tool/action capability.
    Capability(Arc<dyn CapabilityHandler>),
    /// A merge policy.
    Merge(Arc<dyn MergePolicy>),
}

impl Handler {
    /// Wrap a stage handler.
    pub fn stage(handler: impl StageHandler + 'static) -> Self {
        Self::Stage(Arc::new(handler))
    }

    /// Wrap a capability handler.
    pub fn capability(handler: impl CapabilityHandler + 'static) -> Self {
        Self::Capability(Arc::new(handler))
    }

    /// Wrap a merge policy.
    pub fn merge(policy: impl MergePolicy + 'static) -> Self {
        Self::Merge(Arc::new(policy))
    }

    /// Which variant this is.
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Stage(_) => HandlerKind::Stage,
            Self::Capability(_) => HandlerKind::Capability,
            Self::Merge(_) => HandlerKind::Merge,
        }
    }

    /// Whether this handler can sit in a group definition.
    pub fn runs_as_stage(&self) -> bool {
        matches!(self, Self::Stage(_) | Self::Capability(_))
    }

    /// Run a stage or capability handler. `None` for merge policies.
    pub async fn run_stage(
        &self,
        request: &StageRequest,
    ) -> Option<Result<StageResult, StageError>> {
        match self {
            Self::Stage(h) => Some(h.execute(request).await),
            Self::Capability(h) => Some(h.invoke(request).await.map(StageResult::from)),
            Self::Merge(_) => None,
        }
    }

    /// Run a merge policy. `None` for stage and capability handlers.
    pub async fn run_merge(&self, request: &MergeRequest) -> Option<Result<OutputMap, StageError>> {
        match self {
            Self::Merge(p) => Some(p.merge(request).await),
            _ => None,
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}
