//! Kernel hooks: observation and intervention around stages and merges.
//!
//! The [`HookRegistry`] dispatches a [`HookContext`] to every registered
//! [`KernelHook`] listening at its point, in registration order. Dispatch
//! stops at the first `Halt`. Hook errors are logged and the pipeline
//! continues.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stage0::{OutputMap, RequestId, TenantId};
use std::sync::Arc;
use thiserror::Error;

/// Where in the plan walk a hook fires.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// Before a stage is invoked.
    BeforeStage,
    /// After a stage returned, successfully or not.
    AfterStage,
    /// Before an async group's merge policy runs.
    BeforeMerge,
    /// After the merge output replaced the accumulated output.
    AfterMerge,
}

/// What a hook sees. Read-only.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    /// Current hook point.
    pub point: HookPoint,
    /// Tenant of the execution.
    pub tenant_id: TenantId,
    /// Request of the execution.
    pub request_id: RequestId,
    /// Zero-based index of the group being run.
    pub group: usize,
    /// Stage name (stage points only).
    pub stage_name: Option<String>,
    /// Merge policy name (merge points only).
    pub merge_policy: Option<String>,
    /// Stage data or merge output (after points, on success).
    pub output: Option<OutputMap>,
    /// Rendered failure (after points, on failure).
    pub error: Option<String>,
}

impl HookContext {
    /// Create a context with only the point and identity set.
    pub fn new(point: HookPoint, tenant_id: TenantId, request_id: RequestId) -> Self {
        Self {
            point,
            tenant_id,
            request_id,
            group: 0,
            stage_name: None,
            merge_policy: None,
            output: None,
            error: None,
        }
    }

    /// Builder-style group index.
    pub fn in_group(mut self, group: usize) -> Self {
        self.group = group;
        self
    }

    /// Builder-style stage name.
    pub fn for_stage(mut self, stage_name: impl Into<String>) -> Self {
        self.stage_name = Some(stage_name.into());
        self
    }

    /// Builder-style merge policy name.
    pub fn for_merge(mut self, merge_policy: impl Into<String>) -> Self {
        self.merge_policy = Some(merge_policy.into());
        self
    }

    /// Builder-style output.
    pub fn with_output(mut self, output: OutputMap) -> Self {
        self.output = Some(output);
        self
    }

    /// Builder-style error.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// What a hook decides.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HookAction {
    /// Carry on.
    Continue,
    /// Abort the execution with [`KernelError::Halted`](stage0::KernelError::Halted).
    Halt {
        /// Reason for halting.
        reason: String,
    },
}

/// Hook failures. Logged, never fatal.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HookError {
    /// The hook could not process the event.
    #[error("hook failed: {0}")]
    Failed(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Observes the kernel at the points it registers for.
///
/// Hooks run inline on the execution path and should return quickly.
#[async_trait]
pub trait KernelHook: Send + Sync {
    /// Points this hook fires at.
    fn points(&self) -> &[HookPoint];

    /// Called at each registered point.
    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError>;
}

/// Ordered pipeline of hooks.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn KernelHook>>,
}

impl HookRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook to the end of the pipeline.
    pub fn add(&mut self, hook: Arc<dyn KernelHook>) {
        self.hooks.push(hook);
    }

    /// Builder-style [`add`](Self::add).
    pub fn with(mut self, hook: Arc<dyn KernelHook>) -> Self {
        self.add(hook);
        self
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hook is registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Dispatch an event. Returns the first non-`Continue` action, else
    /// `Continue`.
    pub async fn dispatch(&self, ctx: &HookContext) -> HookAction {
        for hook in &self.hooks {
            if !hook.points().contains(&ctx.point) {
                continue;
            }
            match hook.on_event(ctx).await {
                Ok(HookAction::Continue) => continue,
                Ok(action) => return action,
                Err(error) => {
                    tracing::warn!(point = ?ctx.point, %error, "conduit.hook.error");
                }
            }
        }
        HookAction::Continue
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
