//! Concrete [`KernelHook`] using the [`tracing`] crate.
//!
//! Emits one structured event per hook point. Wire to any
//! `tracing`-compatible subscriber.

use async_trait::async_trait;
use conduit_kernel::{HookAction, HookContext, HookError, HookPoint, KernelHook};

/// A [`KernelHook`] that emits structured [`tracing`] events.
///
/// Always returns [`HookAction::Continue`]: observes but never controls.
///
/// | Point | Level |
/// |-------|-------|
/// | BeforeStage, BeforeMerge | `DEBUG` |
/// | AfterStage, AfterMerge | `INFO`, `WARN` on failure |
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl TracingHook {
    /// Create a new `TracingHook`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

const POINTS: &[HookPoint] = &[
    HookPoint::BeforeStage,
    HookPoint::AfterStage,
    HookPoint::BeforeMerge,
    HookPoint::AfterMerge,
];

#[async_trait]
impl KernelHook for TracingHook {
    fn points(&self) -> &[HookPoint] {
        POINTS
    }

    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError> {
        let stage = ctx.stage_name.as_deref().unwrap_or_default();
        let policy = ctx.merge_policy.as_deref().unwrap_or_default();
        let keys = ctx.output.as_ref().map_or(0, |o| o.len());
        match (ctx.point, &ctx.error) {
            (HookPoint::BeforeStage, _) => {
                tracing::debug!(tenant = %ctx.tenant_id, group = ctx.group, stage, "conduit.hook.before_stage");
            }
            (HookPoint::AfterStage, None) => {
                tracing::info!(tenant = %ctx.tenant_id, group = ctx.group, stage, keys, "conduit.hook.after_stage");
            }
            (HookPoint::AfterStage, Some(error)) => {
                tracing::warn!(tenant = %ctx.tenant_id, group = ctx.group, stage, error = %error, "conduit.hook.stage_failed");
            }
            (HookPoint::BeforeMerge, _) => {
                tracing::debug!(tenant = %ctx.tenant_id, group = ctx.group, policy, "conduit.hook.before_merge");
            }
            (HookPoint::AfterMerge, None) => {
                tracing::info!(tenant = %ctx.tenant_id, group = ctx.group, policy, keys, "conduit.hook.after_merge");
            }
            (HookPoint::AfterMerge, Some(error)) => {
                tracing::warn!(tenant = %ctx.tenant_id, group = ctx.group, policy, error = %error, "conduit.hook.merge_failed");
            }
            _ => {}
        }
        Ok(HookAction::Continue)
    }
}
