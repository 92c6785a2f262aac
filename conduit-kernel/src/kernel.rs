//! The plan interpreter.

use crate::cancel::CancelHandle;
use crate::hooks::{HookAction, HookContext, HookPoint, HookRegistry};
use crate::routing::QueueConfig;
use conduit_registry::StageResolver;
use conduit_validator::PlanValidator;
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use stage0::{
    AsyncGroupResultEntry, ExecutionCommand, ExecutionContext, ExecutionOutcome, GroupMode,
    HandlerKind, InvocationOptions, KernelError, OutputMap, PlanCatalog, PlanId, PlanRef,
    Scratch, StageDefinition, StageFailure, StageGroupSpec, StageInvoker, StagePlan, StageRequest,
    StageResult, ValidationError,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Walks a plan group by group and threads the accumulated output.
///
/// - Sequential groups invoke their stages one at a time; each result is
///   folded into the accumulated output before the next stage runs.
/// - Async groups resolve every member, invoke them concurrently against
///   the same snapshot, wait for all of them and hand one entry per member
///   to the group's merge policy. The merge output replaces the
///   accumulated output.
/// - Any fatal error aborts the remaining plan.
///
/// The kernel holds no per-execution state; one instance serves any number
/// of concurrent executions.
pub struct Kernel {
    invoker: Arc<dyn StageInvoker>,
    resolver: Arc<StageResolver>,
    validator: Option<PlanValidator>,
    catalog: Arc<PlanCatalog>,
    hooks: HookRegistry,
    options: InvocationOptions,
    queue: QueueConfig,
}

impl Kernel {
    /// Create a kernel without validation, catalog or hooks.
    pub fn new(invoker: Arc<dyn StageInvoker>, resolver: Arc<StageResolver>) -> Self {
        Self {
            invoker,
            resolver,
            validator: None,
            catalog: Arc::new(PlanCatalog::new()),
            hooks: HookRegistry::new(),
            options: InvocationOptions::default(),
            queue: QueueConfig::default(),
        }
    }

    /// Validate every plan before running it.
    pub fn with_validator(mut self, validator: PlanValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Plans addressable by catalog commands and sub-plan definitions.
    pub fn with_catalog(mut self, catalog: impl Into<Arc<PlanCatalog>>) -> Self {
        self.catalog = catalog.into();
        self
    }

    /// Hooks dispatched around stages and merges.
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Options passed with every invocation.
    pub fn with_options(mut self, options: InvocationOptions) -> Self {
        self.options = options;
        self
    }

    /// Queue routing attached to every request.
    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// The plan catalog.
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    /// Run a command to completion.
    pub async fn execute(&self, command: ExecutionCommand) -> Result<OutputMap, KernelError> {
        self.execute_with(command, &CancelHandle::new()).await
    }

    /// Run a command, aborting when `cancel` fires.
    pub async fn execute_with(
        &self,
        command: ExecutionCommand,
        cancel: &CancelHandle,
    ) -> Result<OutputMap, KernelError> {
        let plan = match &command.plan {
            PlanRef::Inline { plan } => plan,
            PlanRef::Catalog { id } => self.plan(id)?,
        };
        let mut ctx = ExecutionContext::from_command(&command);
        self.execute_in(plan, &mut ctx, cancel).await?;
        Ok(ctx.into_output())
    }

    /// [`execute`](Self::execute), reported as an outcome envelope.
    pub async fn run(&self, command: ExecutionCommand) -> ExecutionOutcome {
        ExecutionOutcome::from(self.execute(command).await)
    }

    /// [`execute_with`](Self::execute_with), reported as an outcome envelope.
    pub async fn run_with(&self, command: ExecutionCommand, cancel: &CancelHandle) -> ExecutionOutcome {
        ExecutionOutcome::from(self.execute_with(command, cancel).await)
    }

    /// Validate and run `plan` against an existing context.
    pub async fn execute_in(
        &self,
        plan: &StagePlan,
        ctx: &mut ExecutionContext,
        cancel: &CancelHandle,
    ) -> Result<(), KernelError> {
        tracing::info!(
            tenant = %ctx.tenant_id,
            request = %ctx.request_id,
            groups = plan.groups.len(),
            "conduit.execution.start"
        );
        if let Some(validator) = self.validator.as_ref().filter(|v| v.is_enabled()) {
            validator.validate(plan, &self.catalog, ctx)?;
        }

        let result = self
            .run_plan(plan, ctx, &mut Vec::new(), cancel.token())
            .await;
        match &result {
            Ok(()) => tracing::info!(
                tenant = %ctx.tenant_id,
                request = %ctx.request_id,
                keys = ctx.accumulated_output.len(),
                "conduit.execution.complete"
            ),
            Err(error) => tracing::warn!(
                tenant = %ctx.tenant_id,
                request = %ctx.request_id,
                %error,
                "conduit.execution.failed"
            ),
        }
        result
    }

    fn run_plan<'a>(
        &'a self,
        plan: &'a StagePlan,
        ctx: &'a mut ExecutionContext,
        active: &'a mut Vec<PlanId>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), KernelError>> {
        async move {
            if let Some(id) = &plan.id {
                if active.contains(id) {
                    return Err(KernelError::Reentrant(id.to_string()));
                }
                active.push(id.clone());
            }

            let mut result = Ok(());
            for (index, group) in plan.groups.iter().enumerate() {
                if cancel.is_cancelled() {
                    result = Err(KernelError::Cancelled);
                    break;
                }
                tracing::debug!(
                    group = index,
                    mode = ?group.mode,
                    members = group.definitions.len(),
                    "conduit.group.start"
                );
                result = match group.mode {
                    GroupMode::Sequential => {
                        self.run_sequential(index, group, ctx, active, cancel).await
                    }
                    GroupMode::Async => self.run_async(index, group, ctx, active, cancel).await,
                };
                if result.is_err() {
                    break;
                }
            }

            if plan.id.is_some() {
                active.pop();
            }
            result
        }
        .boxed()
    }

    async fn run_sequential(
        &self,
        index: usize,
        group: &StageGroupSpec,
        ctx: &mut ExecutionContext,
        active: &mut Vec<PlanId>,
        cancel: &CancellationToken,
    ) -> Result<(), KernelError> {
        for def in &group.definitions {
            if cancel.is_cancelled() {
                return Err(KernelError::Cancelled);
            }
            if let Some(id) = &def.sub_plan {
                tracing::debug!(stage = %def.stage_name, plan = %id, "conduit.subplan.enter");
                let sub = self.plan(id)?;
                self.run_plan(sub, ctx, active, cancel).await?;
                continue;
            }

            self.ensure_stage(def)?;
            ctx.begin_invocation();
            self.fire(|| self.stage_hook(HookPoint::BeforeStage, ctx, index, def))
                .await?;

            let request = self.stage_request(ctx, def);
            let outcome = cancellable(cancel, self.invoker.invoke_stage(request, &self.options)).await?;
            match outcome {
                Ok(result) => {
                    tracing::debug!(
                        stage = %def.stage_name,
                        keys = result.data.len(),
                        "conduit.stage.complete"
                    );
                    ctx.fold(result.data);
                    self.fire(|| {
                        let hook = self.stage_hook(HookPoint::AfterStage, ctx, index, def);
                        match &ctx.current_plugin_output {
                            Some(data) => hook.with_output(data.clone()),
                            None => hook,
                        }
                    })
                    .await?;
                }
                Err(source) => {
                    tracing::warn!(stage = %def.stage_name, error = %source, "conduit.stage.failed");
                    self.fire(|| {
                        self.stage_hook(HookPoint::AfterStage, ctx, index, def)
                            .with_error(source.to_string())
                    })
                    .await?;
                    return Err(KernelError::StageFailed {
                        stage: def.stage_name.clone(),
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    async fn run_async(
        &self,
        index: usize,
        group: &StageGroupSpec,
        ctx: &mut ExecutionContext,
        active: &mut Vec<PlanId>,
        cancel: &CancellationToken,
    ) -> Result<(), KernelError> {
        let policy = group
            .merge_policy
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                KernelError::Validation(ValidationError::MissingMergePolicy { group: index })
            })?;
        for def in &group.definitions {
            match &def.sub_plan {
                Some(id) => {
                    self.plan(id)?;
                    if active.contains(id) {
                        return Err(KernelError::Reentrant(id.to_string()));
                    }
                }
                None => self.ensure_stage(def)?,
            }
        }
        self.ensure_merge(policy)?;

        for def in &group.definitions {
            self.fire(|| self.stage_hook(HookPoint::BeforeStage, ctx, index, def))
                .await?;
        }

        let base: &ExecutionContext = ctx;
        let members = group
            .definitions
            .iter()
            .map(|def| self.run_member(def, base, active.clone(), cancel));
        let joined = cancellable(cancel, join_all(members)).await?;

        // Successful branches publish their scratch writes in definition
        // order; failed ones are dropped.
        let mut entries = Vec::with_capacity(joined.len());
        for member in joined {
            let (entry, scratch) = member?;
            if entry.is_success() {
                scratch.commit();
            }
            entries.push(entry);
        }

        for (def, entry) in group.definitions.iter().zip(&entries) {
            self.fire(|| {
                let hook = self.stage_hook(HookPoint::AfterStage, ctx, index, def);
                match (&entry.result, &entry.error) {
                    (Some(result), _) => hook.with_output(result.data.clone()),
                    (None, Some(error)) => hook.with_error(error.message.clone()),
                    (None, None) => hook,
                }
            })
            .await?;
        }
        let failed = entries.iter().filter(|e| !e.is_success()).count();
        tracing::debug!(
            group = index,
            members = entries.len(),
            failed,
            "conduit.group.joined"
        );

        ctx.begin_invocation();
        self.fire(|| self.merge_hook(HookPoint::BeforeMerge, ctx, index, policy))
            .await?;

        let mut request = ctx.merge_request(policy, entries);
        request.task_queue = Some(self.queue.task_queue(&ctx.tenant_id, policy));
        let outcome = cancellable(cancel, self.invoker.invoke_merge(request, &self.options)).await?;
        let merged = match outcome {
            Ok(merged) => merged,
            Err(source) => {
                tracing::warn!(policy, error = %source, "conduit.merge.failed");
                self.fire(|| {
                    self.merge_hook(HookPoint::AfterMerge, ctx, index, policy)
                        .with_error(source.to_string())
                })
                .await?;
                return Err(KernelError::MergeFailed {
                    policy: policy.to_owned(),
                    source,
                });
            }
        };

        ctx.replace(merged);
        tracing::debug!(policy, keys = ctx.accumulated_output.len(), "conduit.merge.complete");
        self.fire(|| {
            self.merge_hook(HookPoint::AfterMerge, ctx, index, policy)
                .with_output(ctx.accumulated_output.clone())
        })
        .await
    }

    /// Run one async member against its own branch of the group snapshot.
    ///
    /// Stage and merge failures inside the branch become error entries;
    /// anything else (cancellation, halts, re-entry, unknown plans) is
    /// fatal for the whole execution.
    async fn run_member(
        &self,
        def: &StageDefinition,
        base: &ExecutionContext,
        mut active: Vec<PlanId>,
        cancel: &CancellationToken,
    ) -> Result<(AsyncGroupResultEntry, Scratch), KernelError> {
        let mut branch = base.branch();
        let entry = match &def.sub_plan {
            Some(id) => {
                let sub = self.plan(id)?;
                match self.run_plan(sub, &mut branch, &mut active, cancel).await {
                    Ok(()) => AsyncGroupResultEntry::success(
                        def.stage_name.clone(),
                        StageResult::new(def.stage_name.clone(), branch.accumulated_output.clone()),
                    ),
                    Err(error) if error.is_contained_by_branch() => {
                        tracing::debug!(stage = %def.stage_name, %error, "conduit.subplan.failed");
                        AsyncGroupResultEntry::failure(
                            def.stage_name.clone(),
                            StageFailure::new("SubPlanFailed", error.to_string()),
                        )
                    }
                    Err(error) => return Err(error),
                }
            }
            None => {
                let request = self.stage_request(&branch, def);
                match self.invoker.invoke_stage(request, &self.options).await {
                    Ok(result) => AsyncGroupResultEntry::success(def.stage_name.clone(), result),
                    Err(error) => {
                        tracing::debug!(stage = %def.stage_name, %error, "conduit.stage.failed");
                        AsyncGroupResultEntry::failure(def.stage_name.clone(), error.to_failure())
                    }
                }
            }
        };
        Ok((entry, branch.scratch))
    }

    fn plan(&self, id: &PlanId) -> Result<&StagePlan, KernelError> {
        self.catalog
            .get(id)
            .ok_or_else(|| KernelError::UnknownPlan(id.to_string()))
    }

    fn ensure_stage(&self, def: &StageDefinition) -> Result<(), KernelError> {
        match self.resolver.resolve_definition(def) {
            Some(handler) if handler.runs_as_stage() => Ok(()),
            _ => Err(KernelError::Unresolved(def.stage_name.clone())),
        }
    }

    fn ensure_merge(&self, policy: &str) -> Result<(), KernelError> {
        match self.resolver.resolve(policy) {
            Some(handler) if handler.kind() == HandlerKind::Merge => Ok(()),
            _ => Err(KernelError::Unresolved(policy.to_owned())),
        }
    }

    fn stage_request(&self, ctx: &ExecutionContext, def: &StageDefinition) -> StageRequest {
        let mut request = ctx.stage_request(def);
        request.task_queue = Some(self.queue.task_queue(&ctx.tenant_id, &def.stage_name));
        request
    }

    fn stage_hook(
        &self,
        point: HookPoint,
        ctx: &ExecutionContext,
        group: usize,
        def: &StageDefinition,
    ) -> HookContext {
        HookContext::new(point, ctx.tenant_id.clone(), ctx.request_id.clone())
            .in_group(group)
            .for_stage(def.stage_name.clone())
    }

    fn merge_hook(
        &self,
        point: HookPoint,
        ctx: &ExecutionContext,
        group: usize,
        policy: &str,
    ) -> HookContext {
        HookContext::new(point, ctx.tenant_id.clone(), ctx.request_id.clone())
            .in_group(group)
            .for_merge(policy)
    }

    /// Dispatch a hook event. The context is only built when a hook is
    /// registered.
    async fn fire(&self, build: impl FnOnce() -> HookContext) -> Result<(), KernelError> {
        if self.hooks.is_empty() {
            return Ok(());
        }
        let event = build();
        match self.hooks.dispatch(&event).await {
            HookAction::Halt { reason } => {
                tracing::info!(point = ?event.point, %reason, "conduit.execution.halted");
                Err(KernelError::Halted(reason))
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("validator", &self.validator)
            .field("catalog", &self.catalog.len())
            .field("hooks", &self.hooks)
            .field("options", &self.options)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, KernelError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(KernelError::Cancelled),
        out = fut => Ok(out),
    }
}
