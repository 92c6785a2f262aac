//! Wiring configuration and handlers into a ready [`Kernel`].

use crate::config::ConduitConfig;
use conduit_kernel::{CancelHandle, HookRegistry, Kernel, KernelHook, LocalInvoker};
use conduit_registry::{
    ActivityRegistryBuilder, CustomBucketBuilder, PredefinedBucket, PredefinedBucketBuilder,
    PredefinedStage, StageResolver,
};
use conduit_validator::PlanValidator;
use stage0::{
    ExecutionCommand, ExecutionOutcome, Handler, KernelError, OutputMap, PlanCatalog,
    RegistryError, StageInvoker, StagePlan,
};
use std::sync::Arc;

/// A configured kernel together with the resolver it runs against.
///
/// ```no_run
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use conduit::{ConduitConfig, Runtime};
///
/// let runtime = Runtime::builder(ConduitConfig::default())
///     .with_default_plugins()?
///     .build();
/// # let _ = runtime;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Runtime {
    kernel: Kernel,
    resolver: Arc<StageResolver>,
    config: ConduitConfig,
}

impl Runtime {
    /// Start building a runtime.
    pub fn builder(config: ConduitConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    /// The kernel.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// The resolver shared by the kernel, validator and invoker.
    pub fn resolver(&self) -> &Arc<StageResolver> {
        &self.resolver
    }

    /// The configuration the runtime was built from.
    pub fn config(&self) -> &ConduitConfig {
        &self.config
    }

    /// See [`Kernel::execute`].
    pub async fn execute(&self, command: ExecutionCommand) -> Result<OutputMap, KernelError> {
        self.kernel.execute(command).await
    }

    /// See [`Kernel::run_with`].
    pub async fn run(&self, command: ExecutionCommand, cancel: &CancelHandle) -> ExecutionOutcome {
        self.kernel.run_with(command, cancel).await
    }
}

/// Collects handlers, plans and hooks for a [`Runtime`].
///
/// Registration fails fast on duplicate names, so a misconfigured
/// deployment never reaches its first request.
pub struct RuntimeBuilder {
    config: ConduitConfig,
    predefined: PredefinedBucketBuilder,
    activities: ActivityRegistryBuilder,
    custom: CustomBucketBuilder,
    catalog: PlanCatalog,
    hooks: HookRegistry,
    invoker: Option<Arc<dyn StageInvoker>>,
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config", &self.config)
            .field("catalog", &self.catalog.len())
            .field("hooks", &self.hooks.len())
            .field("custom_invoker", &self.invoker.is_some())
            .finish_non_exhaustive()
    }
}

impl RuntimeBuilder {
    fn new(config: ConduitConfig) -> Self {
        Self {
            config,
            predefined: PredefinedBucket::builder(),
            activities: ActivityRegistryBuilder::default(),
            custom: CustomBucketBuilder::default(),
            catalog: PlanCatalog::new(),
            hooks: HookRegistry::new(),
            invoker: None,
        }
    }

    /// Register a variant of a predefined stage.
    pub fn predefined(
        mut self,
        stage: PredefinedStage,
        plugin_id: impl Into<String>,
        handler: Handler,
    ) -> Result<Self, RegistryError> {
        self.predefined = self.predefined.register(stage, plugin_id, handler)?;
        Ok(self)
    }

    /// Register an activity, usually a merge policy.
    pub fn activity(mut self, name: impl Into<String>, handler: Handler) -> Result<Self, RegistryError> {
        self.activities = self.activities.register(name, handler)?;
        Ok(self)
    }

    /// Register a custom stage or capability.
    pub fn custom(mut self, name: impl Into<String>, handler: Handler) -> Result<Self, RegistryError> {
        self.custom = self.custom.register(name, handler)?;
        Ok(self)
    }

    /// Add a named plan to the catalog.
    pub fn plan(mut self, plan: StagePlan) -> Result<Self, RegistryError> {
        self.catalog.insert(plan)?;
        Ok(self)
    }

    /// Add a hook. Hooks run in the order added.
    pub fn hook(mut self, hook: Arc<dyn KernelHook>) -> Self {
        self.hooks.add(hook);
        self
    }

    /// Route invocations through a custom boundary instead of the
    /// in-process [`LocalInvoker`].
    pub fn invoker(mut self, invoker: Arc<dyn StageInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Register the reference plugins from `conduit-plugins`.
    #[cfg(feature = "plugins")]
    pub fn with_default_plugins(mut self) -> Result<Self, RegistryError> {
        let plugins = conduit_plugins::register_defaults(conduit_plugins::DefaultPlugins {
            predefined: self.predefined,
            activities: self.activities,
            custom: self.custom,
        })?;
        self.predefined = plugins.predefined;
        self.activities = plugins.activities;
        self.custom = plugins.custom;
        Ok(self)
    }

    /// Freeze the registries and wire the kernel.
    pub fn build(self) -> Runtime {
        let resolver = Arc::new(
            StageResolver::new(
                self.predefined.build(),
                self.activities.build(),
                self.custom.build(),
            )
            .with_config(self.config.resolver.clone()),
        );
        let invoker: Arc<dyn StageInvoker> = match self.invoker {
            Some(invoker) => invoker,
            None => {
                let local = LocalInvoker::new(Arc::clone(&resolver));
                match self.config.concurrency_limit {
                    Some(permits) => Arc::new(local.with_concurrency_limit(permits)),
                    None => Arc::new(local),
                }
            }
        };
        let validator = PlanValidator::new(self.config.validator.clone(), Arc::clone(&resolver));
        let kernel = Kernel::new(invoker, Arc::clone(&resolver))
            .with_validator(validator)
            .with_catalog(self.catalog)
            .with_hooks(self.hooks)
            .with_options(self.config.invocation.clone())
            .with_queue(self.config.queue.clone());
        tracing::info!(
            predefined = resolver.predefined().len(),
            activities = resolver.activities().len(),
            custom = resolver.custom().len(),
            "conduit.runtime.ready"
        );
        Runtime {
            kernel,
            resolver,
            config: self.config,
        }
    }
}
