//! Execution command and the per-execution mutable context.

use crate::id::{PlanId, RequestId, TenantId};
use crate::invoke::{MergeRequest, StageRequest};
use crate::plan::{StageDefinition, StagePlan};
use crate::result::AsyncGroupResultEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// String-keyed mapping threaded through a pipeline. Key order is the
/// insertion order.
pub type OutputMap = serde_json::Map<String, serde_json::Value>;

/// Which plan a command runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanRef {
    /// The plan travels with the command.
    Inline {
        /// The plan to run.
        plan: StagePlan,
    },
    /// The plan is looked up in the kernel's catalog.
    Catalog {
        /// Catalog id.
        id: PlanId,
    },
}

/// Immutable request envelope for one execution.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCommand {
    /// Tenant the request belongs to.
    pub tenant_id: TenantId,
    /// Request identifier.
    pub request_id: RequestId,
    /// The caller's input. Never modified by the kernel.
    #[serde(default)]
    pub original_input: OutputMap,
    /// Accumulated output to start from. Empty for fresh requests.
    #[serde(default, skip_serializing_if = "OutputMap::is_empty")]
    pub initial_output: OutputMap,
    /// The plan to run.
    pub plan: PlanRef,
}

impl ExecutionCommand {
    /// Command that runs an inline plan.
    pub fn inline(
        tenant_id: impl Into<TenantId>,
        request_id: impl Into<RequestId>,
        original_input: OutputMap,
        plan: StagePlan,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            request_id: request_id.into(),
            original_input,
            initial_output: OutputMap::new(),
            plan: PlanRef::Inline { plan },
        }
    }

    /// Command that runs a catalog plan.
    pub fn catalog(
        tenant_id: impl Into<TenantId>,
        request_id: impl Into<RequestId>,
        original_input: OutputMap,
        plan: impl Into<PlanId>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            request_id: request_id.into(),
            original_input,
            initial_output: OutputMap::new(),
            plan: PlanRef::Catalog { id: plan.into() },
        }
    }
}

/// Keyed side-channel store scoped to one execution.
///
/// Clones share storage, so a value put by one stage is visible to later
/// stages of the same execution. It is never serialized and never part of
/// the accumulated output.
///
/// [`Scratch::layer`] opens a private overlay for an async branch: reads
/// fall through to the parent, writes and removals stay in the layer until
/// [`Scratch::commit`] applies them to the parent.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    // `None` marks a key removed in this layer.
    entries: Arc<RwLock<HashMap<String, Option<serde_json::Value>>>>,
    parent: Option<Box<Scratch>>,
}

impl Scratch {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an overlay whose writes are invisible to this store and its
    /// other layers until committed.
    pub fn layer(&self) -> Self {
        Self {
            entries: Arc::default(),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        // A poisoned lock only means a writer panicked; the map is still usable.
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(slot) => slot.clone(),
            None => self.parent.as_ref().and_then(|p| p.get(key)),
        }
    }

    /// Store a value, returning the previous one.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) -> Option<serde_json::Value> {
        let key = key.into();
        let previous = self.get(&key);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, Some(value));
        previous
    }

    /// Remove a value.
    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        let previous = self.get(key);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if self.parent.is_some() {
            entries.insert(key.to_owned(), None);
        } else {
            entries.remove(key);
        }
        previous
    }

    /// Apply this layer's writes and removals to its parent. A no-op on a
    /// root store.
    pub fn commit(&self) {
        let Some(parent) = &self.parent else {
            return;
        };
        let drained: Vec<_> = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.drain().collect()
        };
        for (key, slot) in drained {
            match slot {
                Some(value) => {
                    parent.put(key, value);
                }
                None => {
                    parent.remove(&key);
                }
            }
        }
    }
}

/// Mutable state of one execution, owned by the kernel for its lifetime.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Tenant, used to derive tenant-scoped policy.
    pub tenant_id: TenantId,
    /// Request identifier.
    pub request_id: RequestId,
    /// Read-only snapshot of the caller's input.
    pub original_input: Arc<OutputMap>,
    /// State threaded across stages. Last writer of a key wins.
    pub accumulated_output: OutputMap,
    /// Raw data of the most recently executed sequential stage.
    #[serde(default)]
    pub current_plugin_output: Option<OutputMap>,
    /// Side-channel store for this execution.
    #[serde(skip)]
    pub scratch: Scratch,
}

impl ExecutionContext {
    /// Create a context with an empty accumulated output.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        request_id: impl Into<RequestId>,
        original_input: OutputMap,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            request_id: request_id.into(),
            original_input: Arc::new(original_input),
            accumulated_output: OutputMap::new(),
            current_plugin_output: None,
            scratch: Scratch::new(),
        }
    }

    /// Create the context for a command.
    pub fn from_command(command: &ExecutionCommand) -> Self {
        let mut ctx = Self::new(
            command.tenant_id.clone(),
            command.request_id.clone(),
            command.original_input.clone(),
        );
        ctx.accumulated_output = command.initial_output.clone();
        ctx
    }

    /// Start from a non-empty accumulated output.
    pub fn with_accumulated(mut self, accumulated_output: OutputMap) -> Self {
        self.accumulated_output = accumulated_output;
        self
    }

    /// Build the request for one invocation against the current state.
    pub fn stage_request(&self, definition: &StageDefinition) -> StageRequest {
        StageRequest {
            tenant_id: self.tenant_id.clone(),
            request_id: self.request_id.clone(),
            stage_name: definition.stage_name.clone(),
            plugin_id: definition.plugin_id.clone(),
            config_overrides: definition.config_overrides.clone(),
            original_input: Arc::clone(&self.original_input),
            accumulated_output: self.accumulated_output.clone(),
            task_queue: None,
            scratch: self.scratch.clone(),
        }
    }

    /// Build the merge request for an async group. `accumulated_output` is
    /// the state the group started from.
    pub fn merge_request(
        &self,
        merge_policy: impl Into<String>,
        entries: Vec<AsyncGroupResultEntry>,
    ) -> MergeRequest {
        MergeRequest {
            tenant_id: self.tenant_id.clone(),
            request_id: self.request_id.clone(),
            merge_policy: merge_policy.into(),
            original_input: Arc::clone(&self.original_input),
            accumulated_output: self.accumulated_output.clone(),
            entries,
            task_queue: None,
        }
    }

    /// Clear the transient output before an invocation.
    pub fn begin_invocation(&mut self) {
        self.current_plugin_output = None;
    }

    /// Fold one stage's data into the accumulated output. Existing keys
    /// keep their position and take the new value; new keys are appended.
    pub fn fold(&mut self, data: OutputMap) {
        for (key, value) in &data {
            self.accumulated_output.insert(key.clone(), value.clone());
        }
        self.current_plugin_output = Some(data);
    }

    /// Replace the accumulated output wholesale (merge results, nested plans).
    pub fn replace(&mut self, accumulated_output: OutputMap) {
        self.accumulated_output = accumulated_output;
    }

    /// A context for an isolated branch: same input and identity, its own
    /// copy of the accumulated output and its own scratch layer. Scratch
    /// writes reach this context only through `branch.scratch.commit()`.
    pub fn branch(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            request_id: self.request_id.clone(),
            original_input: Arc::clone(&self.original_input),
            accumulated_output: self.accumulated_output.clone(),
            current_plugin_output: None,
            scratch: self.scratch.layer(),
        }
    }

    /// Consume the context, yielding the final accumulated output.
    pub fn into_output(self) -> OutputMap {
        self.accumulated_output
    }
}
