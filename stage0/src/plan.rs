//! The plan data model: what a pipeline runs and in which order.

use crate::context::OutputMap;
use crate::error::{RegistryError, ValidationError};
use crate::id::PlanId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Plugin id used when neither the definition nor configuration picks one.
pub const DEFAULT_PLUGIN_ID: &str = "default";

/// How the definitions of one group are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupMode {
    /// One after another; each stage sees the writes of the previous one.
    Sequential,
    /// All at once against the same snapshot, reconciled by a merge policy.
    Async,
}

/// One stage reference inside a group.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Name resolved through the stage resolver.
    pub stage_name: String,

    /// Variant selector for predefined stages. `None` lets configuration
    /// decide, falling back to [`DEFAULT_PLUGIN_ID`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,

    /// Per-invocation settings handed to the handler untouched.
    #[serde(default, skip_serializing_if = "OutputMap::is_empty")]
    pub config_overrides: OutputMap,

    /// When set, this definition runs the referenced catalog plan instead of
    /// a single handler. `stage_name` is then only a label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_plan: Option<PlanId>,
}

impl StageDefinition {
    /// Create a definition that resolves `stage_name` with default settings.
    pub fn new(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            plugin_id: None,
            config_overrides: OutputMap::new(),
            sub_plan: None,
        }
    }

    /// Create a definition that runs a nested catalog plan.
    pub fn nested(stage_name: impl Into<String>, plan: impl Into<PlanId>) -> Self {
        let mut def = Self::new(stage_name);
        def.sub_plan = Some(plan.into());
        def
    }

    /// Select a plugin variant.
    pub fn with_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    /// Add one configuration override.
    pub fn with_override(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config_overrides.insert(key.into(), value);
        self
    }
}

/// A group of definitions sharing one scheduling mode.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageGroupSpec {
    /// Scheduling mode.
    pub mode: GroupMode,
    /// Definitions in declaration order.
    #[serde(default)]
    pub definitions: Vec<StageDefinition>,
    /// Merge policy name. Required for [`GroupMode::Async`], forbidden otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_policy: Option<String>,
}

impl StageGroupSpec {
    /// A sequential group.
    pub fn sequential(definitions: Vec<StageDefinition>) -> Self {
        Self {
            mode: GroupMode::Sequential,
            definitions,
            merge_policy: None,
        }
    }

    /// An async group reconciled by `merge_policy`.
    pub fn concurrent(definitions: Vec<StageDefinition>, merge_policy: impl Into<String>) -> Self {
        Self {
            mode: GroupMode::Async,
            definitions,
            merge_policy: Some(merge_policy.into()),
        }
    }
}

/// An ordered list of stage groups.
///
/// Groups always run in declaration order. A plan with no groups is valid
/// and leaves the accumulated output untouched.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    /// Catalog id. Only plans stored in a [`PlanCatalog`] need one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PlanId>,
    /// Groups in execution order.
    #[serde(default)]
    pub groups: Vec<StageGroupSpec>,
}

/// Capability-oriented flows use the same plan shape as stage pipelines.
pub type CapabilityPlan = StagePlan;

impl StagePlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the plan a catalog id.
    pub fn with_id(mut self, id: impl Into<PlanId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a sequential group.
    pub fn sequential(mut self, definitions: Vec<StageDefinition>) -> Self {
        self.groups.push(StageGroupSpec::sequential(definitions));
        self
    }

    /// Append an async group.
    pub fn concurrent(
        mut self,
        definitions: Vec<StageDefinition>,
        merge_policy: impl Into<String>,
    ) -> Self {
        self.groups
            .push(StageGroupSpec::concurrent(definitions, merge_policy));
        self
    }

    /// Every definition of every group, in plan order.
    pub fn definitions(&self) -> impl Iterator<Item = &StageDefinition> {
        self.groups.iter().flat_map(|g| g.definitions.iter())
    }

    /// Check the shape rules that hold independent of any registry:
    /// async groups name a merge policy, sequential groups do not.
    pub fn check_structure(&self) -> Result<(), ValidationError> {
        for (index, group) in self.groups.iter().enumerate() {
            match (group.mode, group.merge_policy.as_deref()) {
                (GroupMode::Async, None) => {
                    return Err(ValidationError::MissingMergePolicy { group: index });
                }
                (GroupMode::Async, Some(p)) if p.trim().is_empty() => {
                    return Err(ValidationError::MissingMergePolicy { group: index });
                }
                (GroupMode::Sequential, Some(policy)) => {
                    return Err(ValidationError::UnexpectedMergePolicy {
                        group: index,
                        policy: policy.to_owned(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Plans addressable by id, used for commands that reference a plan and
/// for nested sub-plans.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, StagePlan>,
}

impl PlanCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a plan under its id. Plans without an id and second plans for
    /// the same id are rejected.
    pub fn insert(&mut self, plan: StagePlan) -> Result<(), RegistryError> {
        let id = plan.id.clone().ok_or(RegistryError::MissingPlanId)?;
        if self.plans.contains_key(&id) {
            return Err(RegistryError::Duplicate {
                bucket: "plan catalog",
                name: id.to_string(),
            });
        }
        self.plans.insert(id, plan);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_plan(mut self, plan: StagePlan) -> Result<Self, RegistryError> {
        self.insert(plan)?;
        Ok(self)
    }

    /// Look up a plan.
    pub fn get(&self, id: &PlanId) -> Option<&StagePlan> {
        self.plans.get(id)
    }

    /// Number of stored plans.
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
