//! The plan validator.

use crate::config::ValidatorConfig;
use conduit_registry::StageResolver;
use stage0::{
    ExecutionContext, GroupMode, HandlerKind, PlanCatalog, PlanId, StagePlan, ValidationError,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Label used on cycle paths for a root plan that carries no id.
const INLINE_PLAN: &str = "<inline>";

/// Checks a plan before any handler runs.
///
/// Checks run in this order and the first failure wins:
///
/// 1. group structure (merge policy present exactly on async groups)
/// 2. sub-plan references: unknown ids and cycles
/// 3. the effective allowlist
/// 4. the depth bound
/// 5. resolvability of every stage and merge policy name
///
/// Every check covers the root plan and every catalog plan it reaches.
#[derive(Debug, Clone)]
pub struct PlanValidator {
    config: ValidatorConfig,
    resolver: Arc<StageResolver>,
}

impl PlanValidator {
    /// Create a validator resolving names through `resolver`.
    pub fn new(config: ValidatorConfig, resolver: Arc<StageResolver>) -> Self {
        Self { config, resolver }
    }

    /// The active policy.
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Whether validation runs at all.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Validate `plan` for the tenant of `ctx`.
    pub fn validate(
        &self,
        plan: &StagePlan,
        catalog: &PlanCatalog,
        ctx: &ExecutionContext,
    ) -> Result<(), ValidationError> {
        let result = self.check(plan, catalog, ctx);
        if let Err(error) = &result {
            tracing::warn!(
                tenant = %ctx.tenant_id,
                request = %ctx.request_id,
                plan = plan.id.as_ref().map_or(INLINE_PLAN, PlanId::as_str),
                %error,
                "conduit.plan.rejected"
            );
        }
        result
    }

    fn check(
        &self,
        plan: &StagePlan,
        catalog: &PlanCatalog,
        ctx: &ExecutionContext,
    ) -> Result<(), ValidationError> {
        let reachable = reachable_plans(plan, catalog)?;
        for p in &reachable {
            p.check_structure()?;
        }

        let allowed = self.config.allowlist_for(&ctx.tenant_id);
        if !allowed.is_empty() {
            for def in reachable.iter().flat_map(|p| p.definitions()) {
                if !allowed.contains(&def.stage_name) {
                    return Err(ValidationError::UnauthorizedStage(def.stage_name.clone()));
                }
            }
        }

        let max = self.config.effective_max_depth();
        let depth = plan_depth(plan, catalog, &mut HashMap::new());
        if depth > max {
            return Err(ValidationError::DepthExceeded { depth, max });
        }

        for p in &reachable {
            self.check_resolvable(p)?;
        }
        Ok(())
    }

    fn check_resolvable(&self, plan: &StagePlan) -> Result<(), ValidationError> {
        for group in &plan.groups {
            for def in group.definitions.iter().filter(|d| d.sub_plan.is_none()) {
                let runs = self
                    .resolver
                    .resolve_definition(def)
                    .is_some_and(|h| h.runs_as_stage());
                if !runs {
                    return Err(ValidationError::UnresolvedStage(def.stage_name.clone()));
                }
            }
            if group.mode == GroupMode::Async {
                let policy = group.merge_policy.as_deref().unwrap_or_default();
                let is_merge = self
                    .resolver
                    .resolve(policy)
                    .is_some_and(|h| h.kind() == HandlerKind::Merge);
                if !is_merge {
                    return Err(ValidationError::UnresolvedMergePolicy(policy.to_owned()));
                }
            }
        }
        Ok(())
    }
}

/// The root plan followed by every catalog plan reachable from it, each
/// listed once. Fails on unknown ids and on reference cycles.
fn reachable_plans<'a>(
    root: &'a StagePlan,
    catalog: &'a PlanCatalog,
) -> Result<Vec<&'a StagePlan>, ValidationError> {
    let mut out = Vec::new();
    let mut done = HashSet::new();
    let mut path = Vec::new();
    visit(root, catalog, &mut path, &mut done, &mut out)?;
    Ok(out)
}

fn visit<'a>(
    plan: &'a StagePlan,
    catalog: &'a PlanCatalog,
    path: &mut Vec<String>,
    done: &mut HashSet<&'a PlanId>,
    out: &mut Vec<&'a StagePlan>,
) -> Result<(), ValidationError> {
    path.push(
        plan.id
            .as_ref()
            .map_or_else(|| INLINE_PLAN.to_owned(), ToString::to_string),
    );
    out.push(plan);

    for id in plan.definitions().filter_map(|d| d.sub_plan.as_ref()) {
        if let Some(start) = path.iter().position(|p| p == id.as_str()) {
            let mut cycle = path[start..].to_vec();
            cycle.push(id.to_string());
            return Err(ValidationError::CycleDetected { path: cycle });
        }
        let sub = catalog
            .get(id)
            .ok_or_else(|| ValidationError::UnknownSubPlan(id.to_string()))?;
        if done.contains(id) {
            continue;
        }
        visit(sub, catalog, path, done, out)?;
    }

    if let Some(id) = &plan.id {
        done.insert(id);
    }
    path.pop();
    Ok(())
}

/// Number of groups plus the deepest nested plan. Only called once the
/// reference graph is known to be acyclic.
fn plan_depth(plan: &StagePlan, catalog: &PlanCatalog, memo: &mut HashMap<PlanId, usize>) -> usize {
    let mut nested = 0;
    for id in plan.definitions().filter_map(|d| d.sub_plan.as_ref()) {
        let depth = match memo.get(id) {
            Some(depth) => *depth,
            None => {
                let depth = catalog
                    .get(id)
                    .map_or(0, |sub| plan_depth(sub, catalog, memo));
                memo.insert(id.clone(), depth);
                depth
            }
        };
        nested = nested.max(depth);
    }
    plan.groups.len() + nested
}
