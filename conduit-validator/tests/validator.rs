use conduit_registry::{ActivityRegistry, CustomBucket, PredefinedBucket, PredefinedStage, StageResolver};
use conduit_validator::{PlanValidator, ValidatorConfig};
use serde_json::json;
use stage0::test_utils::{FoldMerge, StaticCapability, StaticStage, output_map};
use stage0::{ExecutionContext, Handler, OutputMap, PlanCatalog, StageDefinition, StagePlan, ValidationError};
use std::sync::Arc;

fn resolver() -> Arc<StageResolver> {
    let stage = || Handler::stage(StaticStage::new(OutputMap::new()));
    let predefined = PredefinedBucket::builder()
        .register(PredefinedStage::Access, "default", stage())
        .unwrap()
        .register(PredefinedStage::Model, "default", stage())
        .unwrap()
        .build();
    let activities = ActivityRegistry::builder()
        .register("FirstSuccess", Handler::merge(FoldMerge::new()))
        .unwrap()
        .build();
    let custom = CustomBucket::builder()
        .register("ToolA", Handler::capability(StaticCapability::new(output_map(json!({"a": 1})))))
        .unwrap()
        .register("ToolB", Handler::capability(StaticCapability::new(output_map(json!({"b": 1})))))
        .unwrap()
        .register("Reranker", Handler::merge(FoldMerge::new()))
        .unwrap()
        .build();
    Arc::new(StageResolver::new(predefined, activities, custom))
}

fn validator(config: ValidatorConfig) -> PlanValidator {
    PlanValidator::new(config, resolver())
}

fn ctx(tenant: &str) -> ExecutionContext {
    ExecutionContext::new(tenant, "req-1", OutputMap::new())
}

fn defs(names: &[&str]) -> Vec<StageDefinition> {
    names.iter().map(|n| StageDefinition::new(*n)).collect()
}

fn tool_plan() -> StagePlan {
    StagePlan::new()
        .sequential(defs(&["ACCESS", "MODEL"]))
        .concurrent(defs(&["ToolA", "ToolB"]), "FirstSuccess")
}

#[test]
fn accepts_a_well_formed_plan() {
    let v = validator(ValidatorConfig::default());
    assert_eq!(v.validate(&tool_plan(), &PlanCatalog::new(), &ctx("t")), Ok(()));
}

#[test]
fn empty_plan_is_valid() {
    let v = validator(ValidatorConfig::default());
    assert_eq!(v.validate(&StagePlan::new(), &PlanCatalog::new(), &ctx("t")), Ok(()));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Allowlists
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn global_allowlist_rejects_unlisted_stage() {
    let v = validator(ValidatorConfig::default().with_allowed(["ACCESS", "MODEL", "ToolA"]));
    let err = v
        .validate(&tool_plan(), &PlanCatalog::new(), &ctx("t"))
        .unwrap_err();
    assert_eq!(err, ValidationError::UnauthorizedStage("ToolB".into()));
    assert_eq!(err.to_string(), "unauthorized stage in plan: `ToolB`");
}

#[test]
fn empty_allowlist_allows_everything() {
    let v = validator(ValidatorConfig::default().with_allowed(Vec::<String>::new()));
    assert!(v.validate(&tool_plan(), &PlanCatalog::new(), &ctx("t")).is_ok());
}

#[test]
fn tenant_allowlist_replaces_global_list() {
    let config = ValidatorConfig::default()
        .with_allowed(["ACCESS", "MODEL", "ToolA", "ToolB"])
        .with_tenant_allowed("restricted", ["ACCESS", "MODEL"]);
    let v = validator(config);

    assert!(v.validate(&tool_plan(), &PlanCatalog::new(), &ctx("open")).is_ok());
    assert_eq!(
        v.validate(&tool_plan(), &PlanCatalog::new(), &ctx("restricted")),
        Err(ValidationError::UnauthorizedStage("ToolA".into()))
    );
}

#[test]
fn allowlist_covers_nested_plans() {
    let catalog = PlanCatalog::new()
        .with_plan(StagePlan::new().with_id("inner").sequential(defs(&["ToolA"])))
        .unwrap();
    let plan = StagePlan::new().sequential(vec![StageDefinition::nested("inner-step", "inner")]);
    let v = validator(ValidatorConfig::default().with_allowed(["inner-step"]));
    assert_eq!(
        v.validate(&plan, &catalog, &ctx("t")),
        Err(ValidationError::UnauthorizedStage("ToolA".into()))
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Depth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn deep_plan(groups: usize) -> StagePlan {
    (0..groups).fold(StagePlan::new(), |plan, _| plan.sequential(defs(&["ACCESS"])))
}

#[test]
fn depth_at_the_bound_passes() {
    let v = validator(ValidatorConfig::default().with_max_plan_depth(3));
    assert!(v.validate(&deep_plan(3), &PlanCatalog::new(), &ctx("t")).is_ok());
}

#[test]
fn depth_one_past_the_bound_fails() {
    let v = validator(ValidatorConfig::default().with_max_plan_depth(3));
    assert_eq!(
        v.validate(&deep_plan(4), &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::DepthExceeded { depth: 4, max: 3 })
    );
}

#[test]
fn zero_max_depth_is_clamped_to_one() {
    let v = validator(ValidatorConfig::default().with_max_plan_depth(0));
    assert!(v.validate(&deep_plan(1), &PlanCatalog::new(), &ctx("t")).is_ok());
    assert_eq!(
        v.validate(&deep_plan(2), &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::DepthExceeded { depth: 2, max: 1 })
    );
}

#[test]
fn nested_plans_add_to_depth() {
    let catalog = PlanCatalog::new()
        .with_plan(StagePlan::new().with_id("leaf").sequential(defs(&["MODEL"])).sequential(defs(&["MODEL"])))
        .unwrap()
        .with_plan(
            StagePlan::new()
                .with_id("mid")
                .sequential(vec![StageDefinition::nested("leaf-step", "leaf")]),
        )
        .unwrap();
    // root(1) + mid(1) + leaf(2)
    let plan = StagePlan::new().sequential(vec![StageDefinition::nested("mid-step", "mid")]);
    let v = validator(ValidatorConfig::default().with_max_plan_depth(3));
    assert_eq!(
        v.validate(&plan, &catalog, &ctx("t")),
        Err(ValidationError::DepthExceeded { depth: 4, max: 3 })
    );
    let v = validator(ValidatorConfig::default().with_max_plan_depth(4));
    assert!(v.validate(&plan, &catalog, &ctx("t")).is_ok());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sub-plan references
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn detects_reference_cycles() {
    let catalog = PlanCatalog::new()
        .with_plan(StagePlan::new().with_id("a").sequential(vec![StageDefinition::nested("to-b", "b")]))
        .unwrap()
        .with_plan(StagePlan::new().with_id("b").sequential(vec![StageDefinition::nested("to-a", "a")]))
        .unwrap();
    let plan = catalog.get(&"a".into()).unwrap().clone();
    let v = validator(ValidatorConfig::default());
    let err = v.validate(&plan, &catalog, &ctx("t")).unwrap_err();
    assert_eq!(
        err,
        ValidationError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()]
        }
    );
    assert_eq!(err.to_string(), "plan cycle detected: a -> b -> a");
}

#[test]
fn detects_self_reference() {
    let catalog = PlanCatalog::new()
        .with_plan(StagePlan::new().with_id("loop").sequential(vec![StageDefinition::nested("again", "loop")]))
        .unwrap();
    let plan = StagePlan::new().sequential(vec![StageDefinition::nested("enter", "loop")]);
    let v = validator(ValidatorConfig::default());
    assert_eq!(
        v.validate(&plan, &catalog, &ctx("t")),
        Err(ValidationError::CycleDetected {
            path: vec!["loop".into(), "loop".into()]
        })
    );
}

#[test]
fn diamond_references_are_not_cycles() {
    let catalog = PlanCatalog::new()
        .with_plan(StagePlan::new().with_id("shared").sequential(defs(&["MODEL"])))
        .unwrap();
    let plan = StagePlan::new()
        .sequential(vec![StageDefinition::nested("first", "shared")])
        .sequential(vec![StageDefinition::nested("second", "shared")]);
    let v = validator(ValidatorConfig::default());
    assert!(v.validate(&plan, &catalog, &ctx("t")).is_ok());
}

#[test]
fn unknown_sub_plan_fails() {
    let plan = StagePlan::new().sequential(vec![StageDefinition::nested("missing", "nowhere")]);
    let v = validator(ValidatorConfig::default());
    assert_eq!(
        v.validate(&plan, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::UnknownSubPlan("nowhere".into()))
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structure and resolvability
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn unresolved_stage_fails() {
    let plan = StagePlan::new().sequential(defs(&["ACCESS", "Nope"]));
    let v = validator(ValidatorConfig::default());
    assert_eq!(
        v.validate(&plan, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::UnresolvedStage("Nope".into()))
    );
}

#[test]
fn predefined_stage_without_plugin_variant_fails() {
    let plan = StagePlan::new().sequential(vec![StageDefinition::new("MODEL").with_plugin("large")]);
    let v = validator(ValidatorConfig::default());
    assert_eq!(
        v.validate(&plan, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::UnresolvedStage("MODEL".into()))
    );
}

#[test]
fn merge_handler_cannot_run_as_stage() {
    let plan = StagePlan::new().sequential(defs(&["Reranker"]));
    let v = validator(ValidatorConfig::default());
    assert_eq!(
        v.validate(&plan, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::UnresolvedStage("Reranker".into()))
    );
}

#[test]
fn merge_policy_must_resolve_to_a_merge_handler() {
    let v = validator(ValidatorConfig::default());

    let unknown = StagePlan::new().concurrent(defs(&["ToolA"]), "Nothing");
    assert_eq!(
        v.validate(&unknown, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::UnresolvedMergePolicy("Nothing".into()))
    );

    let wrong_kind = StagePlan::new().concurrent(defs(&["ToolA"]), "ToolB");
    assert_eq!(
        v.validate(&wrong_kind, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::UnresolvedMergePolicy("ToolB".into()))
    );

    let custom_merge = StagePlan::new().concurrent(defs(&["ToolA"]), "Reranker");
    assert!(v.validate(&custom_merge, &PlanCatalog::new(), &ctx("t")).is_ok());
}

#[test]
fn structure_errors_come_first() {
    let mut plan = StagePlan::new().concurrent(defs(&["Nope"]), "FirstSuccess");
    plan.groups[0].merge_policy = None;
    let v = validator(ValidatorConfig::default().with_allowed(["ACCESS"]));
    assert_eq!(
        v.validate(&plan, &PlanCatalog::new(), &ctx("t")),
        Err(ValidationError::MissingMergePolicy { group: 0 })
    );
}

#[test]
fn config_deserializes_with_defaults() {
    let config: ValidatorConfig = serde_json::from_value(json!({
        "allowed_stage_names": ["ACCESS"],
        "tenant_allowlists": { "acme": ["MODEL"] }
    }))
    .unwrap();
    assert!(config.enabled);
    assert_eq!(config.max_plan_depth, conduit_validator::DEFAULT_MAX_PLAN_DEPTH);
    assert!(config.allowlist_for(&"acme".into()).contains("MODEL"));
    assert!(config.allowlist_for(&"other".into()).contains("ACCESS"));
}
