//! Acceptance tests for the stage0 data model.
//!
//! Tests cover:
//! - Trait object safety (Arc<dyn Trait> is Send + Sync)
//! - Stable wire names for plans, commands and outcomes
//! - Structural plan checks
//! - Catalog registration rules

use serde_json::json;
use stage0::*;

fn output_map(value: serde_json::Value) -> OutputMap {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Object Safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn _assert_send_sync<T: Send + Sync>() {}

#[test]
fn protocol_traits_are_object_safe_send_sync() {
    _assert_send_sync::<std::sync::Arc<dyn StageHandler>>();
    _assert_send_sync::<std::sync::Arc<dyn CapabilityHandler>>();
    _assert_send_sync::<std::sync::Arc<dyn MergePolicy>>();
    _assert_send_sync::<std::sync::Arc<dyn StageInvoker>>();
    _assert_send_sync::<Handler>();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire format
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn plan_reads_stable_field_names_and_ignores_unknown_fields() {
    let plan: StagePlan = serde_json::from_value(json!({
        "id": "qa",
        "groups": [
            {"mode": "SEQUENTIAL", "definitions": [{"stage_name": "ACCESS"}]},
            {
                "mode": "ASYNC",
                "definitions": [
                    {"stage_name": "ToolA", "plugin_id": "v2", "config_overrides": {"k": 1}},
                    {"stage_name": "ToolB", "future_field": "ignored"}
                ],
                "merge_policy": "FirstSuccess",
                "annotations": {"owner": "search"}
            }
        ]
    }))
    .unwrap();

    assert_eq!(plan.id, Some(PlanId::new("qa")));
    assert_eq!(plan.groups.len(), 2);
    assert_eq!(plan.groups[0].mode, GroupMode::Sequential);
    assert_eq!(plan.groups[1].mode, GroupMode::Async);
    assert_eq!(plan.groups[1].merge_policy.as_deref(), Some("FirstSuccess"));
    let tool_a = &plan.groups[1].definitions[0];
    assert_eq!(tool_a.plugin_id.as_deref(), Some("v2"));
    assert_eq!(tool_a.config_overrides["k"], json!(1));
    assert!(plan.check_structure().is_ok());
}

#[test]
fn plan_serializes_without_empty_optionals() {
    let plan = StagePlan::new().sequential(vec![StageDefinition::new("MODEL")]);
    let value = serde_json::to_value(&plan).unwrap();
    assert_eq!(
        value,
        json!({"groups": [{"mode": "SEQUENTIAL", "definitions": [{"stage_name": "MODEL"}]}]})
    );
}

#[test]
fn command_plan_ref_is_tagged() {
    let cmd = ExecutionCommand::catalog("acme", "req-1", output_map(json!({"q": "x"})), "qa");
    let value = serde_json::to_value(&cmd).unwrap();
    assert_eq!(value["plan"], json!({"kind": "catalog", "id": "qa"}));
    assert_eq!(value["tenant_id"], json!("acme"));

    let back: ExecutionCommand = serde_json::from_value(value).unwrap();
    assert_eq!(back.plan, PlanRef::Catalog { id: PlanId::new("qa") });
}

#[test]
fn outcome_from_kernel_result() {
    let ok = ExecutionOutcome::from(Ok::<_, KernelError>(output_map(json!({"a": 1}))));
    assert!(ok.is_completed());
    assert_eq!(ok.output().unwrap()["a"], json!(1));

    let failed = ExecutionOutcome::from(Err::<OutputMap, _>(KernelError::Validation(
        ValidationError::UnauthorizedStage("X".into()),
    )));
    assert_eq!(
        serde_json::to_value(&failed).unwrap(),
        json!({
            "status": "failed",
            "kind": "validation",
            "message": "plan validation failed: unauthorized stage in plan: `X`"
        })
    );
}

#[test]
fn cancel_signal_wire_shape() {
    let signal = ExecutionSignal::cancel("user left");
    assert_eq!(
        serde_json::to_value(&signal).unwrap(),
        json!({"signal": "cancel", "reason": "user left"})
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Structure
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn async_group_without_merge_policy_is_rejected() {
    let mut plan = StagePlan::new().concurrent(vec![StageDefinition::new("A")], "M");
    plan.groups[0].merge_policy = None;
    assert_eq!(
        plan.check_structure(),
        Err(ValidationError::MissingMergePolicy { group: 0 })
    );
}

#[test]
fn sequential_group_with_merge_policy_is_rejected() {
    let mut plan = StagePlan::new()
        .sequential(vec![StageDefinition::new("A")])
        .sequential(vec![StageDefinition::new("B")]);
    plan.groups[1].merge_policy = Some("M".into());
    assert_eq!(
        plan.check_structure(),
        Err(ValidationError::UnexpectedMergePolicy {
            group: 1,
            policy: "M".into()
        })
    );
}

#[test]
fn empty_plan_is_structurally_valid() {
    assert!(StagePlan::new().check_structure().is_ok());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn catalog_rejects_anonymous_and_duplicate_plans() {
    let mut catalog = PlanCatalog::new();
    assert_eq!(catalog.insert(StagePlan::new()), Err(RegistryError::MissingPlanId));

    catalog.insert(StagePlan::new().with_id("p")).unwrap();
    assert_eq!(
        catalog.insert(StagePlan::new().with_id("p")),
        Err(RegistryError::Duplicate {
            bucket: "plan catalog",
            name: "p".into()
        })
    );
    assert_eq!(catalog.len(), 1);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn invoke_error_failure_keeps_stage_error_type() {
    let err = InvokeError::Exhausted {
        name: "ToolA".into(),
        attempts: 3,
        source: StageError::typed("QuotaExceeded", "no budget"),
    };
    let failure = err.to_failure();
    assert_eq!(failure.error_type, "QuotaExceeded");
    assert!(failure.message.contains("after 3 attempt(s)"));
}

#[test]
fn typed_ids_convert() {
    let id = TenantId::from("acme");
    assert_eq!(id.as_str(), "acme");
    assert_eq!(RequestId::from(String::from("r")).to_string(), "r");
}
