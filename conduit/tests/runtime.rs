use async_trait::async_trait;
use conduit::conduit_kernel::CancelHandle;
use conduit::conduit_registry::PredefinedStage;
use conduit::conduit_validator::ValidatorConfig;
use conduit::{ConduitConfig, Runtime};
use serde_json::json;
use stage0::test_utils::{FailingStage, StaticStage, output_map};
use stage0::{
    ExecutionCommand, ExecutionOutcome, FailureKind, Handler, InvocationOptions, InvokeError,
    KernelError, MergeRequest, OutputMap, RegistryError, StageDefinition, StageInvoker,
    StagePlan, StageRequest, StageResult, ValidationError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn model(answer: &str) -> Handler {
    Handler::stage(StaticStage::new(output_map(json!({"result": answer}))))
}

fn input() -> OutputMap {
    output_map(json!({"prompt": "hello"}))
}

// --- Wiring ---

#[tokio::test]
async fn default_plugins_with_custom_model() {
    let runtime = Runtime::builder(ConduitConfig::default())
        .with_default_plugins()
        .unwrap()
        .predefined(PredefinedStage::Model, "default", model("hi there"))
        .unwrap()
        .build();

    let plan = StagePlan::new()
        .sequential(vec![
            StageDefinition::new("ACCESS"),
            StageDefinition::new("MODEL"),
        ])
        .concurrent(
            vec![
                StageDefinition::new("EchoTool"),
                StageDefinition::new("EchoTool").with_override("output_key", json!("second")),
            ],
            "AllOrNothing",
        );
    let output = runtime
        .execute(ExecutionCommand::inline("acme", "req-1", input(), plan))
        .await
        .unwrap();
    assert_eq!(
        output,
        output_map(json!({
            "accessAllowed": true,
            "result": "hi there",
            "toolResult": "hello",
            "second": "hello",
        }))
    );
}

#[tokio::test]
async fn resolver_config_picks_the_plugin_variant() {
    let config = ConduitConfig::default().with_resolver(
        conduit::conduit_registry::ResolverConfig::default()
            .with_stage_plugin(PredefinedStage::Model, "large"),
    );
    let runtime = Runtime::builder(config)
        .predefined(PredefinedStage::Model, "default", model("small answer"))
        .unwrap()
        .predefined(PredefinedStage::Model, "large", model("large answer"))
        .unwrap()
        .build();

    let plan = StagePlan::new().sequential(vec![StageDefinition::new("MODEL")]);
    let output = runtime
        .execute(ExecutionCommand::inline("acme", "r", input(), plan.clone()))
        .await
        .unwrap();
    assert_eq!(output["result"], json!("large answer"));

    // An explicit plugin on the definition still wins.
    let explicit = StagePlan::new()
        .sequential(vec![StageDefinition::new("MODEL").with_plugin("default")]);
    let output = runtime
        .execute(ExecutionCommand::inline("acme", "r", input(), explicit))
        .await
        .unwrap();
    assert_eq!(output["result"], json!("small answer"));
}

#[tokio::test]
async fn validator_config_is_applied() {
    let config = ConduitConfig::default()
        .with_validator(ValidatorConfig::default().with_allowed(["ACCESS"]));
    let runtime = Runtime::builder(config)
        .with_default_plugins()
        .unwrap()
        .build();

    let plan = StagePlan::new().sequential(vec![
        StageDefinition::new("ACCESS"),
        StageDefinition::new("EchoTool"),
    ]);
    let err = runtime
        .execute(ExecutionCommand::inline("acme", "r", input(), plan))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KernelError::Validation(ValidationError::UnauthorizedStage(ref name)) if name == "EchoTool"
    ));
}

#[tokio::test]
async fn catalog_plans_run_by_id() {
    let runtime = Runtime::builder(ConduitConfig::default())
        .with_default_plugins()
        .unwrap()
        .plan(
            StagePlan::new()
                .with_id("gate-only")
                .sequential(vec![StageDefinition::new("ACCESS")]),
        )
        .unwrap()
        .build();

    let outcome = runtime
        .run(
            ExecutionCommand::catalog("acme", "r", input(), "gate-only"),
            &CancelHandle::new(),
        )
        .await;
    assert_eq!(
        outcome,
        ExecutionOutcome::Completed {
            output: output_map(json!({"accessAllowed": true}))
        }
    );
}

#[tokio::test]
async fn failures_surface_as_outcomes() {
    let runtime = Runtime::builder(ConduitConfig::default())
        .custom("Broken", Handler::stage(FailingStage::non_retryable("boom")))
        .unwrap()
        .build();
    let plan = StagePlan::new().sequential(vec![StageDefinition::new("Broken")]);
    let outcome = runtime
        .run(
            ExecutionCommand::inline("acme", "r", input(), plan),
            &CancelHandle::new(),
        )
        .await;
    match outcome {
        ExecutionOutcome::Failed { kind, message } => {
            assert_eq!(kind, FailureKind::Stage);
            assert!(message.contains("Broken"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

// --- Registration ---

#[test]
fn duplicate_registration_fails_at_build_time() {
    let err = Runtime::builder(ConduitConfig::default())
        .with_default_plugins()
        .unwrap()
        .custom("EchoTool", model("x"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Duplicate { .. }));

    let err = Runtime::builder(ConduitConfig::default())
        .plan(StagePlan::new().with_id("p"))
        .unwrap()
        .plan(StagePlan::new().with_id("p"))
        .unwrap_err();
    assert!(matches!(err, RegistryError::Duplicate { .. }));
}

// --- Custom invoker ---

/// Counts calls, then answers every stage with a fixed result.
#[derive(Default)]
struct CountingInvoker {
    calls: AtomicUsize,
}

#[async_trait]
impl StageInvoker for CountingInvoker {
    async fn invoke_stage(
        &self,
        request: StageRequest,
        _options: &InvocationOptions,
    ) -> Result<StageResult, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StageResult::new(
            request.stage_name,
            output_map(json!({"via": "remote"})),
        ))
    }

    async fn invoke_merge(
        &self,
        request: MergeRequest,
        _options: &InvocationOptions,
    ) -> Result<OutputMap, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(request.accumulated_output)
    }
}

#[tokio::test]
async fn custom_invoker_replaces_the_local_one() {
    let invoker = Arc::new(CountingInvoker::default());
    let runtime = Runtime::builder(ConduitConfig::default())
        .with_default_plugins()
        .unwrap()
        .invoker(invoker.clone())
        .build();
    let plan = StagePlan::new().sequential(vec![StageDefinition::new("ACCESS")]);
    let output = runtime
        .execute(ExecutionCommand::inline("acme", "r", input(), plan))
        .await
        .unwrap();
    assert_eq!(output, output_map(json!({"via": "remote"})));
    assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
}
