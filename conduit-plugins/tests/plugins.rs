use conduit_kernel::{HookAction, HookContext, HookPoint, HookRegistry, Kernel, KernelHook, LocalInvoker};
use conduit_plugins::{
    AllowAllGate, CACHE_HIT_KEY, DefaultPlugins, EchoTool, InMemoryCache, TracingHook,
    register_defaults,
};
use conduit_registry::{
    ActivityRegistry, CustomBucket, PredefinedBucket, PredefinedStage, StageResolver,
};
use serde_json::json;
use stage0::test_utils::{FailingStage, StaticStage, output_map};
use stage0::{
    CapabilityHandler, ExecutionCommand, ExecutionContext, Handler, InvocationOptions, OutputMap,
    RetryPolicy, StageDefinition, StageHandler, StagePlan,
};
use std::sync::Arc;

fn ctx() -> ExecutionContext {
    ExecutionContext::new("acme", "req-1", output_map(json!({"prompt": "what is rust?"})))
}

// --- AllowAllGate ---

#[tokio::test]
async fn gate_allows_access() {
    let result = AllowAllGate
        .execute(&ctx().stage_request(&StageDefinition::new("ACCESS")))
        .await
        .unwrap();
    assert_eq!(result.data, output_map(json!({"accessAllowed": true})));
}

// --- EchoTool ---

#[tokio::test]
async fn echo_copies_the_prompt_by_default() {
    let result = EchoTool
        .invoke(&ctx().stage_request(&StageDefinition::new("EchoTool")))
        .await
        .unwrap();
    assert_eq!(result.capability_name, "EchoTool");
    assert_eq!(result.data["toolResult"], json!("what is rust?"));
}

#[tokio::test]
async fn echo_honours_overrides() {
    let def = StageDefinition::new("EchoTool")
        .with_override("reply", json!("ok"))
        .with_override("output_key", json!("answer"));
    let result = EchoTool.invoke(&ctx().stage_request(&def)).await.unwrap();
    assert_eq!(result.data, output_map(json!({"answer": "ok"})));
}

#[tokio::test]
async fn echo_without_input_fails() {
    let def = StageDefinition::new("EchoTool").with_override("input_key", json!("missing"));
    let err = EchoTool.invoke(&ctx().stage_request(&def)).await.unwrap_err();
    assert_eq!(err.error_type(), "NonRetryable");
}

// --- InMemoryCache ---

#[tokio::test]
async fn cache_miss_then_store_then_hit() {
    let cache = InMemoryCache::new();
    let lookup = StageDefinition::new("CACHE");
    let store = StageDefinition::new("CACHE").with_override("mode", json!("store"));

    let first = ctx();
    let miss = cache.execute(&first.stage_request(&lookup)).await.unwrap();
    assert_eq!(miss.data[CACHE_HIT_KEY], json!(false));

    let after_model = first.clone().with_accumulated(output_map(json!({"result": "a language"})));
    cache.execute(&after_model.stage_request(&store)).await.unwrap();
    assert_eq!(cache.len().await, 1);

    let hit = cache.execute(&ctx().stage_request(&lookup)).await.unwrap();
    assert_eq!(
        hit.data,
        output_map(json!({"result": "a language", "cacheHit": true}))
    );
}

#[tokio::test]
async fn cache_is_scoped_per_tenant() {
    let cache = InMemoryCache::new();
    let lookup = StageDefinition::new("CACHE");
    let store = StageDefinition::new("CACHE").with_override("mode", json!("store"));

    let first = ctx();
    cache.execute(&first.stage_request(&lookup)).await.unwrap();
    let done = first.with_accumulated(output_map(json!({"result": "cached"})));
    cache.execute(&done.stage_request(&store)).await.unwrap();

    let other = ExecutionContext::new("globex", "req-2", output_map(json!({"prompt": "what is rust?"})));
    let result = cache.execute(&other.stage_request(&lookup)).await.unwrap();
    assert_eq!(result.data[CACHE_HIT_KEY], json!(false));
}

#[tokio::test]
async fn store_without_pending_lookup_is_a_no_op() {
    let cache = InMemoryCache::new();
    let store = StageDefinition::new("CACHE").with_override("mode", json!("store"));
    let done = ctx().with_accumulated(output_map(json!({"result": "x"})));
    cache.execute(&done.stage_request(&store)).await.unwrap();
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn unknown_cache_mode_fails() {
    let def = StageDefinition::new("CACHE").with_override("mode", json!("flush"));
    let err = InMemoryCache::new()
        .execute(&ctx().stage_request(&def))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("flush"));
}

#[tokio::test]
async fn cache_evicts_the_oldest_entry_at_capacity() {
    let cache = InMemoryCache::with_capacity(2);
    let lookup = StageDefinition::new("CACHE");
    let store = StageDefinition::new("CACHE").with_override("mode", json!("store"));
    let request = |prompt: &str| ExecutionContext::new("acme", "r", output_map(json!({"prompt": prompt})));

    for prompt in ["one", "two", "three"] {
        let start = request(prompt);
        cache.execute(&start.stage_request(&lookup)).await.unwrap();
        let done = start.with_accumulated(output_map(json!({"result": prompt})));
        cache.execute(&done.stage_request(&store)).await.unwrap();
    }
    assert_eq!(cache.len().await, 2);

    let evicted = cache.execute(&request("one").stage_request(&lookup)).await.unwrap();
    assert_eq!(evicted.data[CACHE_HIT_KEY], json!(false));
    let kept = cache.execute(&request("three").stage_request(&lookup)).await.unwrap();
    assert_eq!(kept.data[CACHE_HIT_KEY], json!(true));
}

// --- TracingHook ---

#[tokio::test]
async fn tracing_hook_returns_continue() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let hook = TracingHook::new();
    for point in hook.points().to_vec() {
        let event = HookContext::new(point, "acme".into(), "req".into()).for_stage("MODEL");
        assert_eq!(hook.on_event(&event).await.unwrap(), HookAction::Continue);
    }
    let failed = HookContext::new(HookPoint::AfterMerge, "acme".into(), "req".into())
        .for_merge("FirstSuccess")
        .with_error("no member succeeded");
    assert_eq!(hook.on_event(&failed).await.unwrap(), HookAction::Continue);
}

// --- Wired together ---

#[tokio::test]
async fn default_plugins_run_a_full_plan() {
    let plugins = register_defaults(DefaultPlugins::default()).unwrap();
    let predefined = plugins
        .predefined
        .register(
            PredefinedStage::Model,
            "default",
            Handler::stage(StaticStage::new(output_map(json!({"result": "answer"})))),
        )
        .unwrap()
        .build();
    let custom = plugins
        .custom
        .register("ToolA", Handler::stage(FailingStage::non_retryable("offline")))
        .unwrap()
        .register(
            "ToolB",
            Handler::stage(StaticStage::new(output_map(json!({"toolResult": "ok"})))),
        )
        .unwrap()
        .build();
    let resolver = Arc::new(StageResolver::new(
        predefined,
        plugins.activities.build(),
        custom,
    ));
    let kernel = Kernel::new(Arc::new(LocalInvoker::new(Arc::clone(&resolver))), resolver)
        .with_options(InvocationOptions::default().with_retry(RetryPolicy::no_retries()))
        .with_hooks(HookRegistry::new().with(Arc::new(TracingHook::new())));

    let plan = StagePlan::new()
        .sequential(vec![StageDefinition::new("ACCESS"), StageDefinition::new("MODEL")])
        .concurrent(
            vec![StageDefinition::new("ToolA"), StageDefinition::new("ToolB")],
            "FirstSuccess",
        );
    let output = kernel
        .execute(ExecutionCommand::inline("acme", "req-1", OutputMap::new(), plan))
        .await
        .unwrap();
    assert_eq!(
        output,
        output_map(json!({"accessAllowed": true, "result": "answer", "toolResult": "ok"}))
    );
}

#[test]
fn default_names_cannot_be_registered_twice() {
    let plugins = register_defaults(DefaultPlugins::default()).unwrap();
    assert!(register_defaults(plugins).is_err());
    // Names are unique per bucket, not across buckets.
    assert!(ActivityRegistry::builder().register("EchoTool", Handler::capability(EchoTool)).is_ok());
    assert!(CustomBucket::builder().register("FirstSuccess", Handler::capability(EchoTool)).is_ok());
    assert!(PredefinedBucket::builder().register(PredefinedStage::Access, "strict", Handler::stage(AllowAllGate)).is_ok());
}
