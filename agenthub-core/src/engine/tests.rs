//! Scenario tests for the execution engine

use super::*;
use crate::context::ContextAugmenter;
use crate::planner::{CallId, ExecutionPlan, PlannedCall};
use crate::ratelimit::RateLimitConfig;
use crate::tools::{
    HandlerTool, Parameters, ToolDescriptor, ToolInvocationError, ToolStatus,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

fn tool<F, Fut>(descriptor: ToolDescriptor, handler: F) -> Arc<dyn Tool>
where
    F: Fn(Parameters, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolInvocationError>> + Send + 'static,
{
    Arc::new(HandlerTool::new(descriptor, handler))
}

fn echo() -> Arc<dyn Tool> {
    tool(ToolDescriptor::new("echo", "Echo"), |params, _cancel| async move {
        Ok(Value::Object(params))
    })
}

fn sleeper(id: &str, delay: Duration) -> Arc<dyn Tool> {
    tool(ToolDescriptor::new(id, "Sleeps"), move |_params, _cancel| async move {
        tokio::time::sleep(delay).await;
        Ok(json!({"slept_ms": delay.as_millis() as u64}))
    })
}

fn failing(id: &str) -> Arc<dyn Tool> {
    tool(ToolDescriptor::new(id, "Always fails"), |_params, _cancel| async move {
        Err(ToolInvocationError::new("upstream returned 503: secret-token-abc"))
    })
}

fn engine(tools: Vec<Arc<dyn Tool>>) -> ExecutionEngine {
    let mut registry = ToolRegistry::new();
    registry.register_all(tools).unwrap();
    ExecutionEngine::new(
        Arc::new(registry),
        Arc::new(ResultCache::default()),
        Arc::new(RateLimiter::new()),
        EngineConfig::default(),
    )
}

fn call(id: u32, tool_id: &str, params: Value) -> PlannedCall {
    let params = match params {
        Value::Object(map) => map,
        _ => Parameters::new(),
    };
    PlannedCall::new(CallId::new(id), tool_id, params)
}

fn statuses(results: &[ToolResult]) -> Vec<ToolStatus> {
    results.iter().map(|r| r.status).collect()
}

#[tokio::test]
async fn test_one_failure_among_independent_calls() {
    let engine = engine(vec![echo(), failing("broken")]);
    let plan = ExecutionPlan::new(vec![
        call(0, "echo", json!({"n": 0})),
        call(1, "echo", json!({"n": 1})),
        call(2, "broken", json!({})),
        call(3, "echo", json!({"n": 3})),
        call(4, "echo", json!({"n": 4})),
    ])
    .unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;

    assert_eq!(results.len(), 5);
    assert_eq!(
        results.iter().filter(|r| r.status == ToolStatus::Failure).count(),
        1
    );
    assert_eq!(results[2].status, ToolStatus::Failure);
    assert!(results[2].error_detail.as_deref().unwrap().contains("503"));
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.call_id, CallId::new(i as u32));
    }
}

#[tokio::test(start_paused = true)]
async fn test_echo_and_slow_timeout() {
    let slow = tool(
        ToolDescriptor::new("slow", "Too slow").with_timeout(Duration::from_secs(1)),
        |_params, _cancel| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        },
    );
    let engine = engine(vec![echo(), slow]);
    let plan = ExecutionPlan::new(vec![
        call(0, "echo", json!({"x": 1})),
        call(1, "slow", json!({})),
    ])
    .unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(statuses(&results), vec![ToolStatus::Success, ToolStatus::TimedOut]);
    assert_eq!(results[0].payload, Some(json!({"x": 1})));
    assert!(results[1].payload.is_none());
    assert!(results[1].duration >= Duration::from_secs(1));
    assert!(results[1].duration < Duration::from_secs(5));

    let context = ContextAugmenter::default()
        .augment(crate::context::ConversationContext::new().with_user("hi"), &results);
    let evidence = context.evidence().unwrap();
    assert_eq!(evidence.entries.len(), 1);
    assert!(evidence.entries[0].content.contains("\"x\": 1"));
    assert_eq!(evidence.notes.len(), 1);
    assert_eq!(evidence.notes[0].tool_id, "slow");
    assert!(!evidence.render().contains("timed out after"));
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counted = {
        let invocations = Arc::clone(&invocations);
        tool(ToolDescriptor::new("search", "Search"), move |params, _cancel| {
            let invocations = Arc::clone(&invocations);
            async move {
                let n = invocations.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"query": params["q"], "run": n}))
            }
        })
    };
    let engine = engine(vec![counted]);
    let plan = ExecutionPlan::new(vec![call(0, "search", json!({"q": "rust", "lang": "en"}))]).unwrap();

    let first = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(first[0].status, ToolStatus::Success);

    // Same parameters in a different key order
    let again = ExecutionPlan::new(vec![call(0, "search", json!({"lang": "en", "q": "rust"}))]).unwrap();
    let second = engine.run(&again, &CancellationToken::new()).await;

    assert_eq!(second[0].status, ToolStatus::CacheHit);
    assert_eq!(second[0].payload, first[0].payload);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_expires_after_ttl() {
    let search = tool(
        ToolDescriptor::new("search", "Search").with_cache_ttl(Duration::from_secs(30)),
        |_params, _cancel| async move { Ok(json!("fresh")) },
    );
    let engine = engine(vec![search]);
    let plan = ExecutionPlan::new(vec![call(0, "search", json!({}))]).unwrap();

    engine.run(&plan, &CancellationToken::new()).await;
    tokio::time::advance(Duration::from_secs(31)).await;

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(results[0].status, ToolStatus::Success);
}

#[tokio::test]
async fn test_zero_ttl_never_cached() {
    let clock = tool(
        ToolDescriptor::new("clock", "Clock").with_cache_ttl(Duration::ZERO),
        |_params, _cancel| async move { Ok(json!("12:00")) },
    );
    let engine = engine(vec![clock]);
    let plan = ExecutionPlan::new(vec![call(0, "clock", json!({}))]).unwrap();

    engine.run(&plan, &CancellationToken::new()).await;
    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(results[0].status, ToolStatus::Success);
    assert!(engine.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_mid_three_layer_plan() {
    let engine = engine(vec![
        sleeper("fetch", Duration::from_millis(10)),
        sleeper("parse", Duration::from_secs(10)),
        sleeper("summarize", Duration::from_millis(10)),
    ]);
    let plan = ExecutionPlan::new(vec![
        call(0, "fetch", json!({})),
        call(1, "parse", json!({})).depends_on(CallId::new(0)),
        call(2, "summarize", json!({})).depends_on(CallId::new(1)),
    ])
    .unwrap();
    assert_eq!(plan.layers().len(), 3);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
    }

    let results = engine.run(&plan, &cancel).await;
    assert_eq!(
        statuses(&results),
        vec![ToolStatus::Success, ToolStatus::Cancelled, ToolStatus::Cancelled]
    );
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let engine = engine(vec![echo()]);
    let plan = ExecutionPlan::new(vec![call(0, "echo", json!({})), call(1, "echo", json!({"a": 1}))]).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let results = engine.run(&plan, &cancel).await;
    assert_eq!(statuses(&results), vec![ToolStatus::Cancelled, ToolStatus::Cancelled]);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_call_is_not_executed() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let limited = {
        let invocations = Arc::clone(&invocations);
        tool(
            ToolDescriptor::new("search", "Search")
                .with_rate_limit(RateLimitConfig::new(1, 0.0))
                .with_cache_ttl(Duration::ZERO),
            move |_params, _cancel| {
                let invocations = Arc::clone(&invocations);
                async move {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("ok"))
                }
            },
        )
    };
    let engine = engine(vec![limited]);
    let plan = ExecutionPlan::new(vec![
        call(0, "search", json!({"q": "a"})),
        call(1, "search", json!({"q": "b"})),
    ])
    .unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    let mut observed = statuses(&results);
    observed.sort_by_key(|s| s.as_str());
    assert_eq!(observed, vec![ToolStatus::RateLimited, ToolStatus::Success]);
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_injected_limiter_bucket_wins() {
    let mut registry = ToolRegistry::new();
    registry
        .register(tool(
            ToolDescriptor::new("search", "Search").with_rate_limit(RateLimitConfig::new(100, 100.0)),
            |_params, _cancel| async move { Ok(json!("ok")) },
        ))
        .unwrap();

    let limiter = Arc::new(RateLimiter::new());
    limiter.configure("search", RateLimitConfig::new(0, 0.0));

    let engine = ExecutionEngine::new(
        Arc::new(registry),
        Arc::new(ResultCache::default()),
        limiter,
        EngineConfig {
            acquire_timeout: Duration::from_millis(10),
        },
    );
    let plan = ExecutionPlan::new(vec![call(0, "search", json!({}))]).unwrap();
    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(results[0].status, ToolStatus::RateLimited);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_cap_enforced() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let capped = {
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        tool(
            ToolDescriptor::new("capped", "One at a time")
                .with_max_concurrent_calls(1)
                .with_cache_ttl(Duration::ZERO),
            move |_params, _cancel| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(json!(now))
                }
            },
        )
    };
    let engine = engine(vec![capped]);
    let plan = ExecutionPlan::new((0..3).map(|i| call(i, "capped", json!({"i": i}))).collect()).unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert!(results.iter().all(|r| r.status == ToolStatus::Success));
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_cancellable_call_finishes_in_background() {
    let finished = Arc::new(AtomicBool::new(false));
    let stubborn = {
        let finished = Arc::clone(&finished);
        tool(
            ToolDescriptor::new("stubborn", "Ignores cancellation")
                .with_timeout(Duration::from_millis(100))
                .with_cancellable(false),
            move |_params, _cancel| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(json!("discarded"))
                }
            },
        )
    };
    let engine = engine(vec![stubborn]);
    let plan = ExecutionPlan::new(vec![call(0, "stubborn", json!({}))]).unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(results[0].status, ToolStatus::TimedOut);
    assert!(!finished.load(Ordering::SeqCst));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(finished.load(Ordering::SeqCst));
    // The late value is discarded, not cached
    assert!(engine.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellable_call_is_aborted_on_timeout() {
    let finished = Arc::new(AtomicBool::new(false));
    let observed_cancel = Arc::new(AtomicBool::new(false));
    let polite = {
        let finished = Arc::clone(&finished);
        let observed_cancel = Arc::clone(&observed_cancel);
        tool(
            ToolDescriptor::new("polite", "Honours cancellation").with_timeout(Duration::from_millis(100)),
            move |_params, cancel| {
                let finished = Arc::clone(&finished);
                let observed_cancel = Arc::clone(&observed_cancel);
                async move {
                    tokio::select! {
                        _ = cancel.cancelled() => observed_cancel.store(true, Ordering::SeqCst),
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                    }
                    finished.store(true, Ordering::SeqCst);
                    Ok(json!("late"))
                }
            },
        )
    };
    let engine = engine(vec![polite]);
    let plan = ExecutionPlan::new(vec![call(0, "polite", json!({}))]).unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(results[0].status, ToolStatus::TimedOut);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_per_call_timeout_override() {
    let engine = engine(vec![sleeper("nap", Duration::from_millis(200))]);
    let plan = ExecutionPlan::new(vec![
        call(0, "nap", json!({"a": 1})).with_timeout(Duration::from_millis(50)),
        call(1, "nap", json!({"b": 1})),
    ])
    .unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(statuses(&results), vec![ToolStatus::TimedOut, ToolStatus::Success]);
}

#[tokio::test]
async fn test_dependent_runs_after_failed_dependency() {
    let engine = engine(vec![failing("fetch"), echo()]);
    let plan = ExecutionPlan::new(vec![
        call(0, "fetch", json!({})),
        call(1, "echo", json!({"after": "fetch"})).depends_on(CallId::new(0)),
    ])
    .unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(statuses(&results), vec![ToolStatus::Failure, ToolStatus::Success]);
    assert!(results[1].started_at >= results[0].started_at);
}

#[tokio::test]
async fn test_unknown_tool_becomes_failure() {
    let engine = engine(vec![echo()]);
    let plan = ExecutionPlan::new(vec![call(0, "ghost", json!({})), call(1, "echo", json!({}))]).unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(statuses(&results), vec![ToolStatus::Failure, ToolStatus::Success]);
}

#[tokio::test]
async fn test_panicking_tool_is_isolated() {
    let panicky = tool(ToolDescriptor::new("panicky", "Panics"), |_params, _cancel| async move {
        if true {
            panic!("tool bug");
        }
        Ok(Value::Null)
    });
    let engine = engine(vec![panicky, echo()]);
    let plan = ExecutionPlan::new(vec![call(0, "panicky", json!({})), call(1, "echo", json!({}))]).unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    assert_eq!(statuses(&results), vec![ToolStatus::Failure, ToolStatus::Success]);
    assert_eq!(results[0].error_detail.as_deref(), Some("tool panicked"));
}

#[tokio::test(start_paused = true)]
async fn test_results_follow_plan_order_not_completion_order() {
    let engine = engine(vec![
        sleeper("slowest", Duration::from_millis(300)),
        sleeper("middle", Duration::from_millis(200)),
        sleeper("fastest", Duration::from_millis(100)),
    ]);
    let plan = ExecutionPlan::new(vec![
        call(0, "slowest", json!({})),
        call(1, "middle", json!({})),
        call(2, "fastest", json!({})),
    ])
    .unwrap();

    let results = engine.run(&plan, &CancellationToken::new()).await;
    let order: Vec<&str> = results.iter().map(|r| r.tool_id.as_str()).collect();
    assert_eq!(order, vec!["slowest", "middle", "fastest"]);
}

#[tokio::test]
async fn test_empty_plan() {
    let engine = engine(vec![echo()]);
    let results = engine.run(&ExecutionPlan::empty(), &CancellationToken::new()).await;
    assert!(results.is_empty());
}
