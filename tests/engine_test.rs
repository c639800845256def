//! Integration tests for pipeline execution.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use stepflow::flow::{
    Engine, EngineOptions, PipelineBuilder, RunProgress, StepRegistry, StepStatus, Trigger,
};
use stepflow::FlowError;

fn engine(registry: StepRegistry) -> Engine {
    Engine::new(registry, EngineOptions::default()).unwrap()
}

fn lead_router() -> StepRegistry {
    PipelineBuilder::new()
        .start("fetch", |ctx| Ok(ctx.input().clone()))
        .listen("score", "fetch", |ctx| {
            let leads = ctx.input().as_array().cloned().unwrap_or_default();
            ctx.state().set("lead_count", json!(leads.len()));
            Ok(json!(leads.len() * 30))
        })
        .router(
            "route",
            Trigger::OnStep("score".into()),
            &["low", "high"],
            |ctx| {
                let score = ctx.input().as_u64().unwrap_or(0);
                Ok(if score > 70 { "high" } else { "low" }.to_string())
            },
        )
        .on_signal("low_path", "low", |_| Ok(json!("handled-low")))
        .on_signal("high_path", "high", |_| Ok(json!("handled-high")))
        .build()
        .unwrap()
}

#[test]
fn linear_chain_threads_outputs() {
    let registry = PipelineBuilder::new()
        .start("a", |ctx| Ok(json!(ctx.input().as_i64().unwrap() + 1)))
        .listen("b", "a", |ctx| Ok(json!(ctx.input().as_i64().unwrap() * 10)))
        .listen("c", "b", |ctx| Ok(json!(format!("c:{}", ctx.input()))))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    let outcome = engine.run(json!(1)).unwrap();

    assert_eq!(engine.record().step_names(), vec!["a", "b", "c"]);
    assert_eq!(engine.record().get("b").unwrap().input, json!(2));
    assert_eq!(outcome.output, Some(json!("c:20")));
    assert_eq!(outcome.final_step.as_deref(), Some("c"));
    assert!(outcome.success);
}

#[test]
fn route_to_low_path() {
    let mut engine = engine(lead_router());

    let outcome = engine.run(json!(["ada", "grace"])).unwrap();

    assert_eq!(outcome.output, Some(json!("handled-low")));
    assert_eq!(
        engine.record().step_names(),
        vec!["fetch", "score", "route", "low_path"]
    );
    assert!(engine.record().get("high_path").is_none());
    let route = engine.record().get("route").unwrap();
    assert_eq!(route.signal.as_deref(), Some("low"));
    assert_eq!(route.output, None);
    // Signal listeners receive the router's input.
    assert_eq!(engine.record().get("low_path").unwrap().input, json!(60));
    assert_eq!(engine.state().get("lead_count").unwrap(), json!(2));
}

#[test]
fn route_to_high_path() {
    let mut engine = engine(lead_router());

    let outcome = engine.run(json!(["a", "b", "c"])).unwrap();

    assert_eq!(outcome.output, Some(json!("handled-high")));
    assert!(engine.record().get("low_path").is_none());
}

#[test]
fn small_batch_scores_low_and_takes_low_path() {
    let registry = PipelineBuilder::new()
        .start("fetch", |_| Ok(json!([1, 2, 3])))
        .listen("score", "fetch", |ctx| {
            Ok(json!(ctx.input().as_array().map_or(0, Vec::len)))
        })
        .router(
            "route",
            Trigger::OnStep("score".into()),
            &["low", "high"],
            |ctx| {
                let score = ctx.input().as_u64().unwrap_or(0);
                Ok(if score <= 5 { "low" } else { "high" }.to_string())
            },
        )
        .on_signal("low_path", "low", |_| Ok(json!("handled-low")))
        .on_signal("high_path", "high", |_| Ok(json!("handled-high")))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    let outcome = engine.run(Value::Null).unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.output, Some(json!("handled-low")));
    assert_eq!(outcome.final_step.as_deref(), Some("low_path"));
    assert_eq!(
        engine.record().step_names(),
        vec!["fetch", "score", "route", "low_path"]
    );
    assert_eq!(engine.record().get("score").unwrap().output, Some(json!(3)));
    assert!(engine.record().get("high_path").is_none());
}

fn join_with_delays(a_delay: u64, b_delay: u64) -> Engine {
    let registry = PipelineBuilder::new()
        .start("b", move |_| {
            thread::sleep(Duration::from_millis(b_delay));
            Ok(json!("B"))
        })
        .start("a", move |_| {
            thread::sleep(Duration::from_millis(a_delay));
            Ok(json!("A"))
        })
        .listen_all("join", &["a", "b"], |ctx| Ok(ctx.input().clone()))
        .build()
        .unwrap();
    Engine::new(
        registry,
        EngineOptions {
            parallel: true,
            ..Default::default()
        },
    )
    .unwrap()
}

#[test]
fn on_all_input_follows_registration_order() {
    let mut a_first = join_with_delays(0, 40);
    let mut b_first = join_with_delays(40, 0);

    let first = a_first.run(Value::Null).unwrap();
    let second = b_first.run(Value::Null).unwrap();

    assert_eq!(first.output, Some(json!(["B", "A"])));
    assert_eq!(first.output, second.output);
}

#[test]
fn on_all_input_ignores_listed_order_when_sequential() {
    let registry = PipelineBuilder::new()
        .start("b", |_| Ok(json!("B")))
        .start("a", |_| Ok(json!("A")))
        .listen_all("join", &["a", "b"], |ctx| Ok(ctx.input().clone()))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    engine.run(Value::Null).unwrap();

    assert_eq!(engine.record().get("join").unwrap().input, json!(["B", "A"]));
}

#[test]
fn on_all_waits_for_every_dependency() {
    let registry = PipelineBuilder::new()
        .start("left", |_| Ok(json!(1)))
        .listen("middle", "left", |_| Ok(json!(2)))
        .listen_all("join", &["middle", "left"], |ctx| Ok(ctx.input().clone()))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    engine.run(Value::Null).unwrap();

    assert_eq!(
        engine.record().step_names(),
        vec!["left", "middle", "join"]
    );
    assert_eq!(engine.record().get("join").unwrap().input, json!([1, 2]));
}

#[test]
fn on_any_fires_once_with_first_output() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let registry = PipelineBuilder::new()
        .start("a", |_| Ok(json!("from-a")))
        .start("b", |_| Ok(json!("from-b")))
        .listen_any("either", &["a", "b"], move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ctx.input().clone())
        })
        .build()
        .unwrap();
    let mut engine = engine(registry);

    engine.run(Value::Null).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.record().get("either").unwrap().input, json!("from-a"));
}

#[test]
fn on_any_takes_queue_order_in_parallel() {
    let registry = PipelineBuilder::new()
        .start("slow", |_| {
            thread::sleep(Duration::from_millis(40));
            Ok(json!("from-slow"))
        })
        .start("fast", |_| Ok(json!("from-fast")))
        .listen_any("either", &["fast", "slow"], |ctx| Ok(ctx.input().clone()))
        .build()
        .unwrap();
    let mut engine = Engine::new(
        registry,
        EngineOptions {
            parallel: true,
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = engine.run(Value::Null).unwrap();

    assert_eq!(outcome.output, Some(json!("from-slow")));
    assert_eq!(
        engine.record().step_names(),
        vec!["slow", "fast", "either"]
    );
}

#[test]
fn invalid_signal_aborts_and_keeps_history() {
    let registry = PipelineBuilder::new()
        .start("fetch", |ctx| {
            ctx.state().set("fetched", json!(true));
            Ok(json!(5))
        })
        .router("route", Trigger::OnStep("fetch".into()), &["low", "high"], |_| {
            Ok("medium".to_string())
        })
        .on_signal("low_path", "low", |_| Ok(json!(null)))
        .on_signal("high_path", "high", |_| Ok(json!(null)))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    let err = engine.run(Value::Null).unwrap_err();

    match err {
        FlowError::InvalidSignal {
            step,
            signal,
            allowed,
        } => {
            assert_eq!(step, "route");
            assert_eq!(signal, "medium");
            assert_eq!(allowed, vec!["low", "high"]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(engine.record().step_names(), vec!["fetch", "route"]);
    assert_eq!(engine.record().get("route").unwrap().status, StepStatus::Failed);
    assert_eq!(engine.state().get("fetched").unwrap(), json!(true));
}

#[test]
fn duplicate_registration_is_rejected() {
    let err = PipelineBuilder::new()
        .start("fetch", |_| Ok(json!(1)))
        .start("fetch", |_| Ok(json!(2)))
        .build()
        .unwrap_err();

    assert!(matches!(&err, FlowError::DuplicateStep { name } if name == "fetch"));
    assert!(err.is_registration_error());
}

#[test]
fn cycles_are_rejected_at_build() {
    let err = PipelineBuilder::new()
        .start("seed", |_| Ok(json!(1)))
        .listen_any("a", &["seed", "b"], |_| Ok(json!(1)))
        .listen("b", "a", |_| Ok(json!(1)))
        .build()
        .unwrap_err();

    assert!(matches!(err, FlowError::CyclicDependency { .. }));
}

#[test]
fn step_failure_aborts_with_cause() {
    let registry = PipelineBuilder::new()
        .start("fetch", |_| Err(anyhow::anyhow!("connection refused")))
        .listen("score", "fetch", |_| Ok(json!(1)))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    let err = engine.run(Value::Null).unwrap_err();

    assert_eq!(err.step(), Some("fetch"));
    assert_eq!(err.to_string(), "Step 'fetch' failed: connection refused");
    assert_eq!(engine.record().len(), 1);
}

#[test]
fn panicking_step_fails_the_run() {
    let registry = PipelineBuilder::new()
        .start("fetch", |_| Ok(json!([1, 2, 3])))
        .listen("boom", "fetch", |_| panic!("score table missing"))
        .listen("report", "boom", |_| Ok(json!("never")))
        .build()
        .unwrap();
    let mut engine = engine(registry);

    let err = engine.run(Value::Null).unwrap_err();

    assert!(matches!(&err, FlowError::StepExecution { step, .. } if step == "boom"));
    assert_eq!(
        err.to_string(),
        "Step 'boom' failed: step panicked: score table missing"
    );
    assert_eq!(engine.record().step_names(), vec!["fetch", "boom"]);
    assert_eq!(engine.record().get("boom").unwrap().status, StepStatus::Failed);
}

#[test]
fn panics_are_reported_the_same_with_a_timeout() {
    let registry = PipelineBuilder::new()
        .start("boom", |_| panic!("score table missing"))
        .build()
        .unwrap();
    let mut engine = Engine::new(
        registry,
        EngineOptions {
            step_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
    )
    .unwrap();

    let err = engine.run(Value::Null).unwrap_err();

    assert_eq!(
        err.to_string(),
        "Step 'boom' failed: step panicked: score table missing"
    );
}

#[test]
fn panics_in_a_parallel_wave_fail_the_run() {
    let registry = PipelineBuilder::new()
        .start("fine", |_| Ok(json!("ok")))
        .start("boom", |_| panic!("score table missing"))
        .build()
        .unwrap();
    let mut engine = Engine::new(
        registry,
        EngineOptions {
            parallel: true,
            ..Default::default()
        },
    )
    .unwrap();

    let err = engine.run(Value::Null).unwrap_err();

    assert!(matches!(&err, FlowError::StepExecution { step, .. } if step == "boom"));
    assert_eq!(engine.record().step_names(), vec!["fine", "boom"]);
}

#[test]
fn continue_on_error_skips_dependents() {
    let registry = PipelineBuilder::new()
        .start("broken", |_| Err(anyhow::anyhow!("boom")))
        .start("healthy", |_| Ok(json!("ok")))
        .listen("after_broken", "broken", |_| Ok(json!("never")))
        .listen("after_healthy", "healthy", |ctx| Ok(ctx.input().clone()))
        .build()
        .unwrap();
    let mut engine = Engine::new(
        registry,
        EngineOptions {
            continue_on_error: true,
            ..Default::default()
        },
    )
    .unwrap();

    let outcome = engine.run(Value::Null).unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.failed, vec!["broken"]);
    assert_eq!(
        engine.record().step_names(),
        vec!["broken", "healthy", "after_healthy"]
    );
    assert_eq!(outcome.output, Some(json!("ok")));
}

#[test]
fn timeout_is_reported() {
    let registry = PipelineBuilder::new()
        .start("slow", |ctx| {
            while !ctx.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Ok(json!("late"))
        })
        .build()
        .unwrap();
    let mut engine = Engine::new(
        registry,
        EngineOptions {
            step_timeout: Some(Duration::from_millis(30)),
            ..Default::default()
        },
    )
    .unwrap();

    let err = engine.run(Value::Null).unwrap_err();

    assert!(matches!(err, FlowError::StepTimeout { ref step, .. } if step == "slow"));
    assert_eq!(engine.record().entries()[0].status, StepStatus::TimedOut);
}

#[test]
fn parallel_matches_sequential_record() {
    let build = || {
        PipelineBuilder::new()
            .start("fetch", |_| Ok(json!([1, 2, 3])))
            .listen("store", "fetch", |ctx| Ok(ctx.input().clone()))
            .listen("filter", "fetch", |ctx| Ok(ctx.input().clone()))
            .listen_all("log", &["filter", "store"], |_| Ok(json!("logged")))
            .build()
            .unwrap()
    };

    let mut sequential = Engine::new(build(), EngineOptions::default()).unwrap();
    let mut parallel = Engine::new(
        build(),
        EngineOptions {
            parallel: true,
            max_parallel: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let a = sequential.run(Value::Null).unwrap();
    let b = parallel.run(Value::Null).unwrap();

    assert_eq!(
        sequential.record().step_names(),
        parallel.record().step_names()
    );
    assert_eq!(a.output, b.output);
    assert_eq!(a.fingerprint, b.fingerprint);
}

#[test]
fn progress_reports_every_step() {
    let mut engine = engine(lead_router());
    let mut events = Vec::new();

    engine
        .run_with_progress(json!(["x"]), |progress| match progress {
            RunProgress::StepStarting { name, .. } => events.push(format!("start {}", name)),
            RunProgress::StepFinished { entry } => events.push(format!("done {}", entry.step)),
            RunProgress::SignalEmitted { signal, .. } => events.push(format!("signal {}", signal)),
        })
        .unwrap();

    assert_eq!(
        events,
        vec![
            "start fetch",
            "done fetch",
            "start score",
            "done score",
            "start route",
            "signal low",
            "done route",
            "start low_path",
            "done low_path",
        ]
    );
}

#[test]
fn engines_run_independently() {
    let handles: Vec<_> = (0..3)
        .map(|i| {
            thread::spawn(move || {
                let mut engine = engine(lead_router());
                let leads: Vec<Value> = (0..i + 1).map(|n| json!(n)).collect();
                engine.run(Value::Array(leads)).unwrap().output
            })
        })
        .collect();

    let outputs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(
        outputs,
        vec![
            Some(json!("handled-low")),
            Some(json!("handled-low")),
            Some(json!("handled-high")),
        ]
    );
}
