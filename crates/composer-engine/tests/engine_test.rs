use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use composer_cache::{CacheStore, InMemoryCacheStore, ManualClock};
use composer_config::{ApplicationDef, ComponentDef, CompositeDef};
use composer_engine::{
  ChannelNotifier, Engine, EngineConfig, ExecutionEvent, MAX_CONCURRENT_ITERATIONS, NoopNotifier,
  RunOutcome, RunReport,
};
use composer_graph::{Application, Component, ComponentRef};
use composer_registry::{
  Behavior, Branches, ComponentTypeRegistry, DisconnectedDispatcher, Dispatcher, ExecutionContext,
  FailureCause, Outcome, Services, StepResult,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const T0: u64 = 1_700_000_000_000;

/// Per-component invocation counts.
#[derive(Clone, Default)]
struct Hits(Arc<Mutex<HashMap<String, usize>>>);

impl Hits {
  fn of(&self, component: &str) -> usize {
    self.0.lock().unwrap().get(component).copied().unwrap_or(0)
  }
}

/// Counts its invocations and passes the value along `next`.
struct Counter(Hits);

#[async_trait]
impl Behavior for Counter {
  async fn evaluate(
    &self,
    component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    let Counter(Hits(hits)) = self;
    *hits
      .lock()
      .unwrap()
      .entry(component.reference.to_string())
      .or_default() += 1;
    Outcome::next(ctx.value().clone())
  }
}

/// Tracks how many evaluations are in flight at once.
#[derive(Clone, Default)]
struct Gauge(Arc<Mutex<(usize, usize)>>);

impl Gauge {
  fn peak(&self) -> usize {
    self.0.lock().unwrap().1
  }
}

#[async_trait]
impl Behavior for Gauge {
  async fn evaluate(
    &self,
    _component: &Component,
    ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    {
      let mut counts = self.0.lock().unwrap();
      counts.0 += 1;
      counts.1 = counts.1.max(counts.0);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    self.0.lock().unwrap().0 -= 1;
    Outcome::next(ctx.value().clone())
  }
}

/// Always fails.
struct Failing;

#[async_trait]
impl Behavior for Failing {
  async fn evaluate(
    &self,
    component: &Component,
    _ctx: &mut ExecutionContext,
    _branches: &dyn Branches,
  ) -> Outcome {
    Outcome::Fail(FailureCause::Component {
      component: component.reference.to_string(),
      message: "boom".to_string(),
    })
  }
}

/// Records every invocation and answers with the input wrapped.
#[derive(Default)]
struct RecordingDispatcher {
  calls: Mutex<Vec<(String, String, Value)>>,
}

impl RecordingDispatcher {
  fn calls(&self) -> Vec<(String, String, Value)> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
  async fn invoke(&self, isolate: &str, component: &ComponentRef, value: Value) -> Outcome {
    self
      .calls
      .lock()
      .unwrap()
      .push((isolate.to_string(), component.to_string(), value.clone()));
    Outcome::next(json!({ "handledBy": isolate, "input": value }))
  }
}

/// Never answers in time.
struct SlowDispatcher;

#[async_trait]
impl Dispatcher for SlowDispatcher {
  async fn invoke(&self, _isolate: &str, _component: &ComponentRef, value: Value) -> Outcome {
    tokio::time::sleep(Duration::from_secs(60)).await;
    Outcome::next(value)
  }
}

struct Harness {
  engine: Engine,
  cache: Arc<InMemoryCacheStore>,
  clock: ManualClock,
  hits: Hits,
  gauge: Gauge,
}

impl Harness {
  fn new() -> Self {
    Self::with(EngineConfig::default(), Arc::new(DisconnectedDispatcher))
  }

  fn with(config: EngineConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
    let cache = Arc::new(InMemoryCacheStore::new());
    let clock = ManualClock::new(T0);
    let services = Services::new(cache.clone(), Arc::new(clock.clone()), dispatcher.clone());

    let hits = Hits::default();
    let gauge = Gauge::default();
    let mut registry = ComponentTypeRegistry::with_builtins(&services);
    registry.register("counter", Arc::new(Counter(hits.clone())));
    registry.register("gauge", Arc::new(gauge.clone()));
    registry.register("fail", Arc::new(Failing));

    Self {
      engine: Engine::with_notifier(config, registry, dispatcher, NoopNotifier),
      cache,
      clock,
      hits,
      gauge,
    }
  }

  fn load(&self, components: Vec<ComponentDef>) -> Application {
    self
      .engine
      .load(ApplicationDef::new(
        "app",
        vec![CompositeDef::new("main", components)],
      ))
      .unwrap()
  }

  async fn run(&self, app: &Application, value: Value) -> RunReport {
    self
      .engine
      .run_entry(app, value, CancellationToken::new())
      .await
      .unwrap()
  }
}

fn entry(next: &str) -> ComponentDef {
  ComponentDef::new("entry", "test-entry").with_wire("next", next)
}

fn end(name: &str) -> ComponentDef {
  ComponentDef::new(name, "test-end")
}

fn map_component(name: &str, component_type: &str) -> ComponentDef {
  ComponentDef::new(name, component_type)
    .with_property("channelName", "carts")
    .with_property("channelEntryName", "latest")
}

// fall-back

#[tokio::test]
async fn test_fall_back_runs_second_once_when_next_fails() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("guard"),
    ComponentDef::new("guard", "fall-back")
      .with_wire("next", "broken")
      .with_wire("second", "alt"),
    ComponentDef::new("broken", "fail"),
    ComponentDef::new("alt", "counter").with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!({"cart": 1})).await;

  assert_eq!(report.value(), Some(&json!({"cart": 1})));
  assert_eq!(h.hits.of("main.alt"), 1);
  assert!(report.caught.is_empty());
}

#[tokio::test]
async fn test_fall_back_never_runs_second_when_next_succeeds() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("guard"),
    ComponentDef::new("guard", "fall-back")
      .with_wire("next", "primary")
      .with_wire("second", "alt"),
    ComponentDef::new("primary", "counter").with_wire("next", "done"),
    ComponentDef::new("alt", "counter"),
    end("done"),
  ]);

  let report = h.run(&app, json!(1)).await;

  assert!(report.is_success());
  assert_eq!(h.hits.of("main.primary"), 1);
  assert_eq!(h.hits.of("main.alt"), 0);
  assert!(!report.trace.visited().contains(&"main.alt".to_string()));
}

#[tokio::test]
async fn test_fall_back_failure_when_both_branches_fail() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("guard"),
    ComponentDef::new("guard", "fall-back")
      .with_wire("next", "first")
      .with_wire("second", "other"),
    ComponentDef::new("first", "fail"),
    ComponentDef::new("other", "fail"),
  ]);

  let report = h.run(&app, json!(null)).await;

  match &report.outcome {
    RunOutcome::Failure { cause, trace } => {
      assert_eq!(
        cause,
        &FailureCause::Component {
          component: "main.other".to_string(),
          message: "boom".to_string(),
        }
      );
      assert_eq!(
        trace.visited(),
        vec!["main.entry", "main.guard", "main.first", "main.other"]
      );
    }
    other => panic!("expected failure, got {:?}", other),
  }
}

#[test]
fn test_fall_back_requires_second_wire() {
  let h = Harness::new();
  let err = h
    .engine
    .load(ApplicationDef::new(
      "app",
      vec![CompositeDef::new(
        "main",
        vec![
          entry("guard"),
          ComponentDef::new("guard", "fall-back").with_wire("next", "done"),
          end("done"),
        ],
      )],
    ))
    .unwrap_err();
  assert!(err.to_string().contains("main.guard"));
}

// exception-catcher

#[tokio::test]
async fn test_catcher_absorbs_failure_deep_in_subgraph() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("safe"),
    ComponentDef::new("safe", "exception-catcher").with_wire("next", "step"),
    ComponentDef::new("step", "counter").with_wire("next", "broken"),
    ComponentDef::new("broken", "fail"),
  ]);

  let report = h.run(&app, json!({"cart": "c1"})).await;

  assert_eq!(report.value(), Some(&json!({"cart": "c1"})));
  assert_eq!(report.caught.len(), 1);
  assert_eq!(report.caught[0].catcher, ComponentRef::new("main", "safe"));
  assert!(matches!(
    report.caught[0].cause,
    FailureCause::Component { .. }
  ));
  assert_eq!(h.hits.of("main.step"), 1);
}

#[tokio::test]
async fn test_catcher_lets_cycles_through() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("safe"),
    ComponentDef::new("safe", "exception-catcher").with_wire("next", "a"),
    ComponentDef::new("a", "counter").with_wire("next", "b"),
    ComponentDef::new("b", "counter").with_wire("next", "a"),
  ]);

  let report = h.run(&app, json!(1)).await;

  assert_eq!(
    report.cause(),
    Some(&FailureCause::GraphCycle {
      component: "main.a".to_string()
    })
  );
  assert!(report.caught.is_empty());
  assert_eq!(h.hits.of("main.a"), 1);
}

// cache

#[tokio::test]
async fn test_freshness_boundary() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("recent"),
    map_component("recent", "get-cache-if-recent")
      .with_property("maxCacheAge", 5000)
      .with_wire("next", "done"),
    end("done"),
  ]);
  h.cache.put("carts", "latest", json!({"id": 7}), T0).await;

  h.clock.set(T0 + 4999);
  let fresh = h.run(&app, json!(null)).await;
  assert_eq!(fresh.value(), Some(&json!({"id": 7})));

  h.clock.set(T0 + 5001);
  let stale = h.run(&app, json!(null)).await;
  assert_eq!(
    stale.cause(),
    Some(&FailureCause::CacheStaleOrMissing {
      channel: "carts".to_string(),
      entry: "latest".to_string(),
      age_ms: Some(5001),
    })
  );
}

#[tokio::test]
async fn test_recent_with_own_second_wire() {
  let h = Harness::new();
  let app = h.load(vec![
    entry("recent"),
    map_component("recent", "get-cache-if-recent")
      .with_property("maxCacheAge", "1000")
      .with_wire("next", "done")
      .with_wire("second", "refresh"),
    ComponentDef::new("refresh", "counter").with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!({"input": true})).await;

  assert_eq!(report.value(), Some(&json!({"input": true})));
  assert_eq!(h.hits.of("main.refresh"), 1);
}

#[tokio::test]
async fn test_store_cache_is_idempotent() {
  let h = Harness::new();
  let store = h.load(vec![
    entry("store"),
    map_component("store", "store-cache").with_wire("next", "done"),
    end("done"),
  ]);
  let read = h.load(vec![
    entry("read"),
    map_component("read", "get-cache").with_wire("next", "done"),
    end("done"),
  ]);

  h.run(&store, json!({"v": 1})).await;
  h.clock.advance(10);
  h.run(&store, json!({"v": 1})).await;

  let cached = h.cache.get("carts", "latest").await.unwrap();
  assert_eq!(cached.value, json!({"v": 1}));
  assert_eq!(cached.timestamp, T0 + 10);
  assert_eq!(h.cache.len(), 1);

  h.run(&store, json!({"v": 2})).await;
  let report = h.run(&read, json!(null)).await;
  assert_eq!(report.value(), Some(&json!({"v": 2})));
}

#[tokio::test]
async fn test_queue_channel_store_and_peek() {
  let h = Harness::new();
  let store = h.load(vec![
    entry("push"),
    ComponentDef::new("push", "store-cache")
      .with_property("channelName", "pending")
      .with_property("channelType", "queue"),
  ]);
  let peek = h.load(vec![
    entry("head"),
    ComponentDef::new("head", "get-cache")
      .with_property("channelName", "pending")
      .with_property("channelType", "queue"),
  ]);

  h.run(&store, json!({"cartId": "a"})).await;
  h.run(&store, json!({"cartId": "b"})).await;

  let report = h.run(&peek, json!(null)).await;
  assert_eq!(report.value(), Some(&json!({"cartId": "a"})));
  assert_eq!(h.cache.queue_len("pending"), 2);
}

// sample pipeline

const SAMPLE: &str = r#"{
  "name": "application",
  "composites": [
    {
      "name": "entry",
      "components": [
        { "name": "entry-point", "type": "test-entry", "wires": { "next": "main.fall-back" } }
      ]
    },
    {
      "name": "main",
      "components": [
        {
          "name": "fall-back",
          "type": "fall-back",
          "wires": { "next": "normal.get-recent", "second": "backup.get-cache" }
        }
      ]
    },
    {
      "name": "normal",
      "components": [
        {
          "name": "get-recent",
          "type": "get-cache-if-recent",
          "properties": { "channelName": "carts", "channelEntryName": "latest", "maxCacheAge": 5000 },
          "wires": { "next": "store" }
        },
        {
          "name": "store",
          "type": "store-cache",
          "properties": { "channelName": "carts", "channelEntryName": "latest" },
          "wires": { "next": "catcher" }
        },
        { "name": "catcher", "type": "exception-catcher", "wires": { "next": "end" } },
        { "name": "end", "type": "test-end" }
      ]
    },
    {
      "name": "backup",
      "components": [
        {
          "name": "get-cache",
          "type": "get-cache",
          "properties": { "channelName": "carts", "channelEntryName": "latest" }
        }
      ]
    }
  ]
}"#;

const SEED: &str = r#"{
  "name": "seed",
  "components": [
    { "name": "start", "type": "test-entry", "wires": { "next": "store" } },
    {
      "name": "store",
      "type": "store-cache",
      "properties": { "channelName": "carts", "channelEntryName": "latest" }
    }
  ]
}"#;

fn load_json(h: &Harness, text: &str) -> Application {
  h.engine
    .load(ApplicationDef::from_json(text).unwrap())
    .unwrap()
}

#[tokio::test]
async fn test_sample_without_cache_fails_with_miss() {
  let h = Harness::new();
  let app = load_json(&h, SAMPLE);

  let report = h.run(&app, json!({"request": 1})).await;

  assert_eq!(
    report.cause(),
    Some(&FailureCause::CacheMiss {
      channel: "carts".to_string(),
      entry: "latest".to_string(),
    })
  );
  let visited = report.trace.visited();
  assert!(visited.contains(&"normal.get-recent".to_string()));
  assert_eq!(visited.last().map(String::as_str), Some("backup.get-cache"));
}

#[tokio::test]
async fn test_sample_with_fresh_cache_succeeds() {
  let h = Harness::new();
  let app = load_json(&h, SAMPLE);
  let seed = load_json(&h, SEED);

  h.run(&seed, json!({"cartId": "c1"})).await;
  h.clock.advance(1000);
  let report = h.run(&app, json!({"request": 1})).await;

  assert_eq!(report.value(), Some(&json!({"cartId": "c1"})));
  assert_eq!(
    report.trace.visited(),
    vec![
      "entry.entry-point",
      "main.fall-back",
      "normal.get-recent",
      "normal.store",
      "normal.catcher",
      "normal.end",
    ]
  );
  let stored = h.cache.get("carts", "latest").await.unwrap();
  assert_eq!(stored.timestamp, T0 + 1000);
}

// queue handler

fn queue_handler(timeout: u64) -> ComponentDef {
  ComponentDef::new("carts", "cache-queue-handler")
    .with_property("cacheChannel", "pending")
    .with_property("cartIdKey", "cartId")
    .with_property("cartLinesKey", "lines")
    .with_property("timeout", timeout)
    .with_wire("next", "done")
}

#[tokio::test(start_paused = true)]
async fn test_queue_handler_times_out() {
  let h = Harness::new();
  let app = h.load(vec![entry("carts"), queue_handler(3000), end("done")]);

  let started = tokio::time::Instant::now();
  let report = h.run(&app, json!(null)).await;
  let elapsed = started.elapsed();

  assert_eq!(
    report.cause(),
    Some(&FailureCause::Timeout {
      component: "main.carts".to_string(),
      after_ms: 3000,
    })
  );
  assert!(elapsed >= Duration::from_millis(3000));
  assert!(elapsed < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn test_queue_handler_takes_matching_cart() {
  let h = Harness::new();
  let app = h.load(vec![entry("carts"), queue_handler(3000), end("done")]);
  h.cache.enqueue("pending", json!({"other": 1})).await;
  h.cache
    .enqueue("pending", json!({"cartId": "c9", "lines": [{"sku": "x"}], "extra": true}))
    .await;

  let report = h.run(&app, json!(null)).await;

  assert_eq!(
    report.value(),
    Some(&json!({"cartId": "c9", "lines": [{"sku": "x"}]}))
  );
  assert_eq!(h.cache.queue_len("pending"), 0);
}

// iterations

#[tokio::test]
async fn test_iterations_fan_out_and_aggregate() {
  let h = Harness::new();
  let app = h.load(vec![
    ComponentDef::new("entry", "test-entry")
      .with_property("nbIterations", "3")
      .with_wire("next", "work"),
    ComponentDef::new("work", "counter").with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!("x")).await;

  assert_eq!(report.value(), Some(&json!(["x", "x", "x"])));
  assert_eq!(h.hits.of("main.work"), 3);
  assert_eq!(report.trace.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_iterations_beyond_concurrency_limit() {
  let count = MAX_CONCURRENT_ITERATIONS * 3 + 4;
  let h = Harness::new();
  let app = h.load(vec![
    ComponentDef::new("entry", "test-entry")
      .with_property("nbIterations", count as u64)
      .with_wire("next", "work"),
    ComponentDef::new("work", "gauge").with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!(1)).await;

  assert_eq!(report.value(), Some(&Value::Array(vec![json!(1); count])));
  assert_eq!(h.gauge.peak(), MAX_CONCURRENT_ITERATIONS);
}

#[tokio::test]
async fn test_iterations_report_first_failure() {
  let h = Harness::new();
  let app = h.load(vec![
    ComponentDef::new("entry", "test-entry")
      .with_property("nbIterations", 2)
      .with_wire("next", "broken"),
    ComponentDef::new("broken", "fail"),
  ]);

  let report = h.run(&app, json!(null)).await;
  assert!(matches!(
    report.cause(),
    Some(FailureCause::Component { component, .. }) if component == "main.broken"
  ));
}

// isolates

#[tokio::test]
async fn test_remote_component_goes_through_dispatcher() {
  let dispatcher = Arc::new(RecordingDispatcher::default());
  let h = Harness::with(
    EngineConfig {
      local_isolate: Some("front".to_string()),
      ..EngineConfig::default()
    },
    dispatcher.clone(),
  );
  let app = h.load(vec![
    entry("pricing").on_isolate("front"),
    ComponentDef::new("pricing", "counter")
      .on_isolate("back")
      .with_wire("next", "done"),
    end("done").on_isolate("front"),
  ]);

  let report = h.run(&app, json!({"cart": 1})).await;

  assert_eq!(
    report.value(),
    Some(&json!({"handledBy": "back", "input": {"cart": 1}}))
  );
  assert_eq!(h.hits.of("main.pricing"), 0);
  assert_eq!(
    dispatcher.calls(),
    vec![(
      "back".to_string(),
      "main.pricing".to_string(),
      json!({"cart": 1})
    )]
  );
}

#[tokio::test]
async fn test_erp_caller_sends_method_and_payload() {
  let dispatcher = Arc::new(RecordingDispatcher::default());
  let h = Harness::with(EngineConfig::default(), dispatcher.clone());
  let app = h.load(vec![
    entry("erp"),
    ComponentDef::new("erp", "erp-caller")
      .on_isolate("erp-isolate")
      .with_property("method", "applyCart")
      .with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!({"cartId": "c1"})).await;

  assert!(report.is_success());
  let calls = dispatcher.calls();
  assert_eq!(calls.len(), 1);
  assert_eq!(calls[0].0, "erp-isolate");
  assert_eq!(
    calls[0].2,
    json!({"method": "applyCart", "payload": {"cartId": "c1"}})
  );
}

#[tokio::test(start_paused = true)]
async fn test_erp_caller_timeout() {
  let h = Harness::with(EngineConfig::default(), Arc::new(SlowDispatcher));
  let app = h.load(vec![
    entry("erp"),
    ComponentDef::new("erp", "erp-caller")
      .with_property("method", "applyCart")
      .with_property("timeout", 500),
  ]);

  let report = h.run(&app, json!(null)).await;

  assert_eq!(
    report.cause(),
    Some(&FailureCause::Timeout {
      component: "main.erp".to_string(),
      after_ms: 500,
    })
  );
}

#[tokio::test]
async fn test_transport_failure_falls_back() {
  let h = Harness::with(
    EngineConfig {
      local_isolate: Some("front".to_string()),
      ..EngineConfig::default()
    },
    Arc::new(DisconnectedDispatcher),
  );
  let app = h.load(vec![
    entry("guard"),
    ComponentDef::new("guard", "fall-back")
      .with_wire("next", "remote")
      .with_wire("second", "local"),
    ComponentDef::new("remote", "counter").on_isolate("back"),
    ComponentDef::new("local", "counter"),
  ]);

  let report = h.run(&app, json!(1)).await;

  assert!(report.is_success());
  assert_eq!(h.hits.of("main.local"), 1);
  let remote_step = report
    .trace
    .steps()
    .find(|step| step.component == ComponentRef::new("main", "remote"))
    .unwrap();
  assert!(matches!(
    remote_step.result,
    Some(StepResult::Failed {
      cause: FailureCause::Transport { .. }
    })
  ));
}

// run addressing

#[tokio::test]
async fn test_cancel_spawned_run() {
  let h = Harness::new();
  let app = Arc::new(h.load(vec![entry("carts"), queue_handler(60_000), end("done")]));
  let engine = Arc::new(h.engine);

  let handle = engine
    .spawn(
      app.clone(),
      &app.entry().reference,
      json!(null),
      CancellationToken::new(),
    )
    .unwrap();
  assert!(engine.active_runs().contains(&handle.run_id()));

  tokio::time::sleep(Duration::from_millis(20)).await;
  assert!(engine.cancel_run(handle.run_id()));

  let report = tokio::time::timeout(Duration::from_secs(5), handle.wait())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(report.cause(), Some(&FailureCause::Cancelled));
  assert!(engine.active_runs().is_empty());
}

#[tokio::test]
async fn test_cancelling_one_run_leaves_the_other_running() {
  let h = Harness::new();
  let app = Arc::new(h.load(vec![entry("carts"), queue_handler(60_000), end("done")]));
  let cache = h.cache.clone();
  let engine = Arc::new(h.engine);

  let spawn = || {
    engine
      .spawn(
        app.clone(),
        &app.entry().reference,
        json!(null),
        CancellationToken::new(),
      )
      .unwrap()
  };
  let cancelled = spawn();
  let waiting = spawn();
  assert_eq!(engine.active_runs().len(), 2);

  tokio::time::sleep(Duration::from_millis(20)).await;
  assert!(engine.cancel_run(cancelled.run_id()));
  let cancelled = tokio::time::timeout(Duration::from_secs(5), cancelled.wait())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(cancelled.cause(), Some(&FailureCause::Cancelled));
  assert_eq!(engine.active_runs(), vec![waiting.run_id()]);

  cache
    .enqueue("pending", json!({"cartId": "c1", "lines": []}))
    .await;
  let delivered = tokio::time::timeout(Duration::from_secs(5), waiting.wait())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(delivered.value(), Some(&json!({"cartId": "c1", "lines": []})));
  assert!(engine.active_runs().is_empty());
}

#[tokio::test]
async fn test_runs_have_distinct_ids() {
  let h = Harness::new();
  let app = h.load(vec![entry("done"), end("done")]);

  let first = h.run(&app, json!(1)).await;
  let second = h.run(&app, json!(1)).await;
  assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_trace_is_bounded() {
  let h = Harness::with(
    EngineConfig {
      trace_capacity: 2,
      ..EngineConfig::default()
    },
    Arc::new(DisconnectedDispatcher),
  );
  let app = h.load(vec![
    entry("a"),
    ComponentDef::new("a", "counter").with_wire("next", "b"),
    ComponentDef::new("b", "counter").with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!(1)).await;

  assert_eq!(report.trace.visited(), vec!["main.b", "main.done"]);
  assert_eq!(report.trace.dropped(), 2);
}

#[tokio::test]
async fn test_zero_trace_capacity_keeps_every_step() {
  let h = Harness::with(
    EngineConfig {
      trace_capacity: 0,
      ..EngineConfig::default()
    },
    Arc::new(DisconnectedDispatcher),
  );
  let app = h.load(vec![
    entry("a"),
    ComponentDef::new("a", "counter").with_wire("next", "b"),
    ComponentDef::new("b", "counter").with_wire("next", "done"),
    end("done"),
  ]);

  let report = h.run(&app, json!(1)).await;

  assert_eq!(report.trace.len(), 4);
  assert_eq!(report.trace.dropped(), 0);
  assert_eq!(
    report.trace.visited(),
    vec!["main.entry", "main.a", "main.b", "main.done"]
  );
}

#[tokio::test]
async fn test_events_are_emitted_in_order() {
  let services = Services::in_memory();
  let registry = ComponentTypeRegistry::with_builtins(&services);
  let (notifier, mut events) = ChannelNotifier::channel();
  let engine = Engine::with_notifier(
    EngineConfig::default(),
    registry,
    services.dispatcher.clone(),
    notifier,
  );
  let app = engine
    .load(ApplicationDef::new(
      "app",
      vec![CompositeDef::new("main", vec![entry("done"), end("done")])],
    ))
    .unwrap();

  let report = engine
    .run_entry(&app, json!(1), CancellationToken::new())
    .await
    .unwrap();

  let mut received = Vec::new();
  while let Ok(event) = events.try_recv() {
    assert_eq!(event.run_id(), report.run_id);
    received.push(event);
  }
  assert_eq!(received.len(), 6);
  assert!(matches!(received[0], ExecutionEvent::RunStarted { .. }));
  assert!(matches!(
    &received[1],
    ExecutionEvent::ComponentStarted { component, .. } if component.name == "entry"
  ));
  assert!(matches!(
    &received[4],
    ExecutionEvent::ComponentFinished { result: StepResult::Terminated, .. }
  ));
  assert!(matches!(received[5], ExecutionEvent::RunCompleted { .. }));
}
