use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use futures::{future::BoxFuture, FutureExt};
use tsplay::{
    config::ExecutionSettings,
    driver::{ErrorKind, ExecutionOutcome, RunState, NO_OUTPUT},
    network::{FetchCapability, FetchRequest, FetchResponse, MOCK_PAYLOAD},
    playground::Playground,
    transform::TransformPath,
};

/// Records every URL and answers with a fixed body.
#[derive(Default)]
struct RecordingFetch {
    seen: Mutex<Vec<String>>,
}

impl FetchCapability for RecordingFetch {
    fn fetch(&self, request: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        self.seen.lock().unwrap().push(request.url);
        async { Ok(FetchResponse { status: 200, body: r#"{"setup":"S","punchline":"P"}"#.into() }) }.boxed()
    }
}

/// A network that accepts requests and never answers.
struct HangingFetch;

impl FetchCapability for HangingFetch {
    fn fetch(&self, _: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
        futures::future::pending().boxed()
    }
}

fn settings() -> ExecutionSettings {
    ExecutionSettings {
        settle_delay: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
        max_wait: Duration::from_millis(600),
        ..ExecutionSettings::default()
    }
}

fn playground() -> (Playground, Arc<RecordingFetch>) {
    let fetch = Arc::new(RecordingFetch::default());
    (Playground::new(settings(), fetch.clone()), fetch)
}

fn success(outcome: &ExecutionOutcome) -> &str {
    match outcome {
        ExecutionOutcome::Success(text) => text,
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logs_are_captured_in_order() {
    let (pg, _) = playground();
    let src = "const xs: number[] = [1, 2, 3];\nconst who: string = 'ts';\nconsole.log('hello', who);\nconsole.log(xs);\nconsole.log({ a: 1 });";
    let report = pg.execute(src).await;
    assert_eq!(report.path, TransformPath::PlainStrip);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(success(&report.outcome), "hello ts\n[1, 2, 3]\n{\n  \"a\": 1\n}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_script_reports_no_output() {
    let (pg, _) = playground();
    let report = pg.execute("let n: number = 1;\nn += 1;").await;
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(success(&report.outcome), NO_OUTPUT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thrown_error_fails_the_run_and_keeps_logs() {
    let (pg, _) = playground();
    let src = "const label: string = 'before';\nconsole.log(label);\nthrow new Error('boom');";
    let report = pg.execute(src).await;
    assert_eq!(report.state, RunState::Errored);
    assert_eq!(report.error_kind, Some(ErrorKind::Execution));
    assert_eq!(report.outcome, ExecutionOutcome::Failure("boom".into()));
    assert_eq!(report.log, vec!["before", "Error: boom"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn syntax_error_is_a_failure() {
    let (pg, _) = playground();
    let report = pg.execute("let a: number = ;").await;
    assert_eq!(report.state, RunState::Errored);
    assert!(matches!(report.outcome, ExecutionOutcome::Failure(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn never_settling_script_times_out_with_partial_output() {
    let (pg, _) = playground();
    let src = "const msg: string = 'partial';\nconsole.log(msg);\nawait new Promise(() => {});";
    let report = pg.execute(src).await;
    assert!(report.timed_out());
    assert_eq!(success(&report.outcome), "partial");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_loop_is_interrupted() {
    let (pg, _) = playground();
    let report = pg.execute("let i: number = 0;\nwhile (true) { i++; }").await;
    assert!(report.timed_out());
    assert_eq!(success(&report.outcome), NO_OUTPUT);
    assert!(report.elapsed < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timers_run_before_completion() {
    let (pg, _) = playground();
    let src = "setTimeout(() => console.log('late'), 5);\nconsole.log('early');";
    let report = pg.execute(src).await;
    assert_eq!(success(&report.outcome), "early\nlate");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn class_with_parameter_properties() {
    let (pg, _) = playground();
    let src = r#"class Point {
  constructor(public x: number, private y: number) {}
  sum(): number { return this.x + this.y; }
}
const p = new Point(3, 4);
console.log(p.x, p.y, p.sum());"#;
    let report = pg.execute(src).await;
    assert_eq!(report.path, TransformPath::ClassAware);
    assert_eq!(success(&report.outcome), "3 4 7");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn derived_class_runs() {
    let (pg, _) = playground();
    let src = r#"abstract class Animal {
  protected name: string;
  constructor(name: string) { this.name = name; }
  abstract sound(): string;
  speak(): string { return `${this.name} says ${this.sound()}`; }
}
class Dog extends Animal implements Object {
  constructor(name: string, private readonly tricks: number) {
    super(name);
  }
  sound(): string { return 'woof'; }
  count(): number { return this.tricks; }
}
const d = new Dog('Rex', 2);
console.log(d.speak(), d.count());"#;
    let report = pg.execute(src).await;
    assert_eq!(report.path, TransformPath::ClassAware);
    assert_eq!(success(&report.outcome), "Rex says woof 2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_allow_listed_fetch_is_mocked() {
    let (pg, fetch) = playground();
    let src = r#"async function load(): Promise<void> {
  const res = await fetch('https://example.com/data');
  const body = await res.json();
  console.log(res.ok, body.message);
}
await load();"#;
    let report = pg.execute(src).await;
    let mock: serde_json::Value = serde_json::from_str(MOCK_PAYLOAD).unwrap();
    assert_eq!(success(&report.outcome), format!("true {}", mock["message"].as_str().unwrap()));
    assert!(fetch.seen.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn allow_listed_fetch_reaches_the_network() {
    let (pg, fetch) = playground();
    let src = r#"async function load() {
  const res = await fetch('https://official-joke-api.appspot.com/jokes/ten');
  const body = await res.json();
  console.log(body.setup);
}
await load();"#;
    let report = pg.execute(src).await;
    assert_eq!(success(&report.outcome), "S");
    assert_eq!(
        fetch.seen.lock().unwrap().clone(),
        vec!["https://official-joke-api.appspot.com/jokes/ten"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn untyped_greet_takes_the_shortcut() {
    let (pg, _) = playground();
    let src = "const greet = (name) => {\n  return `Hello, ${name}!`;\n};\nconsole.log(greet('Bob'));";
    let report = pg.execute(src).await;
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(success(&report.outcome), "Hello, Bob!");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lone_console_log_passes_through() {
    let (pg, _) = playground();
    let report = pg.execute("console.log('plain', 1 + 1)").await;
    assert_eq!(report.path, TransformPath::PassThrough);
    assert_eq!(success(&report.outcome), "plain 2");

    let report = pg.execute("console.log(nothing)").await;
    assert_eq!(report.state, RunState::Errored);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pass_through_runs_its_timers() {
    let (pg, _) = playground();
    let report = pg.execute("console.log('a'); setTimeout(() => console.log('b'), 5)").await;
    assert_eq!(report.path, TransformPath::PassThrough);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(success(&report.outcome), "a\nb");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hung_fetch_times_out_with_partial_output() {
    let settings = ExecutionSettings { max_wait: Duration::from_millis(500), ..settings() };
    let pg = Playground::new(settings, Arc::new(HangingFetch));
    let src = r#"async function load(): Promise<void> {
  console.log('before');
  await fetch('https://official-joke-api.appspot.com/random_joke');
  console.log('after');
}
await load();"#;
    let report = pg.execute(src).await;
    assert!(report.timed_out(), "{:?}", report.state);
    assert_eq!(success(&report.outcome), "before");
    assert!(report.elapsed < Duration::from_secs(5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conditional_with_call_is_not_an_arrow() {
    let (pg, _) = playground();
    let src = "const y: boolean = true;\nconst g = (h: number) => () => h;\nconst t = y ? g(1) : i => i;\nconsole.log(t());";
    let report = pg.execute(src).await;
    assert_eq!(success(&report.outcome), "1");
}
