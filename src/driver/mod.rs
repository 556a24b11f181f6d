//! Execution driver: runs a transformed script and reports its outcome.
//!
//! Each run gets a [`RunId`], a fresh engine and its own completion channel.
//! The driver polls that channel at a fixed interval; when the accumulated
//! wait reaches the configured maximum the run times out, the engine is
//! cancelled and whatever was captured is reported as output.

mod engine;
mod harness;

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::{
    runtime::Handle,
    sync::oneshot::{self, error::TryRecvError},
};
use tracing::{debug, info, warn};

use crate::{
    capture::CapturedLog,
    config::ExecutionSettings,
    network::{self, FetchCapability, InterceptingFetch},
    recognizer,
    transform::{TransformPath, TransformResult},
};

use engine::{CancelFlag, Completion, CompletionSlot, DirectJob, DirectOutcome, EngineJob};

/// Output reported when a run completes without logging anything.
pub const NO_OUTPUT: &str = "No output (execution completed)";

const GREET_BINDING: &str = "const greet";
const GREET_TEMPLATE: &str = "return `Hello, ${name}!`";

static GREET_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"greet\(["'](.+?)["']\)"#).unwrap());
static USER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"const\s+userName\s*=\s*["'](.+?)["']"#).unwrap());

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Identifies one execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    pub fn next() -> Self {
        RunId(NEXT_RUN.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Errored,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Errored | RunState::TimedOut)
    }

    /// Allowed transitions: Idle to Running, Running to any terminal state.
    pub fn permits(self, next: RunState) -> bool {
        match self {
            RunState::Idle => next == RunState::Running,
            RunState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(String),
    Failure(String),
    /// The run has not signalled yet.
    Pending,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Success(text) | ExecutionOutcome::Failure(text) => Some(text),
            ExecutionOutcome::Pending => None,
        }
    }
}

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The script threw, failed to parse, or the engine could not run it.
    Execution,
    /// The one real external call failed.
    Network,
}

/// Final record of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub path: TransformPath,
    pub state: RunState,
    pub outcome: ExecutionOutcome,
    pub error_kind: Option<ErrorKind>,
    /// Every line the script logged, including on failure.
    pub log: Vec<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn timed_out(&self) -> bool {
        self.state == RunState::TimedOut
    }

    /// Report for source answered by a pattern shortcut instead of a run.
    pub fn shortcut(
        run_id: RunId,
        outcome: ExecutionOutcome,
        error_kind: Option<ErrorKind>,
        log: Vec<String>,
    ) -> Self {
        let run = Run::start(run_id, TransformPath::DirectPattern);
        let state = match outcome {
            ExecutionOutcome::Failure(_) => RunState::Errored,
            _ => RunState::Completed,
        };
        run.finish(state, outcome, error_kind, log)
    }
}

/// Bookkeeping for a run in flight. Enforces the state machine.
struct Run {
    id: RunId,
    path: TransformPath,
    state: RunState,
    started: Instant,
}

impl Run {
    fn start(id: RunId, path: TransformPath) -> Self {
        let mut run = Run { id, path, state: RunState::Idle, started: Instant::now() };
        run.transition(RunState::Running);
        run
    }

    fn transition(&mut self, next: RunState) {
        if self.state.permits(next) {
            debug!(run = %self.id, from = ?self.state, to = ?next, "run state");
            self.state = next;
        } else {
            warn!(run = %self.id, from = ?self.state, to = ?next, "ignored invalid run transition");
        }
    }

    fn finish(
        mut self,
        state: RunState,
        outcome: ExecutionOutcome,
        error_kind: Option<ErrorKind>,
        log: Vec<String>,
    ) -> RunReport {
        self.transition(state);
        RunReport {
            run_id: self.id,
            path: self.path,
            state: self.state,
            outcome,
            error_kind,
            log,
            elapsed: self.started.elapsed(),
        }
    }

    fn completed(self, log: &CapturedLog, output: String) -> RunReport {
        self.finish(RunState::Completed, ExecutionOutcome::Success(output), None, log.lines())
    }

    fn errored(self, log: &CapturedLog, kind: ErrorKind, message: String) -> RunReport {
        self.finish(RunState::Errored, ExecutionOutcome::Failure(message), Some(kind), log.lines())
    }
}

/// Output of a completed harnessed run.
fn collected_output(log: &CapturedLog) -> String {
    if log.is_empty() {
        NO_OUTPUT.to_string()
    } else {
        log.joined()
    }
}

/// The engine went away without signalling.
struct EngineGone;

/// Outcome the completion channel holds right now.
fn poll_completion(
    completion: &mut oneshot::Receiver<Completion>,
    log: &CapturedLog,
) -> std::result::Result<ExecutionOutcome, EngineGone> {
    match completion.try_recv() {
        Ok(Completion { error: None }) => Ok(ExecutionOutcome::Success(collected_output(log))),
        Ok(Completion { error: Some(message) }) => Ok(ExecutionOutcome::Failure(message)),
        Err(TryRecvError::Empty) => Ok(ExecutionOutcome::Pending),
        Err(TryRecvError::Closed) => Err(EngineGone),
    }
}

/// Name the greet shortcut answers with, when the script has the greet shape.
pub fn greet_shortcut(script: &str) -> Option<String> {
    if !(script.contains(GREET_BINDING) && script.contains(GREET_TEMPLATE)) {
        return None;
    }
    let name = GREET_CALL
        .captures(script)
        .or_else(|| USER_NAME.captures(script))
        .and_then(|c| c.get(1))
        .map_or(recognizer::DEFAULT_NAME, |m| m.as_str());
    Some(name.to_string())
}

pub struct Driver {
    settings: ExecutionSettings,
    network: Arc<dyn FetchCapability>,
}

impl Driver {
    /// `network` is the real fetch capability; interception is layered on
    /// top per run.
    pub fn new(settings: ExecutionSettings, network: Arc<dyn FetchCapability>) -> Self {
        Self { settings, network }
    }

    /// Runs a transformed script to a terminal state.
    pub async fn execute(&self, run_id: RunId, transformed: &TransformResult) -> RunReport {
        let run = Run::start(run_id, transformed.path);
        let log = CapturedLog::new();

        if transformed.path == TransformPath::PassThrough {
            return self.run_direct(run, &transformed.script, log).await;
        }

        if let Some(name) = greet_shortcut(&transformed.script) {
            info!(run = %run_id, "greet shortcut");
            let output = recognizer::greeting(&name);
            log.push(output.clone());
            log.seal();
            return run.completed(&log, output);
        }

        self.run_harnessed(run, &transformed.script, log).await
    }

    /// The fetch capability a script gets: the allow-list gate when the
    /// script is intercepted, the real network otherwise.
    fn fetch_for(&self, script: &str) -> (Arc<dyn FetchCapability>, bool) {
        let intercepting = network::should_intercept(script);
        let fetch: Arc<dyn FetchCapability> = if intercepting {
            Arc::new(InterceptingFetch::new(self.network.clone(), self.settings.allow_list.clone()))
        } else {
            self.network.clone()
        };
        (fetch, intercepting)
    }

    async fn run_direct(&self, run: Run, script: &str, log: CapturedLog) -> RunReport {
        let (fetch, intercepting) = self.fetch_for(script);
        let job = DirectJob {
            script: script.to_string(),
            log: log.clone(),
            cancel: CancelFlag::default(),
            fetch,
            intercepting,
            handle: Handle::current(),
            deadline: Instant::now() + self.settings.max_wait,
        };
        let worker = tokio::task::spawn_blocking(move || engine::run_direct(job));
        debug!(run = %run.id, intercepting, "script started as is");

        let report = match worker.await {
            Ok(Ok(DirectOutcome::Finished)) => {
                let output = log.joined();
                run.completed(&log, output)
            }
            Ok(Ok(DirectOutcome::Unfinished)) => {
                info!(run = %run.id, "run timed out");
                let output = collected_output(&log);
                run.finish(RunState::TimedOut, ExecutionOutcome::Success(output), None, log.lines())
            }
            Ok(Ok(DirectOutcome::Threw(message))) => run.errored(&log, ErrorKind::Execution, message),
            Ok(Err(e)) => run.errored(&log, ErrorKind::Execution, format!("{e:#}")),
            Err(e) => run.errored(&log, ErrorKind::Execution, format!("script engine stopped: {e}")),
        };
        log.seal();
        report
    }

    async fn run_harnessed(&self, run: Run, script: &str, log: CapturedLog) -> RunReport {
        let (slot, mut completion) = CompletionSlot::new();
        let cancel = CancelFlag::default();

        let (fetch, intercepting) = self.fetch_for(script);
        let job = EngineJob {
            script: script.to_string(),
            settle_delay: self.settings.settle_delay,
            log: log.clone(),
            slot,
            cancel: cancel.clone(),
            fetch,
            intercepting,
            handle: Handle::current(),
        };
        let mut worker = tokio::task::spawn_blocking(move || engine::run_harnessed(job));
        debug!(run = %run.id, intercepting, "script started");

        let interval = self.settings.poll_interval;
        let mut waited = Duration::ZERO;
        let report = loop {
            tokio::time::sleep(interval).await;
            match poll_completion(&mut completion, &log) {
                Ok(ExecutionOutcome::Pending) => {
                    waited += interval;
                    if waited >= self.settings.max_wait {
                        info!(run = %run.id, waited_ms = waited.as_millis() as u64, "run timed out");
                        let output = collected_output(&log);
                        break run.finish(
                            RunState::TimedOut,
                            ExecutionOutcome::Success(output),
                            None,
                            log.lines(),
                        );
                    }
                }
                Ok(ExecutionOutcome::Success(output)) => break run.completed(&log, output),
                Ok(ExecutionOutcome::Failure(message)) => {
                    break run.errored(&log, ErrorKind::Execution, message);
                }
                Err(EngineGone) => {
                    let message = match (&mut worker).await {
                        Ok(Err(e)) => format!("{e:#}"),
                        Ok(Ok(())) => "script engine stopped without completing".to_string(),
                        Err(e) => format!("script engine stopped: {e}"),
                    };
                    break run.errored(&log, ErrorKind::Execution, message);
                }
            }
        };

        cancel.raise();
        if !worker.is_finished() {
            match tokio::time::timeout(self.settings.max_wait, &mut worker).await {
                Ok(_) => {}
                Err(_) => warn!(run = %report.run_id, "script engine did not stop after cancellation"),
            }
        }
        log.seal();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_transitions() {
        assert!(RunState::Idle.permits(RunState::Running));
        assert!(!RunState::Idle.permits(RunState::Completed));
        assert!(RunState::Running.permits(RunState::TimedOut));
        assert!(!RunState::Completed.permits(RunState::Errored));
        assert!(!RunState::Running.permits(RunState::Idle));
    }

    #[test]
    fn run_ids_are_unique() {
        let a = RunId::next();
        let b = RunId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("run-"));
    }

    #[test]
    fn greet_shape_after_stripping() {
        let direct = "const greet = (name) => {\n  return `Hello, ${name}!`;\n};\nconsole.log(greet(\"World\"));";
        assert_eq!(greet_shortcut(direct).as_deref(), Some("World"));

        let bound = "const greet = (name) => {\n  return `Hello, ${name}!`;\n};\nconst userName = 'Lin';\nconsole.log(greet(userName));";
        assert_eq!(greet_shortcut(bound).as_deref(), Some("Lin"));

        let bare = "const greet = (name) => {\n  return `Hello, ${name}!`;\n};";
        assert_eq!(greet_shortcut(bare).as_deref(), Some(recognizer::DEFAULT_NAME));

        assert_eq!(greet_shortcut("const greet = 1;"), None);
    }

    #[test]
    fn completion_channel_states() {
        let log = CapturedLog::new();
        log.push("x");
        let (slot, mut rx) = CompletionSlot::new();
        assert_eq!(poll_completion(&mut rx, &log).ok(), Some(ExecutionOutcome::Pending));
        slot.signal(Completion { error: Some("bad".into()) });
        assert_eq!(poll_completion(&mut rx, &log).ok(), Some(ExecutionOutcome::Failure("bad".into())));

        let (slot, mut rx) = CompletionSlot::new();
        slot.signal(Completion { error: None });
        assert_eq!(poll_completion(&mut rx, &log).ok(), Some(ExecutionOutcome::Success("x".into())));

        let (slot, mut rx) = CompletionSlot::new();
        drop(slot);
        assert!(poll_completion(&mut rx, &log).is_err());
    }

    #[test]
    fn completed_run_without_logs() {
        let log = CapturedLog::new();
        assert_eq!(collected_output(&log), NO_OUTPUT);
        log.push("a");
        log.push("b");
        assert_eq!(collected_output(&log), "a\nb");
    }
}
