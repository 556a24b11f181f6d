//! QuickJS engine thread: one fresh runtime and context per run.
//!
//! The engine runs on a blocking worker. It installs the run's capabilities
//! (console, timers, fetch and, for harnessed runs, the completion signal),
//! evaluates the script and then drives microtasks, timers and fetch replies
//! until the script is done or the run is cancelled. Waiting happens on the
//! tokio runtime, so a fetch reply wakes the loop as soon as it lands.
//! Cancellation also arms the QuickJS interrupt handler, so a script stuck in
//! a loop is stopped between bytecodes.

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context as _, Result};
use rquickjs::{CatchResultExt, CaughtError, Context, Ctx, Function, Runtime, Value};
use tokio::{
    runtime::Handle,
    sync::{oneshot, Notify},
};
use tracing::{debug, trace};

use super::harness;
use crate::{
    capture::{self, CapturedLog, ConsoleShim},
    network::{self, FetchCapability, NetworkShim},
};

/// Longest the loop waits before checking for cancellation again.
const IDLE_TICK: Duration = Duration::from_millis(5);

const TIMERS_JS: &str = r#"(() => {
  const schedule = globalThis.__tsplay_schedule;
  delete globalThis.__tsplay_schedule;
  const pending = new Map();
  let nextId = 1;
  const arm = (callback, delay, args, repeat) => {
    const id = nextId++;
    const wait = Math.max(0, Number(delay) || 0);
    pending.set(id, { callback, wait, args, repeat });
    schedule(id, wait);
    return id;
  };
  globalThis.setTimeout = (callback, delay, ...args) => arm(callback, delay, args, false);
  globalThis.setInterval = (callback, delay, ...args) => arm(callback, delay, args, true);
  globalThis.clearTimeout = (id) => { pending.delete(id); };
  globalThis.clearInterval = globalThis.clearTimeout;
  globalThis.__tsplay_fire = (id) => {
    const timer = pending.get(id);
    if (!timer) return;
    if (timer.repeat) schedule(id, timer.wait); else pending.delete(id);
    if (typeof timer.callback === 'function') timer.callback(...timer.args);
  };
})();"#;

/// Cooperative cancellation shared by the driver and the engine thread.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What the script reports when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Completion {
    pub error: Option<String>,
}

/// Single-use completion channel of one run.
#[derive(Debug, Clone)]
pub(crate) struct CompletionSlot {
    sender: Arc<Mutex<Option<oneshot::Sender<Completion>>>>,
}

impl CompletionSlot {
    pub fn new() -> (Self, oneshot::Receiver<Completion>) {
        let (tx, rx) = oneshot::channel();
        (Self { sender: Arc::new(Mutex::new(Some(tx))) }, rx)
    }

    /// Sends the completion; only the first signal counts.
    pub fn signal(&self, completion: Completion) -> bool {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => tx.send(completion).is_ok(),
            None => false,
        }
    }

    pub fn is_signalled(&self) -> bool {
        self.sender.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }

    fn install<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let slot = self.clone();
        let complete = Function::new(ctx.clone(), move |error: Option<String>| {
            trace!(failed = error.is_some(), "script signalled completion");
            slot.signal(Completion { error });
        })?;
        ctx.globals().set("__tsplay_complete", complete)
    }
}

#[derive(Debug, Default)]
struct TimerState {
    queue: BinaryHeap<Reverse<(Instant, u64, u32)>>,
    seq: u64,
}

/// Real-time timer queue backing `setTimeout` and `setInterval`.
#[derive(Debug, Clone, Default)]
struct TimerQueue(Arc<Mutex<TimerState>>);

impl TimerQueue {
    fn schedule(&self, id: u32, delay_ms: f64) {
        let delay = if delay_ms.is_finite() && delay_ms > 0.0 {
            Duration::from_secs_f64(delay_ms / 1000.0)
        } else {
            Duration::ZERO
        };
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        state.seq += 1;
        let seq = state.seq;
        state.queue.push(Reverse((Instant::now() + delay, seq, id)));
    }

    /// Timer ids due at `now`, in firing order.
    fn take_due(&self, now: Instant) -> Vec<u32> {
        let mut state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let mut due = Vec::new();
        while let Some(Reverse((at, _, id))) = state.queue.peek().copied() {
            if at > now {
                break;
            }
            state.queue.pop();
            due.push(id);
        }
        due
    }

    fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).queue.is_empty()
    }

    fn next_deadline(&self) -> Option<Instant> {
        let state = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        state.queue.peek().map(|Reverse((at, _, _))| *at)
    }

    fn install<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        let timers = self.clone();
        let schedule = Function::new(ctx.clone(), move |id: u32, delay: f64| timers.schedule(id, delay))?;
        ctx.globals().set("__tsplay_schedule", schedule)?;
        ctx.eval::<(), _>(TIMERS_JS)
    }
}

/// Everything the engine thread needs for one harnessed run.
pub(crate) struct EngineJob {
    pub script: String,
    pub settle_delay: Duration,
    pub log: CapturedLog,
    pub slot: CompletionSlot,
    pub cancel: CancelFlag,
    pub fetch: Arc<dyn FetchCapability>,
    pub intercepting: bool,
    pub handle: Handle,
}

/// Everything the engine thread needs to run a script as is.
pub(crate) struct DirectJob {
    pub script: String,
    pub log: CapturedLog,
    pub cancel: CancelFlag,
    pub fetch: Arc<dyn FetchCapability>,
    pub intercepting: bool,
    pub handle: Handle,
    pub deadline: Instant,
}

/// How a direct run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DirectOutcome {
    /// The script, its jobs, timers and fetches all ran out.
    Finished,
    Threw(String),
    /// Work was still pending when the deadline passed or the run was cancelled.
    Unfinished,
}

/// Why [`Engine::drive`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Done,
    Cancelled,
    Deadline,
    Idle,
}

/// Message for an exception that escaped to the engine.
pub(crate) fn describe(err: &CaughtError<'_>) -> String {
    match err {
        CaughtError::Exception(ex) => ex.message().unwrap_or_else(|| ex.to_string()),
        other => other.to_string(),
    }
}

/// One runtime with the run's capabilities installed. The shims are declared
/// first so they are released before the context.
struct Engine {
    _console: ConsoleShim,
    network: NetworkShim,
    timers: TimerQueue,
    ctx: Context,
    rt: Runtime,
    wake: Arc<Notify>,
    handle: Handle,
    cancel: CancelFlag,
}

impl Engine {
    fn new(
        log: &CapturedLog,
        cancel: &CancelFlag,
        deadline: Option<Instant>,
        fetch: Arc<dyn FetchCapability>,
        intercepting: bool,
        handle: Handle,
    ) -> Result<Self> {
        let rt = Runtime::new().context("failed to create script runtime")?;
        let flag = cancel.clone();
        rt.set_interrupt_handler(Some(Box::new(move || {
            flag.is_raised() || deadline.is_some_and(|d| Instant::now() >= d)
        })));
        let ctx = Context::full(&rt).context("failed to create script context")?;

        let timers = TimerQueue::default();
        let wake = Arc::new(Notify::new());
        let (console, network) = ctx
            .with(|ctx| -> rquickjs::Result<_> {
                let console = capture::install(&ctx, log)?;
                timers.install(&ctx)?;
                let network = network::install(&ctx, fetch, intercepting, handle.clone(), wake.clone())?;
                Ok((console, network))
            })
            .map_err(|e| anyhow!("failed to install script capabilities: {e}"))?;

        Ok(Self { _console: console, network, timers, ctx, rt, wake, handle, cancel: cancel.clone() })
    }

    fn eval(&self, script: String) -> std::result::Result<(), String> {
        self.ctx.with(|ctx| {
            ctx.eval::<Value, _>(script)
                .catch(&ctx)
                .map(|_| ())
                .map_err(|e| describe(&e))
        })
    }

    /// Runs queued promise jobs until none remain.
    fn drain_jobs(&self) {
        while !self.cancel.is_raised() {
            match self.rt.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => debug!("pending job raised an uncaught exception"),
            }
        }
    }

    /// Calls the script-side dispatcher `name` once per argument tuple.
    fn dispatch<A>(&self, name: &str, calls: Vec<A>)
    where
        A: for<'js> rquickjs::function::IntoArgs<'js>,
    {
        self.ctx.with(|ctx| {
            let target: rquickjs::Result<Function> = ctx.globals().get(name);
            let Ok(target) = target else {
                debug!(dispatcher = name, "dispatcher is gone");
                return;
            };
            for args in calls {
                if let Err(e) = target.call::<_, ()>(args).catch(&ctx) {
                    debug!(dispatcher = name, error = %describe(&e), "script callback threw");
                }
            }
        });
    }

    /// Drives jobs, fetch replies and timers until `done` holds, the run is
    /// cancelled or `deadline` passes. With `until_idle` it also returns once
    /// nothing is left that could run again.
    fn drive(&self, done: impl Fn() -> bool, deadline: Option<Instant>, until_idle: bool) -> LoopExit {
        let exit = loop {
            self.drain_jobs();
            if self.cancel.is_raised() {
                break LoopExit::Cancelled;
            }
            if done() {
                break LoopExit::Done;
            }
            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                break LoopExit::Deadline;
            }

            let settled = self.network.take_settled();
            if !settled.is_empty() {
                self.dispatch("__tsplay_settle", settled);
                continue;
            }
            let due = self.timers.take_due(now);
            if !due.is_empty() {
                self.dispatch("__tsplay_fire", due.into_iter().map(|id| (id,)).collect());
                continue;
            }
            if until_idle && self.timers.is_empty() && self.network.in_flight() == 0 {
                break LoopExit::Idle;
            }

            let mut wait = self
                .timers
                .next_deadline()
                .map_or(IDLE_TICK, |at| at.saturating_duration_since(now))
                .min(IDLE_TICK);
            if let Some(d) = deadline {
                wait = wait.min(d.saturating_duration_since(now));
            }
            let wake = self.wake.clone();
            self.handle.block_on(async move {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = wake.notified() => {}
                }
            });
        };
        trace!(?exit, "engine loop stopped");
        exit
    }
}

/// Evaluates `job.script` inside the harness and drives it until the harness
/// signals completion or the driver cancels the run.
pub(crate) fn run_harnessed(job: EngineJob) -> Result<()> {
    let engine = Engine::new(&job.log, &job.cancel, None, job.fetch, job.intercepting, job.handle)?;
    engine
        .ctx
        .with(|ctx| job.slot.install(&ctx))
        .map_err(|e| anyhow!("failed to install completion signal: {e}"))?;

    if let Err(message) = engine.eval(harness::wrap(&job.script, job.settle_delay)) {
        // the harness never started, so it cannot signal for itself
        debug!(%message, "script failed to evaluate");
        job.slot.signal(Completion { error: Some(message) });
        return Ok(());
    }

    engine.drive(|| job.slot.is_signalled(), None, false);
    Ok(())
}

/// Runs `job.script` as is. Timers and fetches keep the run alive until they
/// run out or `job.deadline` passes.
pub(crate) fn run_direct(job: DirectJob) -> Result<DirectOutcome> {
    let engine = Engine::new(
        &job.log,
        &job.cancel,
        Some(job.deadline),
        job.fetch,
        job.intercepting,
        job.handle,
    )?;

    if let Err(message) = engine.eval(job.script) {
        if Instant::now() >= job.deadline {
            return Ok(DirectOutcome::Unfinished);
        }
        return Ok(DirectOutcome::Threw(message));
    }

    Ok(match engine.drive(|| false, Some(job.deadline), true) {
        LoopExit::Idle | LoopExit::Done => DirectOutcome::Finished,
        LoopExit::Cancelled | LoopExit::Deadline => DirectOutcome::Unfinished,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{FetchRequest, FetchResponse};
    use futures::{future::BoxFuture, FutureExt};

    #[test]
    fn timers_fire_in_deadline_order() {
        let timers = TimerQueue::default();
        timers.schedule(1, 20.0);
        timers.schedule(2, 0.0);
        timers.schedule(3, f64::NAN);
        let later = Instant::now() + Duration::from_millis(50);
        assert_eq!(timers.take_due(later), vec![2, 3, 1]);
        assert!(timers.next_deadline().is_none());
    }

    #[test]
    fn completion_slot_is_single_use() {
        let (slot, mut rx) = CompletionSlot::new();
        assert!(slot.signal(Completion { error: None }));
        assert!(!slot.signal(Completion { error: Some("late".into()) }));
        assert!(slot.is_signalled());
        assert_eq!(rx.try_recv().unwrap(), Completion { error: None });
    }

    struct Offline;

    impl FetchCapability for Offline {
        fn fetch(&self, _: FetchRequest) -> BoxFuture<'_, Result<FetchResponse>> {
            async { Ok(FetchResponse { status: 200, body: "{\"n\":7}".into() }) }.boxed()
        }
    }

    fn direct(script: &str, budget: Duration) -> (DirectOutcome, CapturedLog) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let log = CapturedLog::new();
        let job = DirectJob {
            script: script.to_string(),
            log: log.clone(),
            cancel: CancelFlag::default(),
            fetch: Arc::new(Offline),
            intercepting: false,
            handle: runtime.handle().clone(),
            deadline: Instant::now() + budget,
        };
        (run_direct(job).unwrap(), log)
    }

    #[test]
    fn direct_run_captures_console() {
        let (outcome, log) = direct("console.log('hi', [1, 2])", Duration::from_secs(2));
        assert_eq!(outcome, DirectOutcome::Finished);
        assert_eq!(log.lines(), vec!["hi [1, 2]"]);
    }

    #[test]
    fn direct_run_reports_exceptions() {
        let (outcome, log) = direct("console.log(missing)", Duration::from_secs(2));
        let DirectOutcome::Threw(message) = outcome else {
            panic!("expected a throw, got {outcome:?}");
        };
        assert!(message.contains("missing"), "{message}");
        assert!(log.is_empty());
    }

    #[test]
    fn deadline_interrupts_busy_loop() {
        let (outcome, _) = direct("while (true) {}", Duration::from_millis(50));
        assert_eq!(outcome, DirectOutcome::Unfinished);
    }

    #[test]
    fn direct_run_waits_for_timers_and_fetch() {
        let script = "setTimeout(() => console.log('timer'), 10);\nfetch('https://x.test').then((r) => r.json()).then((b) => console.log(b.n));\nconsole.log('sync');";
        let (outcome, log) = direct(script, Duration::from_secs(2));
        assert_eq!(outcome, DirectOutcome::Finished);
        assert_eq!(log.lines()[0], "sync");
        let mut rest = log.lines()[1..].to_vec();
        rest.sort();
        assert_eq!(rest, vec!["7", "timer"]);
    }

    #[test]
    fn pending_interval_runs_until_deadline() {
        let (outcome, log) = direct("setInterval(() => console.log('tick'), 10);", Duration::from_millis(80));
        assert_eq!(outcome, DirectOutcome::Unfinished);
        assert!(log.len() >= 2, "{:?}", log.lines());
    }
}
