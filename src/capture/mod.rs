//! Console capture: the `console` object scripts see inside a run.
//!
//! `console.log` renders its arguments the way the playground output pane
//! shows them and appends one line per call to a [`CapturedLog`]. The other
//! console methods go to the tracing log instead of the output.

use std::sync::{Arc, Mutex, PoisonError};

use rquickjs::{Ctx, Function};
use tracing::{debug, info, trace, warn};

/// Renders each argument, joins them with a space and hands the line to
/// the host. Host functions are captured in the closure and then removed
/// from the global scope.
const CONSOLE_JS: &str = r#"(() => {
  const emit = globalThis.__tsplay_log;
  const diag = globalThis.__tsplay_diag;
  delete globalThis.__tsplay_log;
  delete globalThis.__tsplay_diag;
  const render = (arg) => {
    if (typeof arg === 'object') {
      if (Array.isArray(arg)) return `[${arg.join(', ')}]`;
      const text = JSON.stringify(arg, null, 2);
      return text === undefined ? String(arg) : text;
    }
    return String(arg);
  };
  const line = (args) => args.map(render).join(' ');
  const level = (name) => (...args) => diag(name, line(args));
  globalThis.console = {
    log: (...args) => emit(line(args)),
    info: level('info'),
    warn: level('warn'),
    error: level('error'),
    debug: level('debug'),
  };
})();"#;

#[derive(Debug, Default)]
struct LogState {
    lines: Vec<String>,
    sealed: bool,
}

/// Ordered, append-only output of one run. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct CapturedLog {
    inner: Arc<Mutex<LogState>>,
}

impl CapturedLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line unless the log has been sealed.
    pub fn push(&self, line: impl Into<String>) {
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.sealed {
            trace!("dropping console line emitted after capture ended");
            return;
        }
        state.lines.push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).lines.clone()
    }

    pub fn joined(&self) -> String {
        self.lines().join("\n")
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops accepting lines. Everything captured so far stays readable.
    pub fn seal(&self) {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).sealed
    }
}

/// Scope of an installed console. Dropping it seals the log, so nothing the
/// script leaves behind can write into a finished run.
#[derive(Debug)]
pub struct ConsoleShim {
    log: CapturedLog,
}

impl Drop for ConsoleShim {
    fn drop(&mut self) {
        self.log.seal();
        debug!(lines = self.log.len(), "console capture released");
    }
}

/// Installs a capturing `console` into `ctx`.
pub fn install<'js>(ctx: &Ctx<'js>, log: &CapturedLog) -> rquickjs::Result<ConsoleShim> {
    let sink = log.clone();
    let emit = Function::new(ctx.clone(), move |line: String| sink.push(line))?;
    let diag = Function::new(ctx.clone(), |level: String, line: String| match level.as_str() {
        "error" | "warn" => warn!(target: "tsplay::script", "{line}"),
        "info" => info!(target: "tsplay::script", "{line}"),
        _ => debug!(target: "tsplay::script", "{line}"),
    })?;

    let globals = ctx.globals();
    globals.set("__tsplay_log", emit)?;
    globals.set("__tsplay_diag", diag)?;
    ctx.eval::<(), _>(CONSOLE_JS)?;

    debug!("console capture installed");
    Ok(ConsoleShim { log: log.clone() })
}
