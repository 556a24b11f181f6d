//! The asynchronous wrapper every harnessed script runs inside.

use std::time::Duration;

/// Wraps `script` in an async IIFE that runs it, awaits `settle` so pending
/// work can finish, then signals completion. A throw anywhere in the body is
/// echoed to the console and signalled as the run's error.
pub(crate) fn wrap(script: &str, settle: Duration) -> String {
    format!(
        r#"(async () => {{
  try {{
{script}
;
    await new Promise((resolve) => setTimeout(resolve, {settle}));
    __tsplay_complete(null);
  }} catch (error) {{
    const message = error instanceof Error ? error.message : String(error);
    console.log('Error:', message);
    __tsplay_complete(String(message));
  }}
}})();
"#,
        settle = settle.as_millis(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_sits_inside_try_block() {
        let out = wrap("console.log(1)", Duration::from_millis(300));
        let body = out.find("console.log(1)").unwrap();
        assert!(out.find("try {").unwrap() < body);
        assert!(body < out.find("setTimeout(resolve, 300)").unwrap());
        assert!(out.contains("__tsplay_complete(String(message))"));
    }
}
