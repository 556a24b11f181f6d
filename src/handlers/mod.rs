pub mod ask;
pub mod run;
pub mod strip;

use std::{
    fs,
    io::{self, Read},
};

use anyhow::{Context, Result};
use is_terminal::IsTerminal;

use tsplay::playground::DEFAULT_PROGRAM;

use crate::cli::SourceArgs;

/// Reads the source to work on: `-e`, then the file, then piped stdin, then
/// the default program.
pub fn resolve_source(args: &SourceArgs) -> Result<String> {
    if let Some(code) = &args.eval {
        return Ok(code.clone());
    }
    if let Some(path) = &args.file {
        return fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()));
    }
    if !io::stdin().is_terminal() {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
        if !buf.trim().is_empty() {
            return Ok(buf);
        }
    }
    Ok(DEFAULT_PROGRAM.to_string())
}
