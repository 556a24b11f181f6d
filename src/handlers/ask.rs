//! Ask handler: one assistant round trip, optionally accepting its code.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use tsplay::{
    assistant::{Assistant, ReplySource},
    cache::ResponseCache,
    config::Config,
    printer::MarkdownPrinter,
};

use super::run::RunHandler;

pub struct AskOptions<'a> {
    pub model: Option<&'a str>,
    pub context: Option<&'a str>,
    pub save: Option<&'a Path>,
    pub run: bool,
    pub caching: bool,
    pub markdown: bool,
}

pub struct AskHandler;

impl AskHandler {
    /// Returns whether any code that was run succeeded.
    pub async fn run(cfg: &Config, prompt: &str, opts: AskOptions<'_>) -> Result<bool> {
        let mut assistant = Assistant::from_config(cfg, opts.model)?;
        if opts.caching {
            assistant = assistant.with_cache(ResponseCache::from_config(cfg));
        }

        let reply = assistant.generate(prompt, opts.context).await;
        if reply.source == ReplySource::Fallback {
            eprintln!("{}", "assistant unavailable, showing a built-in answer".yellow());
        }
        if opts.markdown {
            MarkdownPrinter::default().print(&reply.text);
        } else {
            println!("{}", reply.text);
        }

        let code = reply.code();
        if let Some(path) = opts.save {
            let Some(code) = code.as_deref() else {
                eprintln!("{}", "reply has no code block to save".yellow());
                return Ok(true);
            };
            fs::write(path, code).with_context(|| format!("failed to write {}", path.display()))?;
            println!("{}", format!("saved code to {}", path.display()).green());
        }

        match code {
            Some(code) if opts.run => RunHandler::run(cfg, &code, false).await,
            _ => Ok(true),
        }
    }
}
