//! Front door of the playground: source text in, [`RunReport`] out.
//!
//! Recognized shapes are answered first; everything else is transformed and
//! handed to the [`Driver`]. No error escapes to the caller, every failure
//! ends up as an [`ExecutionOutcome::Failure`] on the report.

mod samples;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    config::{Config, ExecutionSettings},
    driver::{Driver, ErrorKind, ExecutionOutcome, RunId, RunReport},
    network::{FetchCapability, FetchRequest, HttpFetcher},
    recognizer::{self, RecognizedPattern},
    transform::{self, TransformResult},
};

pub use samples::DEFAULT_PROGRAM;

#[derive(Debug, Deserialize)]
struct Joke {
    setup: String,
    punchline: String,
}

/// How a piece of source will be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Shortcut(RecognizedPattern),
    Script(TransformResult),
}

pub struct Playground {
    settings: ExecutionSettings,
    network: Arc<dyn FetchCapability>,
    driver: Driver,
}

impl Playground {
    pub fn new(settings: ExecutionSettings, network: Arc<dyn FetchCapability>) -> Self {
        let driver = Driver::new(settings.clone(), network.clone());
        Self { settings, network, driver }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let network = HttpFetcher::from_config(cfg)?;
        Ok(Self::new(ExecutionSettings::from_config(cfg), Arc::new(network)))
    }

    /// Decides between a shortcut and a transformed script, without running anything.
    pub fn plan(source: &str) -> Plan {
        match recognizer::recognize(source) {
            RecognizedPattern::NoMatch => Plan::Script(transform::transform(source)),
            pattern => Plan::Shortcut(pattern),
        }
    }

    pub async fn execute(&self, source: &str) -> RunReport {
        self.execute_observed(source, |_| {}).await
    }

    /// Like [`execute`](Self::execute), reporting interim output (the joke
    /// loading message) through `progress` before the final report.
    pub async fn execute_observed<F>(&self, source: &str, mut progress: F) -> RunReport
    where
        F: FnMut(&str),
    {
        let run_id = RunId::next();
        match Self::plan(source) {
            Plan::Shortcut(pattern) => {
                info!(run = %run_id, ?pattern, "pattern shortcut");
                self.answer(run_id, pattern, &mut progress).await
            }
            Plan::Script(transformed) => {
                info!(run = %run_id, path = %transformed.path, "executing script");
                self.driver.execute(run_id, &transformed).await
            }
        }
    }

    async fn answer(
        &self,
        run_id: RunId,
        pattern: RecognizedPattern,
        progress: &mut dyn FnMut(&str),
    ) -> RunReport {
        if pattern != RecognizedPattern::JokeFetch {
            let output = pattern.immediate_output().unwrap_or_default();
            return RunReport::shortcut(
                run_id,
                ExecutionOutcome::Success(output.clone()),
                None,
                vec![output],
            );
        }

        progress(recognizer::LOADING);
        match self.fetch_joke().await {
            Ok(line) => RunReport::shortcut(run_id, ExecutionOutcome::Success(line.clone()), None, vec![line]),
            Err(e) => {
                warn!(run = %run_id, error = %format!("{e:#}"), "joke request failed");
                RunReport::shortcut(
                    run_id,
                    ExecutionOutcome::Failure(format!("Error fetching joke: {e:#}")),
                    Some(ErrorKind::Network),
                    Vec::new(),
                )
            }
        }
    }

    async fn fetch_joke(&self) -> Result<String> {
        let resp = self
            .network
            .fetch(FetchRequest::get(self.settings.joke_api_url.as_str()))
            .await?;
        if !resp.is_success() {
            bail!("joke service answered with status {}", resp.status);
        }
        let joke: Joke = serde_json::from_str(&resp.body).context("unexpected joke payload")?;
        Ok(format!("{} - {}", joke.setup, joke.punchline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformPath;

    #[test]
    fn plan_prefers_shortcuts() {
        assert_eq!(Playground::plan(DEFAULT_PROGRAM), Plan::Shortcut(RecognizedPattern::JokeFetch));

        let Plan::Script(result) = Playground::plan("let n: number = 1;\nconsole.log(n);") else {
            panic!("expected a script");
        };
        assert_eq!(result.path, TransformPath::PlainStrip);
        assert_eq!(result.script, "let n = 1;\nconsole.log(n);");
    }
}
