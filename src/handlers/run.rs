//! Run handler: executes source and prints the Output/Error panels.

use anyhow::Result;

use tsplay::{
    config::Config,
    playground::Playground,
    printer::{ReportPrinter, TextPrinter},
};

pub struct RunHandler;

impl RunHandler {
    /// Returns whether the run succeeded.
    pub async fn run(cfg: &Config, source: &str, verbose: bool) -> Result<bool> {
        let playground = Playground::from_config(cfg)?;
        let printer = ReportPrinter {
            text: TextPrinter { color: cfg.get("DEFAULT_COLOR") },
            verbose,
        };

        let report = playground.execute_observed(source, |line| printer.progress(line)).await;
        printer.print(&report);
        Ok(report.outcome.is_success())
    }
}
