//! Printers: output/error panels (owo-colors) and markdown (termimad).

use owo_colors::OwoColorize;
use termimad::MadSkin;

use crate::driver::{ErrorKind, ExecutionOutcome, RunReport};

pub struct TextPrinter {
    pub color: Option<String>,
}

impl TextPrinter {
    pub fn print(&self, text: &str) {
        match self.color.as_deref() {
            Some("green") => println!("{}", text.green()),
            Some("cyan") => println!("{}", text.cyan()),
            Some("magenta") => println!("{}", text.magenta()),
            Some("yellow") => println!("{}", text.yellow()),
            _ => println!("{}", text),
        }
    }
}

/// Renders a [`RunReport`] as the playground's Output and Error panels.
pub struct ReportPrinter {
    pub text: TextPrinter,
    pub verbose: bool,
}

impl ReportPrinter {
    pub fn progress(&self, line: &str) {
        println!("{}", line.dimmed());
    }

    pub fn print(&self, report: &RunReport) {
        match &report.outcome {
            ExecutionOutcome::Success(output) => {
                println!("{}", "Output".bold());
                self.text.print(output);
                if report.timed_out() {
                    println!("{}", "(stopped waiting for the script)".dimmed());
                }
            }
            ExecutionOutcome::Failure(message) => {
                if !report.log.is_empty() {
                    println!("{}", "Output".bold());
                    self.text.print(&report.log.join("\n"));
                }
                let title = match report.error_kind {
                    Some(ErrorKind::Network) => "Network error",
                    _ => "Error",
                };
                println!("{}", title.red().bold());
                println!("{}", message.red());
            }
            ExecutionOutcome::Pending => println!("{}", "Still running".yellow()),
        }
        if self.verbose {
            println!(
                "{}",
                format!("[{} {} {:?} in {}ms]", report.run_id, report.path, report.state, report.elapsed.as_millis())
                    .dimmed()
            );
        }
    }
}

pub struct MarkdownPrinter {
    pub skin: MadSkin,
}

impl Default for MarkdownPrinter {
    fn default() -> Self {
        Self { skin: MadSkin::default() }
    }
}

impl MarkdownPrinter {
    pub fn print(&self, text: &str) {
        self.skin.print_text(text);
        println!();
    }
}
