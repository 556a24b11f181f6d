//! Strip handler: shows what the playground would run.

use owo_colors::OwoColorize;

use tsplay::playground::{Plan, Playground};

pub struct StripHandler;

impl StripHandler {
    pub fn run(source: &str) {
        match Playground::plan(source) {
            Plan::Shortcut(pattern) => {
                println!("{}", format!("// path: pattern ({pattern:?})").dimmed());
                if let Some(output) = pattern.immediate_output() {
                    println!("{}", format!("// answers: {output}").dimmed());
                }
                println!("{}", source);
            }
            Plan::Script(result) => {
                println!("{}", format!("// path: {}", result.path).dimmed());
                println!("{}", result.script);
            }
        }
    }
}
