use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "tsplay", about = "TypeScript playground runner", version)]
pub struct Cli {
    /// Model for the assistant, overrides DEFAULT_MODEL.
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Execute TypeScript source and print its output.
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Show run id, transform path and timing.
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the script the source is transformed into, without running it.
    Strip {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Ask the code assistant.
    #[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
    Ask {
        /// The question to ask.
        #[arg(value_name = "PROMPT")]
        prompt: String,

        /// System context sent with the prompt.
        #[arg(long)]
        context: Option<String>,

        /// Write the last code block of the reply to this file.
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,

        /// Run the last code block of the reply.
        #[arg(long)]
        run: bool,

        /// Disable caching.
        #[arg(long = "no-cache")]
        no_cache: bool,

        /// Prettify Markdown output.
        #[arg(long)]
        md: bool,
        /// Print the reply as plain text.
        #[arg(long = "no-md")]
        no_md: bool,
    },
}

/// Where the source comes from: `-e`, a file, piped stdin, or the default program.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source file to read.
    #[arg(value_name = "FILE", conflicts_with = "eval")]
    pub file: Option<PathBuf>,

    /// Source given inline.
    #[arg(short = 'e', long = "eval", value_name = "CODE")]
    pub eval: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
