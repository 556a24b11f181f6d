mod cli;
mod handlers;

use std::process::ExitCode;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use handlers::{
    ask::{AskHandler, AskOptions},
    run::RunHandler,
    strip::StripHandler,
};
use tsplay::config::Config;

fn init_logging(cfg: &Config) {
    // RUST_LOG wins over TSPLAY_LOG
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| EnvFilter::try_new(cfg.get("TSPLAY_LOG").unwrap_or_else(|| "warn".into())).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    let cfg = Config::load();
    init_logging(&cfg);

    let ok = match args.command {
        Commands::Run { source, verbose } => {
            let source = handlers::resolve_source(&source)?;
            RunHandler::run(&cfg, &source, verbose).await?
        }
        Commands::Strip { source } => {
            let source = handlers::resolve_source(&source)?;
            StripHandler::run(&source);
            true
        }
        Commands::Ask { prompt, context, save, run, no_cache, md, no_md } => {
            let markdown = if no_md {
                false
            } else if md {
                true
            } else {
                cfg.get_bool("PRETTIFY_MARKDOWN")
            };
            let opts = AskOptions {
                model: args.model.as_deref(),
                context: context.as_deref(),
                save: save.as_deref(),
                run,
                caching: !no_cache,
                markdown,
            };
            AskHandler::run(&cfg, &prompt, opts).await?
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
