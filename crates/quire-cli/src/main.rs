#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use quire_core::config::{self, QuireConfig};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "quire: lazy Nostr publication trees and their ordinal index",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Index database path (overrides config and QUIRE_INDEX_PATH).
    #[arg(long, global = true, value_name = "PATH")]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    const fn output_mode(&self) -> OutputMode {
        OutputMode::from_json_flag(self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Index a publication from a JSONL event dump",
        after_help = "EXAMPLES:\n    quire index events.jsonl --root 30040:<pubkey>:my-book\n    quire index events.jsonl --root <event-id> --json"
    )]
    Index(cmd::index::IndexArgs),

    #[command(
        about = "Print a table of contents from the index",
        after_help = "EXAMPLES:\n    quire toc <root-id>\n    quire toc <root-id> --max-depth 1 --json"
    )]
    Toc(cmd::toc::TocArgs),

    #[command(about = "List every parent that references a child")]
    Parents(cmd::parents::ParentsArgs),

    #[command(
        about = "Reveal a publication node by node, or seek a bookmark",
        after_help = "EXAMPLES:\n    quire walk events.jsonl --root <root-id> --limit 20\n    quire walk events.jsonl --root <root-id> --seek 30041:<pubkey>:chapter-3"
    )]
    Walk(cmd::walk::WalkArgs),

    #[command(about = "Show index row counts")]
    Stats,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("QUIRE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "quire_core=debug,quire_cli=debug,info"
        } else {
            "quire_core=info,quire_cli=info,warn"
        })
    });

    let format = env::var("QUIRE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn load_config(index_override: Option<PathBuf>) -> anyhow::Result<QuireConfig> {
    let project_root = env::current_dir()?;
    let mut config = config::resolve_config(&project_root)?;
    if let Some(path) = index_override {
        config.index.path = if path.is_relative() {
            project_root.join(path)
        } else {
            path
        };
    }
    Ok(config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output = cli.output_mode();
    let config = load_config(cli.index)?;
    info!(index = %config.index.path.display(), "using index");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Index(args) => runtime.block_on(cmd::index::run_index(&args, output, &config)),
        Commands::Toc(args) => cmd::toc::run_toc(&args, output, &config),
        Commands::Parents(args) => cmd::parents::run_parents(&args, output, &config),
        Commands::Walk(args) => runtime.block_on(cmd::walk::run_walk(&args, output, &config)),
        Commands::Stats => cmd::stats::run_stats(output, &config),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let output = cli.output_mode();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(error = ?error, "command failed");
            if render_error(output, &CliError::from(&error)).is_err() {
                eprintln!("error: {error:#}");
            }
            ExitCode::FAILURE
        }
    }
}
