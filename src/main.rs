//! # Clipnote CLI (`clip`)
//!
//! The `clip` binary turns a URL into a markdown note in your notes
//! directory.
//!
//! ## Usage
//!
//! ```bash
//! clip --config ./clipnote.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clip clip <url>` | Classify, fetch, summarize, and save a note |
//! | `clip handlers` | List the registered content handlers |
//!
//! ## Examples
//!
//! ```bash
//! # Save a recipe note
//! clip clip https://www.seriouseats.com/miso-soup
//!
//! # Machine-readable progress on stderr, note path on stdout
//! clip clip --progress json https://youtu.be/abc
//!
//! # File the note under a different root folder
//! clip clip --folder ~/vault/Inbox https://example.com/post
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use clipnote::classify::Classifier;
use clipnote::config::{load_or_default, Config};
use clipnote::fetch::PageFetcher;
use clipnote::llm::create_backend;
use clipnote::pipeline::NotePipeline;
use clipnote::progress::ProgressMode;
use clipnote::store::FsNoteSink;
use clipnote::traits::HandlerRegistry;

/// Clipnote — turn any URL into a structured markdown note.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; missing files fall back to built-in defaults.
#[derive(Parser)]
#[command(
    name = "clip",
    about = "Clipnote — turn any URL into a structured markdown note",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./clipnote.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clip a URL: classify it, fetch the page, generate a note, save it.
    ///
    /// Progress goes to stderr; on success the saved note's path is the
    /// only line on stdout.
    Clip {
        /// The URL to clip.
        url: String,

        /// Progress rendering. Defaults to `human` when stderr is a
        /// terminal, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,

        /// Root folder for the note, overriding `notes.root` from the
        /// config file.
        #[arg(long)]
        folder: Option<String>,
    },

    /// List registered content handlers and their detection strategy.
    Handlers,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Clip {
            url,
            progress,
            folder,
        } => clip_url(&config, &url, progress, folder).await,
        Commands::Handlers => {
            list_handlers(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn clip_url(
    config: &Config,
    url: &str,
    progress: Option<ProgressArg>,
    folder: Option<String>,
) -> Result<ExitCode> {
    let fetcher = Arc::new(PageFetcher::new(&config.fetch)?);
    let registry = Arc::new(HandlerRegistry::with_defaults(&fetcher));
    let backend = create_backend(&config.llm)?;
    let classifier = Arc::new(Classifier::new(
        registry,
        fetcher,
        backend.clone(),
    ));

    let root = folder.unwrap_or_else(|| config.notes.root.clone());
    let mut pipeline = NotePipeline::new(classifier, backend, Arc::new(FsNoteSink::new()), root);

    let mode: ProgressMode = progress
        .map(Into::into)
        .unwrap_or_else(ProgressMode::default_for_tty);
    let reporter = mode.reporter();
    pipeline.on_progress(move |event| reporter.report(event));

    let failed = Arc::new(AtomicBool::new(false));
    let flag = failed.clone();
    pipeline.on_error(move |err| {
        eprintln!("{}", err.user_message);
        flag.store(true, Ordering::SeqCst);
    });
    pipeline.on_complete(|note_id| {
        println!("{}", note_id);
    });

    pipeline.run(url).await;

    if failed.load(Ordering::SeqCst) {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn list_handlers(config: &Config) -> Result<()> {
    let fetcher = Arc::new(PageFetcher::new(&config.fetch)?);
    let registry = HandlerRegistry::with_defaults(&fetcher);

    println!("{:<12} {:<8} DESCRIPTION", "TYPE", "SNIFF");
    for handler in registry.handlers() {
        println!(
            "{:<12} {:<8} {}",
            handler.type_tag(),
            if handler.requires_content_sniff() {
                "yes"
            } else {
                "no"
            },
            handler.description()
        );
    }
    Ok(())
}
