//! # College Assistant CLI (`assist`)
//!
//! ## Usage
//!
//! ```bash
//! assist --config ./config/assist.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `assist init` | Create the SQLite database and run schema migrations |
//! | `assist lectures import <file>` | Append lectures from a JSON array |
//! | `assist lectures list` | Print stored lectures |
//! | `assist lectures clear` | Delete every stored lecture |
//! | `assist ask "<question>"` | Answer one question |
//! | `assist chat` | Interactive chat on stdin |
//! | `assist history` | Print (or `--clear`) the chat transcript |
//! | `assist cache stats` / `clear` | Inspect or empty the response cache |
//! | `assist docs add` / `search` | Manage knowledge documents |
//! | `assist serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `warn`).

use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use college_assistant::{commands, config, documents, migrate, server};

/// College Assistant: answers timetable questions from the lecture store
/// with a generative model, falling back to a plain listing.
#[derive(Parser)]
#[command(
    name = "assist",
    about = "College Assistant: timetable-aware chat for students",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/assist.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Manage the lecture timetable.
    Lectures {
        #[command(subcommand)]
        action: LecturesAction,
    },

    /// Answer a single question and record it in the transcript.
    Ask {
        question: String,
    },

    /// Chat interactively. Type `exit` or press Ctrl-D to leave.
    Chat,

    /// Print the chat transcript.
    History {
        /// Forget the transcript instead of printing it.
        #[arg(long)]
        clear: bool,
    },

    /// Inspect or clear the response cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage knowledge documents. Requires an embedding provider.
    Docs {
        #[command(subcommand)]
        action: DocsAction,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum LecturesAction {
    /// Append lectures from a JSON file holding an array of lecture objects.
    Import { path: PathBuf },
    /// Print stored lectures in storage order.
    List {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Delete every stored lecture.
    Clear,
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    Clear,
}

#[derive(Subcommand)]
enum DocsAction {
    /// Embed and store a document.
    Add {
        content: String,
        /// Recorded as `metadata.source`.
        #[arg(long)]
        source: Option<String>,
    },
    /// Find the documents most similar to a query.
    Search {
        query: String,
        #[arg(long, default_value_t = documents::DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Lectures { action } => match action {
            LecturesAction::Import { path } => {
                commands::run_lectures_import(&cfg, &path).await?;
            }
            LecturesAction::List { limit } => {
                commands::run_lectures_list(&cfg, limit).await?;
            }
            LecturesAction::Clear => {
                commands::run_lectures_clear(&cfg).await?;
            }
        },
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Chat => {
            commands::run_chat(&cfg).await?;
        }
        Commands::History { clear } => {
            commands::run_history(&cfg, clear)?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => commands::run_cache_stats(&cfg)?,
            CacheAction::Clear => commands::run_cache_clear(&cfg)?,
        },
        Commands::Docs { action } => match action {
            DocsAction::Add { content, source } => {
                commands::run_docs_add(&cfg, &content, source).await?;
            }
            DocsAction::Search { query, limit } => {
                commands::run_docs_search(&cfg, &query, limit).await?;
            }
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
