//! # askdocs CLI
//!
//! Ask questions about your documents. `askdocs` syncs configured sources
//! into a vector index and answers questions from the indexed text.
//!
//! ## Usage
//!
//! ```bash
//! askdocs --config ./config/askdocs.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdocs sync [SOURCE]` | Sync one source (`github:courses`) or `all` |
//! | `askdocs ask "<question>"` | Answer a question and list its sources |
//! | `askdocs search "<question>"` | Ranked chunks with scores, no generation |
//! | `askdocs documents` | Indexed documents with chunk counts |
//! | `askdocs status` | Backend, counts and models |
//! | `askdocs sources` | Configured sources and their health |
//! | `askdocs clear` | Remove every chunk from the index |
//! | `askdocs serve` | Start the HTTP API |

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use askdocs::app::App;
use askdocs::config::{load_config, Config};
use askdocs::error::PipelineError;
use askdocs::ingest::print_summary;
use askdocs::models::Answer;
use askdocs::{logging, server, sources, status};

/// askdocs: question answering over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used when the default path does
/// not exist.
#[derive(Parser)]
#[command(name = "askdocs", version, about = "Question answering over your own documents")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync documents from a source into the index.
    ///
    /// Source format: `all` or `<type>:<name>` (e.g. `filesystem:notes`).
    /// Ctrl-C stops the sync after the current document.
    Sync {
        #[arg(default_value = "all")]
        source: String,
    },

    /// Answer a question from the indexed documents.
    Ask { question: String },

    /// Show the chunks most similar to a question.
    Search {
        question: String,

        /// Number of results (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List indexed documents.
    Documents,

    /// Show index status.
    Status,

    /// List configured sources and their health.
    Sources,

    /// Remove every chunk from the index.
    Clear,

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

const DEFAULT_CONFIG: &str = "./config/askdocs.toml";

fn read_config(path: &Path) -> Result<Config> {
    // The default path is optional; an explicit missing file is still an error.
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        return Ok(Config::default());
    }
    load_config(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = read_config(&cli.config)?;
    logging::init(&config.logging);

    // Needs no index or providers.
    if let Commands::Sources = cli.command {
        sources::list_sources(&config);
        return Ok(());
    }

    let app = Arc::new(App::open(config).await?);

    match cli.command {
        Commands::Sync { source } => {
            let flag = app.cancel_flag();
            let ctrl_c = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("cancelling after the current document...");
                    flag.cancel();
                }
            });
            let result = app.sync(&source).await;
            ctrl_c.abort();
            let summaries = result?;
            if summaries.is_empty() {
                println!("No sources configured.");
            }
            for summary in &summaries {
                print_summary(summary);
            }
        }
        Commands::Ask { question } => {
            let answer = match app.ask(&question).await {
                Ok(answer) => answer,
                Err(PipelineError::NoRelevantContext) => Answer::not_found(),
                Err(e) => {
                    tracing::error!(error = %e, "ask failed");
                    eprintln!("{}", e.user_message());
                    std::process::exit(1);
                }
            };
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!();
                println!("Sources:");
                for source in &answer.sources {
                    println!("  - {}", source);
                }
            }
        }
        Commands::Search { question, limit } => {
            let results = app.search(&question, limit).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, hit) in results.iter().enumerate() {
                let preview: String = hit.chunk.text.chars().take(160).collect();
                println!(
                    "{}. [{:.3}] {} #{}",
                    i + 1,
                    hit.score,
                    hit.chunk.document,
                    hit.chunk.chunk_index
                );
                println!("   {}", preview.replace('\n', " "));
            }
        }
        Commands::Documents => {
            let docs = app.documents().await?;
            if docs.is_empty() {
                println!("No documents indexed.");
            } else {
                println!("{:<40} {:<28} {:>6}", "DOCUMENT", "SOURCE", "CHUNKS");
                for doc in &docs {
                    println!("{:<40} {:<28} {:>6}", doc.name, doc.source, doc.chunks);
                }
            }
        }
        Commands::Status => {
            status::print_status(&app.status().await?);
        }
        Commands::Clear => {
            let removed = app.clear().await?;
            println!("Removed {} chunks.", removed);
        }
        Commands::Serve => {
            server::run_server(app).await?;
        }
        Commands::Sources => {}
    }

    Ok(())
}
