//! # Compliance Bridge CLI (`bridge`)
//!
//! The `bridge` binary drives every part of the assistant: the control
//! index, the hosted chat model, the local RAG pipeline, the Confluence
//! poll loop and the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! bridge --config ./config/bridge.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `bridge init` | Create the SQLite vector database |
//! | `bridge index build --csv <file>` | Embed the control catalog into the flat index |
//! | `bridge retrieve "<query>"` | Show the closest catalog controls |
//! | `bridge chat "<message>"` | One-shot question to the chat model |
//! | `bridge fedramp "<question>"` | Structured FedRAMP question |
//! | `bridge session` | Interactive multi-turn chat |
//! | `bridge train` | Index uploaded documents for RAG |
//! | `bridge ask "<question>"` | Answer from the RAG pipeline |
//! | `bridge poll` | Answer requests on the Confluence page |
//! | `bridge serve` | Start the HTTP server |
//!
//! Secrets come from the environment (or a `.env` file):
//! `CISCO_CLIENT_ID`, `CISCO_CLIENT_SECRET`, `CISCO_APP_KEY`,
//! `CONFLUENCE_USERNAME`, `CONFLUENCE_API_TOKEN`.

use clap::{Parser, Subcommand};
use compliance_bridge::commands::{self, ContextSource};
use compliance_bridge::{chat, config, logging, migrate, server};
use std::path::PathBuf;

/// Compliance Bridge CLI: FedRAMP answers from a chat model or local RAG,
/// relayed through a Confluence page.
#[derive(Parser)]
#[command(
    name = "bridge",
    about = "Compliance Bridge: FedRAMP answers from a chat model or local RAG, relayed through Confluence",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/bridge.toml`. When the file does not exist every
    /// section falls back to its defaults.
    #[arg(long, global = true, default_value = "./config/bridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vector database schema. Idempotent.
    Init,

    /// Manage the local control index.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Print the catalog controls closest to a query.
    Retrieve {
        query: String,

        /// Number of controls to return (default `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Send one message to the chat model.
    Chat {
        message: String,

        #[command(flatten)]
        context: ContextArgs,

        /// Ground the message in this many retrieved catalog controls.
        #[arg(long)]
        retrieve_k: Option<usize>,
    },

    /// Ask a question wrapped in the structured FedRAMP prompt.
    Fedramp {
        question: String,

        #[command(flatten)]
        context: ContextArgs,

        /// Ground the question in this many retrieved catalog controls.
        #[arg(long)]
        retrieve_k: Option<usize>,
    },

    /// Start an interactive conversation. Type `quit` to leave.
    Session {
        #[command(flatten)]
        context: ContextArgs,

        /// System prompt that opens the conversation.
        #[arg(long, default_value = chat::SESSION_SYSTEM_PROMPT)]
        system: String,
    },

    /// Index the documents in a folder into the RAG vector store.
    Train {
        /// Folder to index (default `[rag].data_dir`).
        #[arg(long)]
        folder: Option<PathBuf>,
    },

    /// Answer a question from the RAG vector store.
    Ask { question: String },

    /// Poll the Confluence page and answer new requests until interrupted.
    Poll {
        /// `chat` or `rag` (default `[poll].backend`).
        #[arg(long)]
        backend: Option<String>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed a control catalog CSV and write the index and contents files.
    Build {
        /// Catalog export (FedRAMP High baseline CSV).
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(clap::Args)]
struct ContextArgs {
    /// Load a text file as the context.
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// Load a CSV as the context.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// CSV columns to keep (repeatable; default control id, name and text).
    #[arg(long = "column")]
    columns: Vec<String>,
}

impl ContextArgs {
    fn into_source(self, retrieve_k: Option<usize>) -> ContextSource {
        ContextSource {
            file: self.context_file,
            csv: self.csv,
            columns: self.columns,
            retrieve_k,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    logging::init_logger()?;

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
        config::Config::minimal()
    };

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg.rag.db_path).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index { action } => match action {
            IndexAction::Build { csv } => {
                commands::run_index_build(&cfg, &csv).await?;
            }
        },
        Commands::Retrieve { query, k } => {
            commands::run_retrieve(&cfg, &query, k).await?;
        }
        Commands::Chat {
            message,
            context,
            retrieve_k,
        } => {
            commands::run_chat(&cfg, &message, &context.into_source(retrieve_k)).await?;
        }
        Commands::Fedramp {
            question,
            context,
            retrieve_k,
        } => {
            commands::run_fedramp(&cfg, &question, &context.into_source(retrieve_k)).await?;
        }
        Commands::Session { context, system } => {
            commands::run_session(&cfg, &context.into_source(None), &system).await?;
        }
        Commands::Train { folder } => {
            commands::run_train(&cfg, folder.as_deref()).await?;
        }
        Commands::Ask { question } => {
            commands::run_ask(&cfg, &question).await?;
        }
        Commands::Poll { backend } => {
            commands::run_poll(&cfg, backend.as_deref()).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
