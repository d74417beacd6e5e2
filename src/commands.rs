//! CLI command implementations.
//!
//! Each `run_*` function backs one `bridge` subcommand and prints its
//! results to stdout. Failures propagate as `anyhow` errors so `main` can
//! report them and exit non-zero.

use anyhow::{bail, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::catalog::load_controls;
use crate::chat::ChatClient;
use crate::config::{Config, ConfluenceCredentials, Credentials};
use crate::confluence::ConfluenceClient;
use crate::embedding::create_provider;
use crate::orchestrator::PollLoop;
use crate::rag::RagPipeline;
use crate::retrieval::{build_index, LocalRetriever};
use crate::table::TableLayout;

/// Embeds the control catalog at `csv` into the configured index pair.
pub async fn run_index_build(config: &Config, csv: &Path) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Building the index requires embeddings. Set [embedding] provider in config.");
    }
    let controls = load_controls(csv)?;
    let provider = create_provider(&config.embedding)?;
    let count = build_index(&controls, provider.as_ref(), config).await?;

    println!(
        "Indexed {} controls into {} ({})",
        count,
        config.retrieval.index_path.display(),
        config.retrieval.contents_path.display()
    );
    Ok(())
}

/// Prints the top-k catalog chunks for `query` with their distances.
pub async fn run_retrieve(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let retriever = LocalRetriever::open(&config.retrieval, create_provider(&config.embedding)?)?;
    let k = k.unwrap_or(config.retrieval.top_k);
    let chunks = retriever.retrieve_chunks(query, k).await?;

    if chunks.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, chunk) in chunks.iter().enumerate() {
        println!("{}. [distance: {:.4}]", i + 1, chunk.distance);
        println!("{}", chunk.text);
        println!();
    }
    Ok(())
}

/// Where the context of a chat command comes from.
#[derive(Debug, Default)]
pub struct ContextSource {
    pub file: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub columns: Vec<String>,
    /// Retrieve this many catalog chunks for the message instead.
    pub retrieve_k: Option<usize>,
}

async fn load_context(
    client: &mut ChatClient,
    config: &Config,
    source: &ContextSource,
    query: &str,
) -> Result<()> {
    if let Some(path) = &source.file {
        client.load_context_from_file(path)?;
    }
    if let Some(path) = &source.csv {
        let columns = (!source.columns.is_empty()).then_some(source.columns.as_slice());
        client.load_csv_context(path, columns)?;
    }
    if let Some(k) = source.retrieve_k {
        let retriever =
            LocalRetriever::open(&config.retrieval, create_provider(&config.embedding)?)?;
        client.set_context(retriever.retrieve(query, k).await?);
    }
    Ok(())
}

/// One-shot chat with an optional context.
pub async fn run_chat(config: &Config, message: &str, source: &ContextSource) -> Result<()> {
    let mut client = ChatClient::connect(config, Credentials::from_env()?).await?;
    load_context(&mut client, config, source, message).await?;
    let answer = client.chat(message).await?;
    println!("{}", answer);
    Ok(())
}

/// Structured FedRAMP question, optionally grounded in the catalog index.
pub async fn run_fedramp(config: &Config, question: &str, source: &ContextSource) -> Result<()> {
    let mut client = ChatClient::connect(config, Credentials::from_env()?).await?;
    load_context(&mut client, config, source, question).await?;
    let answer = client.query_fedramp(question).await?;
    println!("{}", answer);
    Ok(())
}

/// Interactive multi-turn conversation on stdin until `quit`, `exit` or `q`.
pub async fn run_session(
    config: &Config,
    source: &ContextSource,
    system: &str,
) -> Result<()> {
    let mut client = ChatClient::connect(config, Credentials::from_env()?).await?;
    load_context(&mut client, config, source, "").await?;
    client.start_conversation(system);

    println!("Type 'quit', 'exit' or 'q' to end the session.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        match client.converse(input).await {
            Ok(answer) => println!("Assistant: {}\n", answer),
            Err(e) => println!("{}\n", e.to_display_string()),
        }
    }
    Ok(())
}

/// Indexes `folder` (default `[rag].data_dir`) into the vector store.
pub async fn run_train(config: &Config, folder: Option<&Path>) -> Result<()> {
    let mut rag = RagPipeline::new(config)?;
    let folder = folder.unwrap_or(rag.data_dir()).to_path_buf();
    let chunks = rag.load_and_index_documents(&folder).await?;
    println!(
        "Training complete: {} chunks stored in {}",
        chunks,
        config.rag.db_path.display()
    );
    Ok(())
}

/// Answers a question from the persisted vector store.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let mut rag = RagPipeline::new(config)?;
    rag.load_vectorstore().await?;
    rag.setup_qa_chain(None)?;
    let answer = rag.ask(question).await?;
    println!("{}", answer);
    Ok(())
}

/// Runs the Confluence poll loop in the foreground with the chosen backend.
pub async fn run_poll(config: &Config, backend: Option<&str>) -> Result<()> {
    let confluence = config.confluence()?;
    let page = ConfluenceClient::new(confluence, ConfluenceCredentials::from_env()?)?;
    let layout = TableLayout::from(&confluence.layout);
    let backend = backend.unwrap_or(&config.poll.backend);

    println!(
        "Polling page {} every {}s with the {} backend. Press Ctrl-C to stop.",
        confluence.page_id, config.poll.interval_secs, backend
    );
    match backend {
        "rag" => {
            let mut rag = RagPipeline::new(config)?;
            rag.load_vectorstore().await?;
            rag.setup_qa_chain(None)?;
            PollLoop::new(page, rag, layout, &config.poll).run().await;
        }
        "chat" => {
            let client = ChatClient::connect(config, Credentials::from_env()?).await?;
            PollLoop::new(page, client, layout, &config.poll).run().await;
        }
        other => bail!("Unknown poll backend: '{}'. Must be chat or rag.", other),
    }
    Ok(())
}
