//! Local retrieval over the control catalog.
//!
//! [`build_index`] embeds every catalog control and produces the matched
//! pair of files (`<index>` + `<contents>`). [`LocalRetriever`] loads that
//! pair read-only and answers top-k queries.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::catalog::Control;
use crate::config::{Config, RetrievalConfig};
use crate::embedding::{embed_batched, embed_query, EmbeddingProvider};
use crate::vector_index::FlatIndex;

/// A retrieved chunk together with its squared L2 distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub distance: f32,
}

/// Embeds `controls` and writes the index/contents pair. Returns the number
/// of indexed controls.
pub async fn build_index(
    controls: &[Control],
    provider: &dyn EmbeddingProvider,
    config: &Config,
) -> Result<usize> {
    if controls.is_empty() {
        bail!("catalog contains no controls with an id");
    }

    let contents: Vec<String> = controls.iter().map(Control::content).collect();
    let vectors = embed_batched(provider, &contents, config.embedding.batch_size).await?;

    let mut index = FlatIndex::new(provider.dims());
    index.add(&vectors)?;

    save_pair(&index, &contents, &config.retrieval)?;
    tracing::info!(
        controls = contents.len(),
        dims = index.dims(),
        model = provider.model_name(),
        "built local index"
    );
    Ok(contents.len())
}

fn save_pair(index: &FlatIndex, contents: &[String], config: &RetrievalConfig) -> Result<()> {
    index.save(&config.index_path)?;
    if let Some(parent) = config.contents_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(contents)?;
    std::fs::write(&config.contents_path, json).with_context(|| {
        format!(
            "Failed to write contents: {}",
            config.contents_path.display()
        )
    })
}

fn load_contents(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read contents: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid contents file: {}", path.display()))
}

pub struct LocalRetriever {
    index: FlatIndex,
    contents: Vec<String>,
    provider: Box<dyn EmbeddingProvider>,
}

impl LocalRetriever {
    /// Pairs an in-memory index with its contents.
    pub fn new(
        index: FlatIndex,
        contents: Vec<String>,
        provider: Box<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if index.len() != contents.len() {
            bail!(
                "index holds {} vectors but contents hold {} chunks",
                index.len(),
                contents.len()
            );
        }
        if !index.is_empty() && index.dims() != provider.dims() {
            bail!(
                "index has {} dimensions but embedding model '{}' produces {}",
                index.dims(),
                provider.model_name(),
                provider.dims()
            );
        }
        Ok(Self {
            index,
            contents,
            provider,
        })
    }

    /// Loads the persisted pair named by `config`.
    pub fn open(config: &RetrievalConfig, provider: Box<dyn EmbeddingProvider>) -> Result<Self> {
        let index = FlatIndex::load(&config.index_path)?;
        let contents = load_contents(&config.contents_path)?;
        Self::new(index, contents, provider)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub async fn retrieve_chunks(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        let vector = embed_query(self.provider.as_ref(), query).await?;
        let hits = self.index.search(&vector, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedChunk {
                text: self.contents[hit.position].clone(),
                distance: hit.distance,
            })
            .collect())
    }

    /// Top-`k` chunk texts joined by a blank line.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<String> {
        let chunks = self.retrieve_chunks(query, k).await?;
        tracing::debug!(query, k, hits = chunks.len(), "retrieved context");
        Ok(chunks
            .into_iter()
            .map(|c| c.text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
