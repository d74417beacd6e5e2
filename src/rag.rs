//! Retrieval-augmented generation over uploaded documents.
//!
//! ```text
//! folder ──▶ loader ──▶ splitter ──▶ embeddings ──▶ VectorStore (SQLite)
//!                                                        │ top-k
//! question ──▶ embed ──────────────────────────────────▶ ┘
//!                  stuffed prompt ──▶ LanguageModel ──▶ answer
//! ```
//!
//! The pipeline has two pieces of state that must be set up in order: a
//! vector store ([`RagPipeline::load_and_index_documents`] or
//! [`RagPipeline::load_vectorstore`]) and a QA chain
//! ([`RagPipeline::setup_qa_chain`]). Calling out of order yields a
//! [`RagError`] naming the missing piece.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::chunk::{chunk_text, TextSplitter};
use crate::config::{Config, RagConfig};
use crate::embedding::{self, embed_batched, embed_query, EmbeddingProvider};
use crate::llm::{LanguageModel, OllamaModel};
use crate::loader::load_documents;
use crate::store::VectorStore;

pub const DEFAULT_TEMPLATE: &str = "\n{context}\nQuestion: {question}\nAnswer:\n";

#[derive(Debug, Error)]
pub enum RagError {
    #[error("No supported documents found.")]
    NoDocuments,
    #[error("No text chunks found after splitting.")]
    NoChunks,
    #[error("Vectorstore is not initialized.")]
    VectorstoreNotInitialized,
    #[error("QA chain not initialized.")]
    ChainNotInitialized,
    #[error("prompt template must contain {{context}} and {{question}}")]
    InvalidTemplate,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, RagError> {
        let template = template.into();
        if !template.contains("{context}") || !template.contains("{question}") {
            return Err(RagError::InvalidTemplate);
        }
        Ok(Self { template })
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        self.template
            .replace("{context}", context)
            .replace("{question}", question)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

struct QaChain {
    template: PromptTemplate,
    k: usize,
}

pub struct RagPipeline {
    data_dir: std::path::PathBuf,
    db_path: std::path::PathBuf,
    splitter: TextSplitter,
    top_k: usize,
    batch_size: usize,
    embeddings: Arc<dyn EmbeddingProvider>,
    model: Arc<dyn LanguageModel>,
    store: Option<VectorStore>,
    chain: Option<QaChain>,
}

impl RagPipeline {
    /// Pipeline with the configured embedding provider and an Ollama model.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let embeddings: Arc<dyn EmbeddingProvider> =
            Arc::from(embedding::create_provider(&config.embedding)?);
        let model: Arc<dyn LanguageModel> = Arc::new(OllamaModel::new(&config.rag)?);
        Ok(Self::with_components(
            &config.rag,
            config.embedding.batch_size,
            embeddings,
            model,
        ))
    }

    pub fn with_components(
        config: &RagConfig,
        batch_size: usize,
        embeddings: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            db_path: config.db_path.clone(),
            splitter: TextSplitter::new(config.chunk_size, config.chunk_overlap),
            top_k: config.top_k,
            batch_size,
            embeddings,
            model,
            store: None,
            chain: None,
        }
    }

    /// Folder uploads land in.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn has_vectorstore(&self) -> bool {
        self.store.is_some()
    }

    pub fn has_chain(&self) -> bool {
        self.chain.is_some()
    }

    /// Loads, splits and embeds every supported file under `folder` and
    /// rebuilds the store from scratch. Returns the number of stored chunks.
    pub async fn load_and_index_documents(&mut self, folder: &Path) -> Result<usize, RagError> {
        let documents = load_documents(folder)?;
        if documents.is_empty() {
            return Err(RagError::NoDocuments);
        }

        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|doc| chunk_text(&doc.source, &doc.text, &self.splitter))
            .collect();
        if chunks.is_empty() {
            return Err(RagError::NoChunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(self.embeddings.as_ref(), &texts, self.batch_size).await?;

        let store = VectorStore::create(&self.db_path).await?;
        store
            .replace_all(&chunks, &vectors, self.embeddings.model_name())
            .await?;
        self.store = Some(store);

        tracing::info!(
            folder = %folder.display(),
            documents = documents.len(),
            chunks = chunks.len(),
            "indexed documents"
        );
        Ok(chunks.len())
    }

    /// Opens the store a previous indexing run persisted.
    pub async fn load_vectorstore(&mut self) -> Result<(), RagError> {
        let store = VectorStore::open_existing(&self.db_path).await?;
        if let Some(model) = store.model().await? {
            if model != self.embeddings.model_name() {
                tracing::warn!(
                    stored = %model,
                    configured = self.embeddings.model_name(),
                    "vector store was built with a different embedding model"
                );
            }
        }
        if let Some(built_at) = store.built_at().await? {
            tracing::debug!(%built_at, "loaded vector store");
        }
        self.store = Some(store);
        Ok(())
    }

    /// Binds a top-k retriever and the model to `template` (default when `None`).
    pub fn setup_qa_chain(&mut self, template: Option<PromptTemplate>) -> Result<(), RagError> {
        if self.store.is_none() {
            return Err(RagError::VectorstoreNotInitialized);
        }
        self.chain = Some(QaChain {
            template: template.unwrap_or_default(),
            k: self.top_k,
        });
        tracing::debug!(k = self.top_k, model = self.model.name(), "QA chain ready");
        Ok(())
    }

    pub async fn ask(&self, question: &str) -> Result<String, RagError> {
        let chain = self.chain.as_ref().ok_or(RagError::ChainNotInitialized)?;
        let store = self
            .store
            .as_ref()
            .ok_or(RagError::VectorstoreNotInitialized)?;

        let query = embed_query(self.embeddings.as_ref(), question).await?;
        let hits = store.similarity_search(&query, chain.k).await?;
        let context = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = chain.template.render(&context, question);
        let answer = self.model.generate(&prompt).await?;
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingProvider;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records prompts and answers with a fixed string.
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("stub answer".to_string())
        }
    }

    fn pipeline(dir: &TempDir) -> (RagPipeline, Arc<RecordingModel>) {
        let config = RagConfig {
            data_dir: dir.path().join("uploads"),
            db_path: dir.path().join("vectors.sqlite"),
            ..RagConfig::default()
        };
        let model = Arc::new(RecordingModel {
            prompts: Mutex::new(Vec::new()),
        });
        let pipeline = RagPipeline::with_components(
            &config,
            16,
            Arc::new(HashingProvider::new(128)),
            model.clone(),
        );
        (pipeline, model)
    }

    #[tokio::test]
    async fn ask_before_setup_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (mut rag, _) = pipeline(&dir);
        assert!(matches!(
            rag.setup_qa_chain(None),
            Err(RagError::VectorstoreNotInitialized)
        ));
        assert!(matches!(
            rag.ask("anything").await,
            Err(RagError::ChainNotInitialized)
        ));
    }

    #[tokio::test]
    async fn empty_folder_has_no_documents() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("uploads");
        std::fs::create_dir_all(&folder).unwrap();
        let (mut rag, _) = pipeline(&dir);
        let err = rag.load_and_index_documents(&folder).await.unwrap_err();
        assert_eq!(err.to_string(), "No supported documents found.");
    }

    #[tokio::test]
    async fn blank_documents_yield_no_chunks() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("uploads");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("empty.txt"), "   \n").unwrap();
        let (mut rag, _) = pipeline(&dir);
        let err = rag.load_and_index_documents(&folder).await.unwrap_err();
        assert!(matches!(err, RagError::NoChunks));
    }

    #[tokio::test]
    async fn stuffs_retrieved_chunks_into_template() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("uploads");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("ac.txt"), "Access control policy is reviewed annually.").unwrap();
        std::fs::write(folder.join("ir.txt"), "Incident response drills happen quarterly.").unwrap();

        let (mut rag, model) = pipeline(&dir);
        assert_eq!(rag.load_and_index_documents(&folder).await.unwrap(), 2);
        rag.setup_qa_chain(None).unwrap();

        let answer = rag.ask("How often is the access control policy reviewed?").await.unwrap();
        assert_eq!(answer, "stub answer");

        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("\nAccess control policy is reviewed annually."));
        assert!(prompts[0].ends_with(
            "\nQuestion: How often is the access control policy reviewed?\nAnswer:\n"
        ));
    }

    #[tokio::test]
    async fn persisted_store_reloads() {
        let dir = TempDir::new().unwrap();
        let folder = dir.path().join("uploads");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("a.txt"), "alpha").unwrap();

        let (mut first, _) = pipeline(&dir);
        first.load_and_index_documents(&folder).await.unwrap();

        let (mut second, _) = pipeline(&dir);
        second.load_vectorstore().await.unwrap();
        second
            .setup_qa_chain(Some(PromptTemplate::new("{context}|{question}").unwrap()))
            .unwrap();
        assert_eq!(second.ask("alpha?").await.unwrap(), "stub answer");
    }

    #[test]
    fn template_requires_both_placeholders() {
        assert!(PromptTemplate::new("{context} only").is_err());
        let t = PromptTemplate::new("C={context};Q={question}").unwrap();
        assert_eq!(t.render("ctx", "q"), "C=ctx;Q=q");
    }
}
