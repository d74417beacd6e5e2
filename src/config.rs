//! TOML configuration plus environment-supplied secrets.
//!
//! Everything that is not a secret lives in the config file. Client
//! credentials and Confluence credentials are read from the environment
//! (a `.env` file next to the process is honored, see [`load_dotenv`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_CLIENT_ID: &str = "CISCO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "CISCO_CLIENT_SECRET";
pub const ENV_APP_KEY: &str = "CISCO_APP_KEY";
pub const ENV_CONFLUENCE_USERNAME: &str = "CONFLUENCE_USERNAME";
pub const ENV_CONFLUENCE_API_TOKEN: &str = "CONFLUENCE_API_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub rag: RagConfig,
    pub confluence: Option<ConfluenceConfig>,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_token_url() -> String {
    "https://id.cisco.com/oauth2/default/v1/token".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_deployment")]
    pub deployment: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Context window the deployment accepts, in tokens.
    #[serde(default = "default_token_ceiling")]
    pub token_ceiling: usize,
    /// Tokens held back for the reply when loading a flat-file context.
    #[serde(default = "default_reserve")]
    pub reserve_tokens: usize,
    /// Tokens held back for the reply when loading a CSV context.
    #[serde(default = "default_csv_reserve")]
    pub csv_reserve_tokens: usize,
    /// Minimum seconds between two requests; 0 disables the gate.
    #[serde(default)]
    pub rate_limit_wait_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            api_version: default_api_version(),
            deployment: default_deployment(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            token_ceiling: default_token_ceiling(),
            reserve_tokens: default_reserve(),
            csv_reserve_tokens: default_csv_reserve(),
            rate_limit_wait_secs: 0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chat_endpoint() -> String {
    "https://chat-ai.cisco.com".to_string()
}
fn default_api_version() -> String {
    "2024-12-01-preview".to_string()
}
fn default_deployment() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_token_ceiling() -> usize {
    120_000
}
fn default_reserve() -> usize {
    1000
}
fn default_csv_reserve() -> usize {
    2000
}
fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_contents_path")]
    pub contents_path: PathBuf,
    #[serde(default = "default_retrieval_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            contents_path: default_contents_path(),
            top_k: default_retrieval_k(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/local_fedramp.index")
}
fn default_contents_path() -> PathBuf {
    PathBuf::from("./data/local_fedramp_contents.json")
}
fn default_retrieval_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    /// Folder that uploads land in and training reads from.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// SQLite file holding chunks and their vectors.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_rag_k")]
    pub top_k: usize,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_path: default_db_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_rag_k(),
            model: default_llm_model(),
            ollama_url: default_ollama_url(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/vectors.sqlite")
}
fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_rag_k() -> usize {
    3
}
fn default_llm_model() -> String {
    "gemma3".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluenceConfig {
    pub base_url: String,
    pub page_id: String,
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_conflict_retries() -> u32 {
    3
}

/// How the request and answer cells are found in the page table.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum LayoutConfig {
    /// Zero-based row indices.
    Positional {
        #[serde(default = "default_request_row")]
        request_row: usize,
        #[serde(default = "default_answer_row")]
        answer_row: usize,
    },
    /// The value row directly follows a row whose first cell holds the label.
    Labeled {
        request_label: String,
        answer_label: String,
    },
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig::Positional {
            request_row: default_request_row(),
            answer_row: default_answer_row(),
        }
    }
}

fn default_request_row() -> usize {
    1
}
fn default_answer_row() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// `chat` or `rag`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Prompt templates asked in turn for every request; `{}` is replaced by
    /// the request shard, otherwise the shard is appended.
    #[serde(default)]
    pub prompts: Vec<String>,
    /// Separator that splits one request into independently answered shards.
    #[serde(default = "default_shard_separator")]
    pub shard_separator: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            backend: default_backend(),
            prompts: Vec::new(),
            shard_separator: default_shard_separator(),
        }
    }
}

fn default_interval_secs() -> u64 {
    2
}
fn default_backend() -> String {
    "chat".to_string()
}
fn default_shard_separator() -> String {
    "--".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Client credentials for the token exchange and chat calls.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub app_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("app_key", &"***")
            .finish()
    }
}

impl Credentials {
    /// Explicit values win; missing ones fall back to the environment.
    pub fn resolve(
        client_id: Option<String>,
        client_secret: Option<String>,
        app_key: Option<String>,
    ) -> Result<Self> {
        let client_id = client_id.or_else(|| non_empty_env(ENV_CLIENT_ID));
        let client_secret = client_secret.or_else(|| non_empty_env(ENV_CLIENT_SECRET));
        let app_key = app_key.or_else(|| non_empty_env(ENV_APP_KEY));

        match (client_id, client_secret, app_key) {
            (Some(client_id), Some(client_secret), Some(app_key)) => Ok(Self {
                client_id,
                client_secret,
                app_key,
            }),
            _ => anyhow::bail!(
                "Missing credentials. Provide them as parameters or set {}, {} and {}.",
                ENV_CLIENT_ID,
                ENV_CLIENT_SECRET,
                ENV_APP_KEY
            ),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::resolve(None, None, None)
    }
}

/// Basic-auth pair for the Confluence REST API.
#[derive(Clone)]
pub struct ConfluenceCredentials {
    pub username: String,
    pub api_token: String,
}

impl ConfluenceCredentials {
    pub fn from_env() -> Result<Self> {
        let username = non_empty_env(ENV_CONFLUENCE_USERNAME)
            .ok_or_else(|| anyhow::anyhow!("{} not set", ENV_CONFLUENCE_USERNAME))?;
        let api_token = non_empty_env(ENV_CONFLUENCE_API_TOKEN)
            .ok_or_else(|| anyhow::anyhow!("{} not set", ENV_CONFLUENCE_API_TOKEN))?;
        Ok(Self {
            username,
            api_token,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Loads `.env` from the working directory if one exists.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "loaded environment file");
    }
}

impl Config {
    /// Configuration with every section at its default. Used by commands
    /// that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            auth: AuthConfig::default(),
            chat: ChatConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            rag: RagConfig::default(),
            confluence: None,
            poll: PollConfig::default(),
            server: ServerConfig::default(),
        }
    }

    pub fn confluence(&self) -> Result<&ConfluenceConfig> {
        self.confluence
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[confluence] section not configured"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chat.reserve_tokens >= config.chat.token_ceiling
        || config.chat.csv_reserve_tokens >= config.chat.token_ceiling
    {
        anyhow::bail!("chat reserve tokens must be smaller than chat.token_ceiling");
    }

    if config.rag.chunk_size == 0 {
        anyhow::bail!("rag.chunk_size must be > 0");
    }
    if config.rag.chunk_overlap >= config.rag.chunk_size {
        anyhow::bail!("rag.chunk_overlap must be smaller than rag.chunk_size");
    }
    if config.rag.top_k == 0 || config.retrieval.top_k == 0 {
        anyhow::bail!("top_k must be >= 1");
    }

    if config.poll.interval_secs == 0 {
        anyhow::bail!("poll.interval_secs must be > 0");
    }
    match config.poll.backend.as_str() {
        "chat" | "rag" => {}
        other => anyhow::bail!("Unknown poll backend: '{}'. Must be chat or rag.", other),
    }

    if let Some(LayoutConfig::Positional {
        request_row,
        answer_row,
    }) = config.confluence.as_ref().map(|c| &c.layout)
    {
        if request_row == answer_row {
            anyhow::bail!("confluence.layout request_row and answer_row must differ");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hashing" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashing, openai, ollama, or local.",
            other
        ),
    }

    Ok(())
}
