//! Local language model seam.
//!
//! [`LanguageModel`] turns a fully rendered prompt into text. The shipped
//! implementation talks to an Ollama server's non-streaming generate API.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::RagConfig;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub struct OllamaModel {
    client: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

impl OllamaModel {
    pub fn new(config: &RagConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Ollama connection error: {} (is Ollama running at {}?)", e, self.url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, text);
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .response
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
    }
}
