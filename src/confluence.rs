//! Confluence REST client for a single page.
//!
//! Reads go through `GET /rest/api/content/{id}?expand=body.storage`.
//! Writes are optimistic: read `version.number`, then `PUT` the new body
//! with `version.number + 1`. Confluence answers 409 when someone else saved
//! in between; that read-increment-write is retried a bounded number of
//! times. A concurrent editor can still lose work if their save lands after
//! ours without conflicting; the page has no stronger locking primitive.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfluenceConfig, ConfluenceCredentials};

#[derive(Debug, Error)]
pub enum ConfluenceError {
    #[error("Confluence returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("version conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error("unexpected Confluence response: {0}")]
    Malformed(String),
    #[error("Confluence request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// The page the bridge reads requests from and writes answers to.
#[async_trait]
pub trait PageStore: Send + Sync {
    /// Storage-format body, or `None` when the page cannot be read.
    async fn read_doc(&self) -> Option<String>;
    async fn update_doc(&self, content: &str) -> Result<(), ConfluenceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub version: u64,
    pub body: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    version: Option<VersionField>,
    body: Option<BodyField>,
}

#[derive(Deserialize)]
struct VersionField {
    number: u64,
}

#[derive(Deserialize)]
struct BodyField {
    storage: StorageField,
}

#[derive(Deserialize)]
struct StorageField {
    value: String,
}

pub struct ConfluenceClient {
    http: reqwest::Client,
    content_url: String,
    credentials: ConfluenceCredentials,
    conflict_retries: u32,
}

impl ConfluenceClient {
    pub fn new(
        config: &ConfluenceConfig,
        credentials: ConfluenceCredentials,
    ) -> Result<Self, ConfluenceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            content_url: format!(
                "{}/rest/api/content/{}",
                config.base_url.trim_end_matches('/'),
                config.page_id
            ),
            credentials,
            conflict_retries: config.conflict_retries,
        })
    }

    async fn get_content(&self, expand: &str) -> Result<ContentResponse, ConfluenceError> {
        let response = self
            .http
            .get(&self.content_url)
            .query(&[("expand", expand)])
            .basic_auth(&self.credentials.username, Some(&self.credentials.api_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConfluenceError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    pub async fn fetch_page(&self) -> Result<Page, ConfluenceError> {
        let content = self.get_content("body.storage").await?;
        let body = content
            .body
            .map(|b| b.storage.value)
            .ok_or_else(|| ConfluenceError::Malformed("missing body.storage".to_string()))?;
        Ok(Page {
            id: content.id,
            title: content.title,
            version: content.version.map(|v| v.number).unwrap_or(1),
            body,
        })
    }

    /// Current version number (1 when absent) and title.
    async fn fetch_version(&self) -> Result<(u64, String), ConfluenceError> {
        let content = self.get_content("version").await?;
        Ok((content.version.map(|v| v.number).unwrap_or(1), content.title))
    }

    async fn put_body(&self, version: u64, title: &str, content: &str) -> Result<reqwest::Response, ConfluenceError> {
        let payload = serde_json::json!({
            "version": { "number": version },
            "title": title,
            "type": "page",
            "body": {
                "storage": {
                    "value": content,
                    "representation": "storage"
                }
            }
        });
        Ok(self
            .http
            .put(&self.content_url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.api_token))
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?)
    }
}

#[async_trait]
impl PageStore for ConfluenceClient {
    async fn read_doc(&self) -> Option<String> {
        match self.fetch_page().await {
            Ok(page) => Some(page.body),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read Confluence page");
                None
            }
        }
    }

    async fn update_doc(&self, content: &str) -> Result<(), ConfluenceError> {
        let attempts = self.conflict_retries + 1;
        for attempt in 1..=attempts {
            let (current, title) = self.fetch_version().await?;
            let response = self.put_body(current + 1, &title, content).await?;
            let status = response.status();

            if status.is_success() {
                tracing::info!(version = current + 1, "Confluence page updated");
                return Ok(());
            }
            if status == reqwest::StatusCode::CONFLICT {
                tracing::warn!(attempt, version = current + 1, "Confluence version conflict");
                continue;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(ConfluenceError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Err(ConfluenceError::Conflict { attempts })
    }
}
