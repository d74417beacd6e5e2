//! Polling loop that answers requests typed into the Confluence page.
//!
//! Every cycle reads the page, looks at the request cell and the answer
//! cell, and decides what to do:
//!
//! | Request | Answer | Last seen | Action |
//! |---------|--------|-----------|--------|
//! | empty | empty | any | [`PollOutcome::Idle`] |
//! | empty | present | any | clear the answer ([`PollOutcome::Cleared`]) |
//! | non-empty | any | same request | [`PollOutcome::Unchanged`] |
//! | non-empty | any | different | ask the backend ([`PollOutcome::Answered`]) |
//!
//! A request is split on the shard separator and every shard is asked once
//! per prompt template. A request holding only separators counts as empty.
//! The last-seen request lives in memory only.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::chat::ChatClient;
use crate::config::PollConfig;
use crate::confluence::PageStore;
use crate::rag::RagPipeline;
use crate::table::{PageTable, TableError, TableLayout};

/// Used when `[poll].prompts` is empty.
pub const DEFAULT_PROMPT: &str = "Analyze this provided infrastructure data for FedRAMP High \
certification compliance. For each control gap, provide: Topic name: {} \
1. Analysis: Assess compliance with specific FedRAMP High controls (cite control IDs). \
2. Recommendation: Concise, actionable steps to remediate gaps. \
3. Focus: Concentrate on interconnections, 3-party services, cloud components, FedRAMP requirements for program languages. \
4. Artifacts: Existing tools or processes that could serve as evidence. \
Limit responses to 100 tokens. Prioritize critical security gaps. No introductions needed.";

/// Something that can answer one rendered prompt.
#[async_trait]
pub trait AnswerBackend: Send {
    fn name(&self) -> &str;
    async fn answer(&mut self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl AnswerBackend for ChatClient {
    fn name(&self) -> &str {
        "chat"
    }
    async fn answer(&mut self, prompt: &str) -> Result<String> {
        Ok(self.process_query(prompt).await?)
    }
}

#[async_trait]
impl AnswerBackend for RagPipeline {
    fn name(&self) -> &str {
        "rag"
    }
    async fn answer(&mut self, prompt: &str) -> Result<String> {
        Ok(self.ask(prompt).await?)
    }
}

/// A backend shared with other tasks (the HTTP server shares its pipeline).
#[async_trait]
impl<B: AnswerBackend> AnswerBackend for Arc<tokio::sync::Mutex<B>> {
    fn name(&self) -> &str {
        "shared"
    }
    async fn answer(&mut self, prompt: &str) -> Result<String> {
        self.lock().await.answer(prompt).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Idle,
    Unchanged,
    /// The answer cell was written and pushed once per prompt template.
    Answered { backend_calls: usize },
    Cleared,
    /// The cycle did nothing; the reason was logged.
    Skipped(String),
}

/// Fills `{}` with `shard`, or appends the shard when the template has no slot.
pub fn render_prompt(template: &str, shard: &str) -> String {
    if template.contains("{}") {
        template.replacen("{}", shard, 1)
    } else {
        format!("{}{}", template, shard)
    }
}

/// Non-empty, trimmed pieces of `request` between separators.
pub fn split_shards<'a>(request: &'a str, separator: &str) -> Vec<&'a str> {
    request
        .split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Asks every shard of `request` with one template and renders the answer cell.
pub async fn shard_asking<B: AnswerBackend + ?Sized>(
    backend: &mut B,
    request: &str,
    template: &str,
    separator: &str,
) -> Result<(String, usize)> {
    let mut answer = format!("Prompt used:\n\n{}\n\n", template);
    let shards = split_shards(request, separator);
    for (i, shard) in shards.iter().enumerate() {
        tracing::debug!(shard = i + 1, total = shards.len(), backend = backend.name(), "asking backend");
        let reply = backend.answer(&render_prompt(template, shard)).await?;
        answer.push_str(&reply);
        answer.push('\n');
    }
    Ok((answer, shards.len()))
}

pub struct PollLoop<P, B> {
    page: P,
    backend: B,
    layout: TableLayout,
    prompts: Vec<String>,
    separator: String,
    interval: Duration,
    last_seen: String,
}

impl<P: PageStore, B: AnswerBackend> PollLoop<P, B> {
    pub fn new(page: P, backend: B, layout: TableLayout, config: &PollConfig) -> Self {
        let prompts = if config.prompts.is_empty() {
            vec![DEFAULT_PROMPT.to_string()]
        } else {
            config.prompts.clone()
        };
        Self {
            page,
            backend,
            layout,
            prompts,
            separator: config.shard_separator.clone(),
            interval: Duration::from_secs(config.interval_secs),
            last_seen: String::new(),
        }
    }

    pub fn last_seen(&self) -> &str {
        &self.last_seen
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    /// One read-decide-write cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let Some(body) = self.page.read_doc().await else {
            return skipped("page could not be read".to_string());
        };

        let (request, answer_row, answer) = match read_cells(&body, &self.layout) {
            Ok(cells) => cells,
            Err(e) => return skipped(e.to_string()),
        };

        // A request made only of separators has nothing to ask.
        if split_shards(&request, &self.separator).is_empty() {
            self.last_seen.clear();
            if answer.is_empty() {
                return PollOutcome::Idle;
            }
            let content = match write_answer(&body, answer_row, "") {
                Ok(content) => content,
                Err(e) => return skipped(e.to_string()),
            };
            if let Err(e) = self.page.update_doc(&content).await {
                return skipped(format!("clearing answer failed: {}", e));
            }
            tracing::info!("request removed, answer cleared");
            return PollOutcome::Cleared;
        }

        if request == self.last_seen {
            return PollOutcome::Unchanged;
        }

        tracing::info!(request = %request, prompts = self.prompts.len(), "new request");
        let mut backend_calls = 0;
        for template in &self.prompts {
            let (text, calls) =
                match shard_asking(&mut self.backend, &request, template, &self.separator).await {
                    Ok(result) => result,
                    // last_seen stays put so the next cycle retries.
                    Err(e) => return skipped(format!("backend failed: {:#}", e)),
                };
            backend_calls += calls;

            let content = match write_answer(&body, answer_row, &text) {
                Ok(content) => content,
                Err(e) => return skipped(e.to_string()),
            };
            if let Err(e) = self.page.update_doc(&content).await {
                tracing::warn!(error = %e, "pushing answer failed");
            }
        }

        self.last_seen = request;
        PollOutcome::Answered { backend_calls }
    }

    /// Polls forever, sleeping `interval_secs` before every cycle.
    pub async fn run(&mut self) {
        tracing::info!(
            backend = self.backend.name(),
            interval_secs = self.interval.as_secs(),
            "poll loop started"
        );
        loop {
            tokio::time::sleep(self.interval).await;
            let outcome = self.poll_once().await;
            tracing::debug!(?outcome, "poll cycle finished");
        }
    }
}

/// Request text, answer row index, and answer text.
fn read_cells(body: &str, layout: &TableLayout) -> Result<(String, usize, String), TableError> {
    let table = PageTable::parse_content(body)?;
    let request_row = table.request_row(layout)?;
    let answer_row = table.answer_row(layout)?;
    Ok((
        table.find_data_in_cell(request_row)?,
        answer_row,
        table.find_data_in_cell(answer_row)?,
    ))
}

fn write_answer(body: &str, answer_row: usize, text: &str) -> Result<String, TableError> {
    let mut table = PageTable::parse_content(body)?;
    table.update_cell(answer_row, text)?;
    Ok(table.generate_content())
}

fn skipped(reason: String) -> PollOutcome {
    tracing::warn!(%reason, "poll cycle skipped");
    PollOutcome::Skipped(reason)
}
