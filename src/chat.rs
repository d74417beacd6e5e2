//! Chat-completion client for the OAuth-gated Azure OpenAI deployment.
//!
//! A [`ChatClient`] owns the bearer token, the application key, a single
//! mutable context string, and an in-memory conversation history. Failures
//! come back as a [`ChatError`] so callers can tell an expired token from a
//! rate limit from an upstream fault without matching on message text.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::auth::{AccessToken, AuthError, TokenProvider};
use crate::catalog;
use crate::config::{ChatConfig, Config, Credentials};
use crate::tokens;

const FEDRAMP_EXPERT: &str = "You are a FedRAMP certification expert. Base your answers on the provided security controls.";

/// Opens every interactive session.
pub const SESSION_SYSTEM_PROMPT: &str = "You are a FedRAMP certification expert. Provide clear, specific answers based on the security controls provided.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("upstream error {0}")]
    Upstream(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("response contained no message content")]
    EmptyResponse,
}

impl ChatError {
    /// The `"Error: ..."` rendering shown to people instead of an answer.
    pub fn to_display_string(&self) -> String {
        format!("Error: {}", self)
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to load context file: {0}")]
    ContextFile(String),
    #[error("Failed to load CSV file: {0}")]
    Csv(String),
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    messages: &'a [ChatMessage],
    user: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Keeps requests at least `min_interval` apart. A zero interval never waits.
#[derive(Debug)]
struct RateGate {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateGate {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    async fn wait(&mut self) {
        if self.min_interval.is_zero() {
            return;
        }
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                tracing::info!(secs = remaining.as_secs_f32(), "waiting for rate limit");
                tokio::time::sleep(remaining).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

pub struct ChatClient {
    http: reqwest::Client,
    config: ChatConfig,
    app_key: String,
    token: AccessToken,
    token_provider: Option<TokenProvider>,
    context: String,
    history: Vec<ChatMessage>,
    rate_gate: RateGate,
}

impl ChatClient {
    /// Exchanges the credentials for a token and builds a ready client.
    pub async fn connect(config: &Config, credentials: Credentials) -> anyhow::Result<Self> {
        let app_key = credentials.app_key.clone();
        let provider = TokenProvider::new(&config.auth, credentials)?;
        let token = provider.fetch_token().await?;
        let mut client = Self::with_token(&config.chat, app_key, token)?;
        client.token_provider = Some(provider);
        Ok(client)
    }

    /// Client around an already obtained token. [`refresh_token`](Self::refresh_token)
    /// is unavailable on such a client.
    pub fn with_token(
        config: &ChatConfig,
        app_key: impl Into<String>,
        token: AccessToken,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config: config.clone(),
            app_key: app_key.into(),
            token,
            token_provider: None,
            context: String::new(),
            history: Vec::new(),
            rate_gate: RateGate::new(Duration::from_secs(config.rate_limit_wait_secs)),
        })
    }

    /// Re-runs the token exchange and swaps in the new bearer.
    pub async fn refresh_token(&mut self) -> Result<(), ChatError> {
        let provider = self
            .token_provider
            .as_ref()
            .ok_or_else(|| ChatError::Auth("client was built without credentials".into()))?;
        self.token = provider.fetch_token().await.map_err(|e| match e {
            AuthError::Transport(t) => ChatError::Transport(t.to_string()),
            other => ChatError::Auth(other.to_string()),
        })?;
        Ok(())
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Loads a UTF-8 file as the context, truncated to the token ceiling minus
    /// the reply reserve. Returns the token count kept.
    pub fn load_context_from_file(&mut self, path: &Path) -> Result<usize, LoadError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LoadError::ContextFile(format!("{}: {}", path.display(), e)))?;
        let budget = self.config.token_ceiling - self.config.reserve_tokens;
        let (content, count) = tokens::fit_to_budget(content.trim(), budget)
            .map_err(|e| LoadError::ContextFile(e.to_string()))?;
        self.context = content;
        tracing::info!(tokens = count, path = %path.display(), "loaded context file");
        Ok(count)
    }

    /// Loads selected CSV columns (default: control id, name and text) as the context.
    pub fn load_csv_context(
        &mut self,
        path: &Path,
        columns: Option<&[String]>,
    ) -> Result<usize, LoadError> {
        let file = std::fs::File::open(path)
            .map_err(|e| LoadError::Csv(format!("{}: {}", path.display(), e)))?;
        let csv = catalog::format_csv_context(file, columns)
            .map_err(|e| LoadError::Csv(e.to_string()))?;
        let budget = self.config.token_ceiling - self.config.csv_reserve_tokens;
        let (content, count) =
            tokens::fit_to_budget(&csv.text, budget).map_err(|e| LoadError::Csv(e.to_string()))?;
        self.context = content;
        tracing::info!(
            tokens = count,
            rows = csv.rows,
            columns = %csv.columns.join(", "),
            "loaded CSV context"
        );
        Ok(count)
    }

    /// Single-turn request; the loaded context rides along as a system message.
    pub async fn chat(&mut self, input: &str) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(2);
        if !self.context.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Context: {}\n\nUse this context to answer the question.",
                self.context
            )));
        }
        messages.push(ChatMessage::user(input));
        self.complete(&messages).await
    }

    /// Sends the caller's conversation, prefixed with the loaded context.
    pub async fn chat_with_history(&mut self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        let mut formatted = Vec::with_capacity(messages.len() + 1);
        if !self.context.is_empty() {
            formatted.push(ChatMessage::system(format!("Context: {}", self.context)));
        }
        formatted.extend_from_slice(messages);
        self.complete(&formatted).await
    }

    /// One turn of the client-held conversation. The exchange is only
    /// recorded when the model answered.
    pub async fn converse(&mut self, question: &str) -> Result<String, ChatError> {
        self.history.push(ChatMessage::user(question));
        let history = self.history.clone();
        match self.chat_with_history(&history).await {
            Ok(answer) => {
                self.history.push(ChatMessage::assistant(answer.clone()));
                Ok(answer)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    pub fn start_conversation(&mut self, system_prompt: &str) {
        self.history.clear();
        self.history.push(ChatMessage::system(system_prompt));
    }

    /// Question answered by a FedRAMP expert persona grounded in the context.
    pub async fn process_query(&mut self, question: &str) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(2);
        if !self.context.is_empty() {
            messages.push(ChatMessage::system(format!(
                "Context: {}\n\n{}",
                self.context, FEDRAMP_EXPERT
            )));
        }
        messages.push(ChatMessage::user(question));
        self.complete(&messages).await
    }

    /// Wraps the question in the structured FedRAMP instruction prompt.
    pub async fn query_fedramp(&mut self, question: &str) -> Result<String, ChatError> {
        let prompt = fedramp_prompt(question);
        self.chat(&prompt).await
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.config.endpoint.trim_end_matches('/'),
            self.config.deployment
        )
    }

    fn user_param(&self) -> String {
        serde_json::json!({ "appkey": self.app_key }).to_string()
    }

    async fn complete(&mut self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        self.rate_gate.wait().await;

        let body = CompletionRequest {
            messages,
            user: self.user_param(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http
            .post(self.completions_url())
            .query(&[("api-version", self.config.api_version.as_str())])
            .header("api-key", self.token.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "chat completion failed");
            return Err(match status.as_u16() {
                401 | 403 => ChatError::Auth(format!("{}: {}", status, text)),
                429 => ChatError::RateLimited(text),
                _ => ChatError::Upstream(format!("{}: {}", status, text)),
            });
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or(ChatError::EmptyResponse)
    }
}

fn fedramp_prompt(question: &str) -> String {
    format!(
        "You are a FedRAMP certification expert. Based on the FedRAMP security controls provided:\n\n\
         Question: {}\n\n\
         Instructions:\n\
         1. For general FedRAMP questions, provide clear explanations.\n\
         2. For certification questions, list specific requirements and controls.\n\
         3. For compliance questions, identify gaps and required actions.\n\
         4. Always reference specific control IDs when applicable.\n\
         5. Provide practical, actionable recommendations.\n\n\
         Please answer the question in a structured format.",
        question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChatClient {
        let config = ChatConfig {
            endpoint: server.uri(),
            ..ChatConfig::default()
        };
        ChatClient::with_token(&config, "app-key", AccessToken::new("bearer")).unwrap()
    }

    fn completion(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }]
        }))
    }

    #[tokio::test]
    async fn chat_sends_deployment_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(query_param("api-version", "2024-12-01-preview"))
            .and(header("api-key", "bearer"))
            .and(body_partial_json(serde_json::json!({
                "user": "{\"appkey\":\"app-key\"}",
                "messages": [{ "role": "user", "content": "hi" }]
            })))
            .respond_with(completion("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let answer = client(&server).chat("hi").await.unwrap();
        assert_eq!(answer, "hello");
    }

    #[tokio::test]
    async fn loaded_context_becomes_system_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    { "role": "system", "content": format!("Context: AC-1 text\n\n{}", FEDRAMP_EXPERT) },
                    { "role": "user", "content": "What does AC-1 require?" }
                ]
            })))
            .respond_with(completion("policy"))
            .expect(1)
            .mount(&server)
            .await;

        let mut c = client(&server);
        c.set_context("AC-1 text");
        assert_eq!(c.process_query("What does AC-1 require?").await.unwrap(), "policy");
    }

    async fn error_for_status(status: u16) -> ChatError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
        client(&server).chat("hi").await.unwrap_err()
    }

    #[tokio::test]
    async fn status_codes_map_to_tagged_errors() {
        assert!(matches!(error_for_status(401).await, ChatError::Auth(_)));
        assert!(matches!(error_for_status(403).await, ChatError::Auth(_)));
        assert!(matches!(error_for_status(429).await, ChatError::RateLimited(_)));

        let upstream = error_for_status(500).await;
        assert!(matches!(upstream, ChatError::Upstream(_)));
        assert!(upstream.to_display_string().starts_with("Error: "));
    }

    #[tokio::test]
    async fn converse_records_only_answered_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("first answer"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut c = client(&server);
        c.start_conversation("expert");
        c.converse("q1").await.unwrap();
        assert!(c.converse("q2").await.is_err());

        let roles: Vec<&str> = c.history().iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[test]
    fn context_file_is_trimmed_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ctx.txt");
        std::fs::write(&file, "\n  AC-1 Access Control Policy  \n").unwrap();

        let config = ChatConfig::default();
        let mut c = ChatClient::with_token(&config, "k", AccessToken::new("t")).unwrap();
        let count = c.load_context_from_file(&file).unwrap();
        assert_eq!(c.context(), "AC-1 Access Control Policy");
        assert!(count > 0);
    }

    #[test]
    fn context_file_is_truncated_to_budget() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ctx.txt");
        std::fs::write(&file, "word ".repeat(500)).unwrap();

        let config = ChatConfig {
            token_ceiling: 120,
            reserve_tokens: 20,
            ..ChatConfig::default()
        };
        let mut c = ChatClient::with_token(&config, "k", AccessToken::new("t")).unwrap();
        let count = c.load_context_from_file(&file).unwrap();
        assert!(count <= 100);
        assert!(tokens::count_tokens(c.context()).unwrap() <= 100);
    }

    #[test]
    fn missing_context_file_is_a_load_error() {
        let config = ChatConfig::default();
        let mut c = ChatClient::with_token(&config, "k", AccessToken::new("t")).unwrap();
        let err = c
            .load_context_from_file(Path::new("/definitely/not/here.txt"))
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to load context file"));
    }

    #[tokio::test]
    async fn chat_prepends_context_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    {
                        "role": "system",
                        "content": "Context: AC-2 text\n\nUse this context to answer the question."
                    },
                    { "role": "user", "content": "Summarize AC-2" }
                ]
            })))
            .respond_with(completion("accounts"))
            .expect(1)
            .mount(&server)
            .await;

        let mut c = client(&server);
        c.set_context("AC-2 text");
        assert_eq!(c.chat("Summarize AC-2").await.unwrap(), "accounts");
    }

    #[tokio::test]
    async fn history_gets_bare_context_prefix() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [
                    { "role": "system", "content": "Context: IR-4 text" },
                    { "role": "system", "content": "expert" },
                    { "role": "user", "content": "q" }
                ]
            })))
            .respond_with(completion("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let mut c = client(&server);
        c.set_context("IR-4 text");
        let history = vec![ChatMessage::system("expert"), ChatMessage::user("q")];
        assert_eq!(c.chat_with_history(&history).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn query_fedramp_sends_structured_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{ "role": "user", "content": fedramp_prompt("What is AC-2?") }]
            })))
            .respond_with(completion("structured"))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(
            client(&server).query_fedramp("What is AC-2?").await.unwrap(),
            "structured"
        );
        let prompt = fedramp_prompt("What is AC-2?");
        assert!(prompt.contains("Question: What is AC-2?"));
        assert!(prompt.contains("4. Always reference specific control IDs when applicable."));
    }

    #[tokio::test]
    async fn refresh_token_swaps_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "first" })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access_token": "second" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(header("api-key", "second"))
            .respond_with(completion("fresh"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::minimal();
        config.auth = AuthConfig {
            token_url: format!("{}/oauth2/token", server.uri()),
            ..AuthConfig::default()
        };
        config.chat.endpoint = server.uri();
        let credentials = Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            app_key: "app".into(),
        };

        let mut c = ChatClient::connect(&config, credentials).await.unwrap();
        c.refresh_token().await.unwrap();
        assert_eq!(c.chat("hi").await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn refresh_needs_credentials() {
        let config = ChatConfig::default();
        let mut c = ChatClient::with_token(&config, "k", AccessToken::new("t")).unwrap();
        match c.refresh_token().await {
            Err(ChatError::Auth(message)) => assert!(message.contains("without credentials")),
            other => panic!("expected auth error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_gate_spaces_requests() {
        let start = Instant::now();
        let mut gate = RateGate::new(Duration::from_secs(5));

        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(2)).await;
        gate.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(6), "{:?}", elapsed);

        // Already spaced far enough apart: no extra wait.
        tokio::time::advance(Duration::from_secs(10)).await;
        let before = Instant::now();
        gate.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_never_waits() {
        let start = Instant::now();
        let mut gate = RateGate::new(Duration::ZERO);
        gate.wait().await;
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn second_request_waits_for_gate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("ok"))
            .expect(2)
            .mount(&server)
            .await;

        let config = ChatConfig {
            endpoint: server.uri(),
            rate_limit_wait_secs: 1,
            ..ChatConfig::default()
        };
        let mut c = ChatClient::with_token(&config, "k", AccessToken::new("t")).unwrap();
        let start = std::time::Instant::now();
        c.chat("one").await.unwrap();
        c.chat("two").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    const CONTROLS_CSV: &str = "\
Control ID,Control Name,Control Text,Owner
AC-1,Access Control Policy,Develop and disseminate an access control policy.,alice
AC-2,Account Management,Manage information system accounts.,bob
";

    fn csv_file(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let file = dir.path().join("controls.csv");
        std::fs::write(&file, content).unwrap();
        file
    }

    #[test]
    fn csv_context_uses_default_columns() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_file(&dir, CONTROLS_CSV);
        let mut c = ChatClient::with_token(&ChatConfig::default(), "k", AccessToken::new("t")).unwrap();

        c.load_csv_context(&file, None).unwrap();
        assert!(c.context().starts_with(
            "Control ID: AC-1\nControl Name: Access Control Policy\nControl Text: Develop"
        ));
        assert!(c.context().contains(&"-".repeat(80)));
        assert!(!c.context().contains("Owner"));
    }

    #[test]
    fn csv_context_honours_selected_columns() {
        let dir = tempfile::tempdir().unwrap();
        let file = csv_file(&dir, CONTROLS_CSV);
        let mut c = ChatClient::with_token(&ChatConfig::default(), "k", AccessToken::new("t")).unwrap();

        let columns = vec!["Owner".to_string(), "Control ID".to_string()];
        c.load_csv_context(&file, Some(&columns)).unwrap();
        assert!(c.context().starts_with("Owner: alice\nControl ID: AC-1\n"));
        assert!(c.context().contains("Owner: bob\nControl ID: AC-2"));
        assert!(!c.context().contains("Control Name"));

        let unknown = vec!["Nope".to_string()];
        let err = c.load_csv_context(&file, Some(&unknown)).unwrap_err();
        assert!(err.to_string().starts_with("Failed to load CSV file"));
    }

    #[test]
    fn csv_context_budget_uses_csv_reserve() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("Control ID,Control Name,Control Text\n");
        for i in 0..50 {
            csv.push_str(&format!("AC-{i},Control {i},Text for control number {i}.\n"));
        }
        let file = csv_file(&dir, &csv);

        // The flat-file reserve would leave 140 tokens; the CSV reserve leaves 50.
        let config = ChatConfig {
            token_ceiling: 150,
            reserve_tokens: 10,
            csv_reserve_tokens: 100,
            ..ChatConfig::default()
        };
        let mut c = ChatClient::with_token(&config, "k", AccessToken::new("t")).unwrap();
        let count = c.load_csv_context(&file, None).unwrap();
        assert!(count <= 50, "kept {} tokens", count);
        assert!(count > 0);
        assert!(tokens::count_tokens(c.context()).unwrap() <= 50);
    }
}
