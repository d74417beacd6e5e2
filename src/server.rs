//! HTTP front end.
//!
//! Manages the document folder the RAG pipeline trains on, answers
//! questions through either backend, and can start the Confluence poll
//! loop in the background.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload-data` | Multipart `file` saved into the data folder |
//! | `DELETE` | `/delete-file?filename=` | Remove an uploaded file |
//! | `GET` | `/files` | List uploaded files |
//! | `POST` | `/train` | Index the data folder and set up the QA chain |
//! | `GET` | `/ask?question=` | Answer through the RAG pipeline |
//! | `POST` | `/fedramp/ask?question=` | Answer through the hosted chat model |
//! | `POST` | `/run_ai_program?ai_model=` | Start the poll loop (`internal` = RAG) |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `chat_error` (500), `internal` (500). `GET /ask` is the exception: a
//! pipeline that is not ready answers 200 with `{"error": "<message>"}`.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::chat::ChatClient;
use crate::config::{Config, ConfluenceCredentials, Credentials};
use crate::confluence::ConfluenceClient;
use crate::loader::list_files;
use crate::orchestrator::PollLoop;
use crate::rag::{PromptTemplate, RagPipeline};
use crate::table::TableLayout;

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    rag: Arc<Mutex<RagPipeline>>,
    credentials: Option<Credentials>,
    confluence_credentials: Option<ConfluenceCredentials>,
    poll_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AppState {
    pub fn new(
        config: Config,
        rag: RagPipeline,
        credentials: Option<Credentials>,
        confluence_credentials: Option<ConfluenceCredentials>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rag: Arc::new(Mutex::new(rag)),
            credentials,
            confluence_credentials,
            poll_task: Arc::new(Mutex::new(None)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload-data", post(handle_upload))
        .route("/delete-file", delete(handle_delete))
        .route("/files", get(handle_list_files))
        .route("/train", post(handle_train))
        .route("/ask", get(handle_ask))
        .route("/fedramp/ask", post(handle_fedramp_ask))
        .route("/run_ai_program", post(handle_run_ai_program))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process ends.
///
/// A vector store left by an earlier `train` is loaded on startup so `/ask`
/// works without retraining. Missing credentials only disable the routes
/// that need them.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let mut rag = RagPipeline::new(config)?;
    match rag.load_vectorstore().await {
        Ok(()) => {
            rag.setup_qa_chain(None)?;
            tracing::info!("loaded existing vector store");
        }
        Err(e) => tracing::info!(reason = %e, "no vector store yet; POST /train to build one"),
    }

    let credentials = Credentials::from_env()
        .map_err(|e| tracing::warn!(error = %e, "chat routes disabled"))
        .ok();
    let confluence_credentials = ConfluenceCredentials::from_env().ok();

    let state = AppState::new(config.clone(), rag, credentials, confluence_credentials);
    let app = router(state);

    println!("Server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        code: "conflict".to_string(),
        message: message.into(),
    }
}

fn chat_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "chat_error".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// A bare file name: no separators, no parent references.
fn safe_filename(name: &str) -> Result<&str, AppError> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
    {
        return Err(bad_request(format!("invalid filename: {:?}", name)));
    }
    Ok(trimmed)
}

fn required_question(question: Option<String>) -> Result<String, AppError> {
    match question {
        Some(q) if !q.trim().is_empty() => Ok(q),
        _ => Err(bad_request("question must not be empty")),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ File management ============

#[derive(Serialize)]
struct FileStatus {
    status: String,
    filename: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileStatus>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("failed to read field: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| bad_request("file field has no filename"))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("failed to read file: {}", e)))?;
        upload = Some((filename, bytes.to_vec()));
    }

    let (filename, bytes) = upload.ok_or_else(|| bad_request("file required"))?;
    let filename = safe_filename(&filename)?.to_string();

    let data_dir = state.config.rag.data_dir.clone();
    tokio::fs::create_dir_all(&data_dir)
        .await
        .map_err(|e| internal(e.to_string()))?;
    tokio::fs::write(data_dir.join(&filename), &bytes)
        .await
        .map_err(|e| internal(e.to_string()))?;

    tracing::info!(%filename, bytes = bytes.len(), "file uploaded");
    Ok(Json(FileStatus {
        status: "uploaded".to_string(),
        filename,
    }))
}

#[derive(Deserialize)]
struct FilenameParams {
    filename: Option<String>,
}

async fn handle_delete(
    State(state): State<AppState>,
    Query(params): Query<FilenameParams>,
) -> Result<Json<FileStatus>, AppError> {
    let requested = params
        .filename
        .ok_or_else(|| bad_request("filename required"))?;
    let filename = safe_filename(&requested)?.to_string();

    let path = state.config.rag.data_dir.join(&filename);
    if !path.is_file() {
        return Err(not_found("File not found"));
    }
    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(FileStatus {
        status: "deleted".to_string(),
        filename,
    }))
}

#[derive(Serialize)]
struct FileList {
    files: Vec<String>,
}

async fn handle_list_files(State(state): State<AppState>) -> Result<Json<FileList>, AppError> {
    let files = list_files(&state.config.rag.data_dir).map_err(|e| internal(e.to_string()))?;
    Ok(Json(FileList { files }))
}

// ============ RAG ============

async fn handle_train(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let mut rag = state.rag.lock().await;
    let data_dir = rag.data_dir().to_path_buf();
    let chunks = rag
        .load_and_index_documents(&data_dir)
        .await
        .map_err(|e| internal(e.to_string()))?;
    rag.setup_qa_chain(Some(PromptTemplate::default()))
        .map_err(|e| internal(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "status": "training complete",
        "chunks": chunks,
    })))
}

#[derive(Deserialize)]
struct QuestionParams {
    question: Option<String>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Query(params): Query<QuestionParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let question = required_question(params.question)?;
    let rag = state.rag.lock().await;
    match rag.ask(&question).await {
        Ok(answer) => Ok(Json(serde_json::json!({
            "question": question,
            "answer": answer,
        }))),
        Err(e) => Ok(Json(serde_json::json!({ "error": e.to_string() }))),
    }
}

// ============ Chat ============

async fn connect_chat(state: &AppState) -> Result<ChatClient, AppError> {
    let credentials = state.credentials.clone().ok_or_else(|| {
        chat_error("Missing credentials. Set CISCO_CLIENT_ID, CISCO_CLIENT_SECRET and CISCO_APP_KEY.")
    })?;
    ChatClient::connect(&state.config, credentials)
        .await
        .map_err(|e| chat_error(format!("{:#}", e)))
}

async fn handle_fedramp_ask(
    State(state): State<AppState>,
    Query(params): Query<QuestionParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let question = required_question(params.question)?;
    let mut client = connect_chat(&state).await?;
    let answer = client
        .process_query(&question)
        .await
        .map_err(|e| chat_error(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "question": question,
        "answer": answer,
    })))
}

// ============ Poll loop ============

#[derive(Deserialize)]
struct RunParams {
    ai_model: Option<String>,
}

async fn handle_run_ai_program(
    State(state): State<AppState>,
    Query(params): Query<RunParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let ai_model = params
        .ai_model
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| bad_request("ai_model must not be empty"))?;

    let mut task = state.poll_task.lock().await;
    if task.as_ref().map(|t| !t.is_finished()).unwrap_or(false) {
        return Err(conflict("poll loop already running"));
    }

    let confluence = state
        .config
        .confluence()
        .map_err(|e| bad_request(e.to_string()))?;
    let credentials = state
        .confluence_credentials
        .clone()
        .ok_or_else(|| bad_request("CONFLUENCE_USERNAME and CONFLUENCE_API_TOKEN must be set"))?;
    let page = ConfluenceClient::new(confluence, credentials).map_err(|e| internal(e.to_string()))?;
    let layout = TableLayout::from(&confluence.layout);
    let poll_config = state.config.poll.clone();

    let handle = if ai_model == "internal" {
        let mut poll = PollLoop::new(page, state.rag.clone(), layout, &poll_config);
        tokio::spawn(async move { poll.run().await })
    } else {
        let client = connect_chat(&state).await?;
        let mut poll = PollLoop::new(page, client, layout, &poll_config);
        tokio::spawn(async move { poll.run().await })
    };
    *task = Some(handle);

    tracing::info!(%ai_model, "poll loop started from HTTP");
    Ok(Json(serde_json::json!({
        "status": "started",
        "ai_model": ai_model,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_and_separators() {
        assert_eq!(safe_filename(" controls.csv ").ok(), Some("controls.csv"));
        assert!(safe_filename("../etc/passwd").is_err());
        assert!(safe_filename("nested/file.txt").is_err());
        assert!(safe_filename("..\\win.ini").is_err());
        assert!(safe_filename("  ").is_err());
    }

    #[test]
    fn empty_question_is_bad_request() {
        assert!(required_question(None).is_err());
        assert!(required_question(Some("   ".into())).is_err());
        assert_eq!(required_question(Some("why".into())).ok().as_deref(), Some("why"));
    }
}
