//! # Compliance Bridge
//!
//! A compliance assistant that answers FedRAMP questions with a hosted chat
//! model or a local retrieval-augmented pipeline, and relays the answers
//! into a Confluence page that doubles as a request queue.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Control   │──▶│ Flat L2     │──▶│ ChatClient   │◀── OAuth token
//! │  catalog   │   │ index       │   │ (Azure chat) │
//! └────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │ AnswerBackend
//! ┌────────────┐   ┌─────────────┐   ┌──────┴───────┐   ┌────────────┐
//! │ Uploaded   │──▶│ SQLite      │──▶│ RagPipeline  │   │ Confluence │
//! │ documents  │   │ vectors     │   │ (Ollama)     │   │ page table │
//! └────────────┘   └─────────────┘   └──────┬───────┘   └─────┬──────┘
//!                                           │                 │
//!                                      ┌────▼─────────────────▼──┐
//!                                      │ PollLoop (every 2 s)    │
//!                                      └─────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bridge init                                   # create the vector database
//! bridge index build --csv fedramp_controls.csv # build the control index
//! bridge chat "What does AC-2 require?" --retrieve-k 3
//! bridge train --folder ./data/uploads          # index uploaded documents
//! bridge poll --backend rag                     # answer the Confluence page
//! bridge serve                                  # HTTP front end
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment secrets |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`auth`] | OAuth client-credentials token exchange |
//! | [`tokens`] | Token counting and truncation |
//! | [`chat`] | Azure OpenAI chat client |
//! | [`catalog`] | FedRAMP control catalog (CSV) |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Flat L2 index with a binary file format |
//! | [`retrieval`] | Build and query the control index |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`loader`] | Folder walking for the document pipeline |
//! | [`chunk`] | Recursive character splitter |
//! | [`models`] | Shared data types |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | SQLite-backed vector store |
//! | [`llm`] | Local language model client |
//! | [`rag`] | Retrieval-augmented QA pipeline |
//! | [`confluence`] | Confluence REST client |
//! | [`table`] | Request/answer table inside a page body |
//! | [`orchestrator`] | Polling loop tying page and backend together |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP API |

pub mod auth;
pub mod catalog;
pub mod chat;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod confluence;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod rag;
pub mod retrieval;
pub mod server;
pub mod store;
pub mod table;
pub mod tokens;
pub mod vector_index;
