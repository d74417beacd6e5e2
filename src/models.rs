//! Core data models shared by the document pipeline.
//!
//! These types represent the documents, chunks, and retrieval hits that flow
//! from the loader through the splitter into the vector store and back.

/// Text of one loaded file, before splitting.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Path relative to the folder it was loaded from.
    pub source: String,
    pub text: String,
}

/// A chunk of a document's text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    /// Cosine similarity to the query in `[-1.0, 1.0]`.
    pub score: f32,
}
