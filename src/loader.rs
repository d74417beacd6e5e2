//! Document loader for the RAG pipeline.
//!
//! Walks a folder recursively and turns every supported file into a
//! [`LoadedDocument`]:
//!
//! | Extension | Handling |
//! |-----------|----------|
//! | `.txt` | read as UTF-8 (lossy) |
//! | `.pdf` | [`extract::extract_text`] |
//! | `.docx` | [`extract::extract_text`] |
//! | `.csv` | every row as one `", "`-joined line |
//!
//! A file that fails to load is reported with `tracing::warn!` and skipped;
//! the rest of the folder still loads.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::catalog::csv_to_text;
use crate::extract;
use crate::models::LoadedDocument;

pub const SUPPORTED_GLOBS: [&str; 4] = ["**/*.txt", "**/*.pdf", "**/*.docx", "**/*.csv"];

/// Loads every supported file under `root`, sorted by relative path.
pub fn load_documents(root: &Path) -> Result<Vec<LoadedDocument>> {
    if !root.exists() {
        bail!("Document folder does not exist: {}", root.display());
    }

    let include_set = build_globset(&SUPPORTED_GLOBS)?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if !include_set.is_match(&rel_str) {
            continue;
        }

        match load_file(path) {
            Ok(text) => documents.push(LoadedDocument {
                source: rel_str,
                text,
            }),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable document"),
        }
    }

    documents.sort_by(|a, b| a.source.cmp(&b.source));
    tracing::debug!(root = %root.display(), documents = documents.len(), "loaded documents");
    Ok(documents)
}

fn load_file(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let bytes = std::fs::read(path)?;

    let text = match ext.as_str() {
        "txt" => String::from_utf8_lossy(&bytes).into_owned(),
        "pdf" => extract::extract_text(&bytes, extract::MIME_PDF)?,
        "docx" => extract::extract_text(&bytes, extract::MIME_DOCX)?,
        "csv" => csv_to_text(bytes.as_slice())?,
        other => bail!("unsupported extension: {}", other),
    };
    Ok(text)
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Lists the plain file names directly inside `dir`, sorted. A missing
/// directory lists as empty.
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}
