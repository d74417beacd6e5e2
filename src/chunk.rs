//! Recursive character text splitter.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters
//! with `chunk_overlap` characters carried between neighbours. The splitter
//! tries the coarsest separator first (`"\n\n"`), and only falls back to
//! finer ones (`"\n"`, `" "`, then individual characters) for pieces that
//! are still too large.
//!
//! Each chunk receives a random UUID plus a SHA-256 hash of its text.

use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::models::Chunk;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        // Pick the first separator that occurs; "" always matches.
        let mut separator = separators.last().cloned().unwrap_or_default();
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = String::new();
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep.clone();
                finer = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut out = Vec::new();
        let mut small = Vec::new();
        for split in splits {
            if char_len(&split) < self.chunk_size {
                small.push(split);
                continue;
            }
            if !small.is_empty() {
                out.extend(self.merge(&small, &separator));
                small.clear();
            }
            if finer.is_empty() {
                out.push(split);
            } else {
                out.extend(self.split_with(&split, finer));
            }
        }
        if !small.is_empty() {
            out.extend(self.merge(&small, &separator));
        }
        out
    }

    /// Greedily packs `splits` into windows of at most `chunk_size`, dropping
    /// from the front until no more than `chunk_overlap` characters remain
    /// before starting the next window.
    fn merge(&self, splits: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joiner = if window.is_empty() { 0 } else { sep_len };
            if total + len + joiner > self.chunk_size && !window.is_empty() {
                push_joined(&mut docs, &window, separator);
                while total > self.chunk_overlap
                    || (total > 0
                        && total + len + if window.is_empty() { 0 } else { sep_len }
                            > self.chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total -= char_len(front) + if window.is_empty() { 0 } else { sep_len };
                }
            }
            let joiner = if window.is_empty() { 0 } else { sep_len };
            window.push_back(split);
            total += len + joiner;
        }
        push_joined(&mut docs, &window, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, window: &VecDeque<&str>, separator: &str) {
    let joined = window.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Splits `text` and wraps every piece as a [`Chunk`] of `source`, with
/// contiguous indices starting at 0. Blank text yields no chunks.
pub fn chunk_text(source: &str, text: &str, splitter: &TextSplitter) -> Vec<Chunk> {
    splitter
        .split_text(text)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| make_chunk(source, i as i64, &piece))
        .collect()
}

fn make_chunk(source: &str, index: i64, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: source.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}
