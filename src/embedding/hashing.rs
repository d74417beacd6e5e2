//! Feature-hashing embedder.
//!
//! Lowercased alphanumeric terms are hashed (FNV-1a) into a fixed number of
//! signed buckets and the result is L2-normalized. Lexical overlap only, but
//! deterministic and free of any model download, which makes it the offline
//! default for small control catalogs.

use anyhow::Result;
use async_trait::async_trait;

use super::EmbeddingProvider;

pub const DEFAULT_DIMS: usize = 384;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub struct HashingProvider {
    dims: usize,
}

impl HashingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for term in terms(text) {
            let hash = fnv1a(term.as_bytes());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn model_name(&self) -> &str {
        "hashing"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn same_text_same_vector() {
        let p = HashingProvider::new(64);
        assert_eq!(p.embed_one("Access Control"), p.embed_one("access  control!"));
    }

    #[test]
    fn vectors_are_unit_length() {
        let v = HashingProvider::new(64).embed_one("account management policy");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashingProvider::new(8).embed_one("  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn shared_terms_score_higher() {
        let p = HashingProvider::new(DEFAULT_DIMS);
        let q = p.embed_one("access control policy");
        let near = p.embed_one("AC-1 - Access Control Policy and Procedures");
        let far = p.embed_one("AC-2 - Account Management");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }
}
