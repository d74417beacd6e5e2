//! Flat (exhaustive) L2 vector index.
//!
//! Every query is compared against every stored vector; there is no
//! clustering or quantization. That is the right trade-off for a control
//! catalog of a few thousand rows.
//!
//! # On-disk format
//!
//! ```text
//! magic   8 bytes   "CBFLAT01"
//! dims    u32 LE
//! count   u64 LE
//! data    count * dims * f32 LE, row-major
//! ```

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::embedding::{blob_to_vec, l2_distance, vec_to_blob};

const MAGIC: &[u8; 8] = b"CBFLAT01";
const HEADER_LEN: usize = 8 + 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

/// One search hit: position of the stored vector and its squared distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != self.dims {
                bail!(
                    "vector {} has {} dimensions, index expects {}",
                    i,
                    v.len(),
                    self.dims
                );
            }
        }
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    fn row(&self, position: usize) -> &[f32] {
        &self.data[position * self.dims..(position + 1) * self.dims]
    }

    /// The `k` nearest stored vectors, closest first. `k` is clamped to the
    /// index size; ties keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dims {
            bail!(
                "query has {} dimensions, index expects {}",
                query.len(),
                self.dims
            );
        }

        let mut scored: Vec<Neighbor> = (0..self.len())
            .map(|position| Neighbor {
                position,
                distance: l2_distance(query, self.row(position)),
            })
            .collect();
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(k.min(self.len()));
        Ok(scored)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.dims as u32).to_le_bytes());
        out.extend_from_slice(&(self.len() as u64).to_le_bytes());
        out.extend_from_slice(&vec_to_blob(&self.data));
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
            bail!("not a flat index file");
        }
        let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&bytes[12..20]);
        let count = u64::from_le_bytes(count_bytes) as usize;

        let body = &bytes[HEADER_LEN..];
        let expected = count
            .checked_mul(dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| anyhow::anyhow!("index header is corrupt"))?;
        if body.len() != expected {
            bail!(
                "index body is {} bytes, header promises {} ({} x {})",
                body.len(),
                expected,
                count,
                dims
            );
        }

        Ok(Self {
            dims,
            data: blob_to_vec(body),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_bytes())
            .with_context(|| format!("Failed to write index: {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read index: {}", path.display()))?;
        Self::from_bytes(&bytes).with_context(|| format!("Invalid index: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FlatIndex {
        let mut index = FlatIndex::new(2);
        index
            .add(&[vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0]])
            .unwrap();
        index
    }

    #[test]
    fn nearest_first() {
        let hits = sample().search(&[0.9, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 1);
        assert_eq!(hits[1].position, 0);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn k_is_clamped_to_size() {
        assert_eq!(sample().search(&[0.0, 0.0], 10).unwrap().len(), 3);
        assert!(FlatIndex::new(2).search(&[0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn rejects_wrong_dimensions() {
        let mut index = sample();
        assert!(index.add(&[vec![1.0]]).is_err());
        assert!(index.search(&[1.0, 2.0, 3.0], 1).is_err());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn file_survives_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/controls.index");
        let index = sample();
        index.save(&path).unwrap();
        assert_eq!(FlatIndex::load(&path).unwrap(), index);
    }

    #[test]
    fn truncated_file_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes.truncate(bytes.len() - 3);
        assert!(FlatIndex::from_bytes(&bytes).is_err());
        assert!(FlatIndex::from_bytes(b"garbage").is_err());
    }
}
