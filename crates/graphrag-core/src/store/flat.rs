//! Exact inner-product vector index.
//!
//! [`FlatIndex`] keeps L2-normalized vectors in dense positions together
//! with an id↔position mapping and per-id metadata. Search is a brute-force
//! scan of an [`InnerProductMatrix`] (a contiguous row-major copy of the
//! vectors) that is rebuilt after every mutation.
//!
//! # Deletion
//!
//! Deleted positions are tombstoned, the survivors are compacted to dense
//! positions `0..n` (keeping their relative order), and the matrix is
//! rebuilt.
//!
//! # Persistence
//!
//! [`FlatIndex::encode`] produces two files:
//!
//! | File | Content |
//! |------|---------|
//! | `index.flat` | magic `GRFLAT01`, `u32` dimension, `u64` rows, row-major LE `f32` |
//! | `meta.json`  | `{dimension, id_to_position, position_to_id, metadata, vectors, next_position}` |
//!
//! `meta.json` is authoritative; a matrix file that disagrees with its
//! vectors is discarded and rebuilt.
//!
//! This type is synchronous and unsynchronised; the async stores wrap it in
//! a lock.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::{matches_filters, Filters, VectorHit, VectorRecord};
use crate::embedding::{dot, l2_normalize};
use crate::error::{Error, Result};
use crate::models::Metadata;

pub const MATRIX_FILE: &str = "index.flat";
pub const META_FILE: &str = "meta.json";

/// Default search over-fetch factor: the similarity scan asks for
/// `top_k × overfetch` candidates before metadata filtering.
pub const DEFAULT_OVERFETCH: usize = 10;

const MATRIX_MAGIC: &[u8; 8] = b"GRFLAT01";
const MATRIX_HEADER_LEN: usize = 8 + 4 + 8;

/// Row-major matrix of normalized vectors, scanned by inner product.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InnerProductMatrix {
    dimension: usize,
    rows: usize,
    data: Vec<f32>,
}

impl InnerProductMatrix {
    pub fn build(dimension: usize, vectors: &[Vec<f32>]) -> Self {
        let mut data = Vec::with_capacity(dimension * vectors.len());
        for v in vectors {
            data.extend_from_slice(v);
        }
        Self {
            dimension,
            rows: vectors.len(),
            data,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn row(&self, position: usize) -> &[f32] {
        let start = position * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// The `k` best positions by inner product with `query`, highest first;
    /// equal scores keep position order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.rows == 0 || query.len() != self.dimension {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..self.rows)
            .map(|pos| (pos, dot(query, self.row(pos))))
            .collect();

        let by_score = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
        };
        if k < scored.len() {
            scored.select_nth_unstable_by(k, by_score);
            scored.truncate(k);
        }
        scored.sort_by(by_score);
        scored
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MATRIX_HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(MATRIX_MAGIC);
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.rows as u64).to_le_bytes());
        bytes.extend_from_slice(&crate::embedding::vec_to_blob(&self.data));
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MATRIX_HEADER_LEN || &bytes[..8] != MATRIX_MAGIC {
            return Err(Error::Format("not a flat similarity file".to_string()));
        }
        let mut dim = [0u8; 4];
        dim.copy_from_slice(&bytes[8..12]);
        let mut rows = [0u8; 8];
        rows.copy_from_slice(&bytes[12..20]);
        let dimension = u32::from_le_bytes(dim) as usize;
        let rows = u64::from_le_bytes(rows) as usize;

        let body = &bytes[MATRIX_HEADER_LEN..];
        let expected = dimension
            .checked_mul(rows)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| Error::Format("similarity file header overflows".to_string()))?;
        if body.len() != expected {
            return Err(Error::Format(format!(
                "similarity file holds {} bytes, header implies {}",
                body.len(),
                expected
            )));
        }
        Ok(Self {
            dimension,
            rows,
            data: crate::embedding::blob_to_vec(body),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FlatIndexMeta {
    dimension: Option<usize>,
    id_to_position: BTreeMap<String, usize>,
    /// Keys are decimal positions.
    position_to_id: BTreeMap<String, String>,
    #[serde(default)]
    metadata: BTreeMap<String, Metadata>,
    vectors: Vec<Vec<f32>>,
    next_position: usize,
}

/// Encoded form of a [`FlatIndex`]; see the module docs for the layout.
#[derive(Debug, Clone)]
pub struct FlatIndexFiles {
    pub matrix: Vec<u8>,
    pub meta: Vec<u8>,
}

/// In-memory exact inner-product index.
#[derive(Debug, Clone, Default)]
pub struct FlatIndex {
    dimension: Option<usize>,
    ids: Vec<String>,
    positions: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
    metadata: HashMap<String, Metadata>,
    matrix: InnerProductMatrix,
}

impl FlatIndex {
    /// An empty index that adopts the width of the first vectors it receives.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty index with a fixed width.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            matrix: InnerProductMatrix::build(dimension, &[]),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Stored (normalized) vector for `id`.
    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.positions.get(id).map(|&p| self.vectors[p].as_slice())
    }

    pub fn metadata(&self, id: &str) -> Option<&Metadata> {
        self.metadata.get(id)
    }

    /// Ids in position order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Insert or overwrite records. All widths are checked before anything
    /// is modified.
    pub fn add(&mut self, records: Vec<VectorRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let expected = self.dimension.unwrap_or(first.vector.len());
        if expected == 0 {
            return Err(Error::Format(format!(
                "empty vector for chunk {}",
                first.chunk_id
            )));
        }
        if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
            return Err(Error::DimensionMismatch {
                expected,
                actual: bad.vector.len(),
            });
        }
        self.dimension = Some(expected);

        for record in records {
            let VectorRecord {
                chunk_id,
                mut vector,
                metadata,
            } = record;
            l2_normalize(&mut vector);
            match self.positions.get(&chunk_id) {
                Some(&pos) => self.vectors[pos] = vector,
                None => {
                    self.positions.insert(chunk_id.clone(), self.ids.len());
                    self.ids.push(chunk_id.clone());
                    self.vectors.push(vector);
                }
            }
            self.metadata.insert(chunk_id, metadata);
        }

        self.rebuild();
        Ok(())
    }

    /// Remove ids, compacting the survivors. Returns how many existed.
    pub fn delete(&mut self, ids: &[String]) -> usize {
        let mut tombstones = vec![false; self.ids.len()];
        let mut removed = 0;
        for id in ids {
            if let Some(pos) = self.positions.remove(id) {
                tombstones[pos] = true;
                self.metadata.remove(id);
                removed += 1;
            }
        }
        if removed == 0 {
            return 0;
        }

        let ids = std::mem::take(&mut self.ids);
        let vectors = std::mem::take(&mut self.vectors);
        for (pos, (id, vector)) in ids.into_iter().zip(vectors).enumerate() {
            if tombstones[pos] {
                continue;
            }
            self.positions.insert(id.clone(), self.ids.len());
            self.ids.push(id);
            self.vectors.push(vector);
        }

        self.rebuild();
        removed
    }

    /// Top `top_k` hits for `query`, filtered by metadata after scanning
    /// `top_k × overfetch` candidates.
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&Filters>,
        overfetch: usize,
    ) -> Result<Vec<VectorHit>> {
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(Error::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let search_k = top_k.saturating_mul(overfetch.max(1)).min(self.len());
        let mut hits = Vec::with_capacity(top_k);
        for (pos, score) in self.matrix.search(&q, search_k) {
            let id = &self.ids[pos];
            let metadata = self.metadata.get(id).cloned().unwrap_or_default();
            if let Some(filters) = filters {
                if !matches_filters(&metadata, filters) {
                    continue;
                }
            }
            hits.push(VectorHit {
                chunk_id: id.clone(),
                score,
                metadata,
            });
            if hits.len() >= top_k {
                break;
            }
        }
        Ok(hits)
    }

    fn rebuild(&mut self) {
        self.matrix = InnerProductMatrix::build(self.dimension.unwrap_or(0), &self.vectors);
    }

    /// Serialize into the similarity file and the metadata file.
    pub fn encode(&self) -> Result<FlatIndexFiles> {
        let meta = FlatIndexMeta {
            dimension: self.dimension,
            id_to_position: self
                .ids
                .iter()
                .enumerate()
                .map(|(pos, id)| (id.clone(), pos))
                .collect(),
            position_to_id: self
                .ids
                .iter()
                .enumerate()
                .map(|(pos, id)| (pos.to_string(), id.clone()))
                .collect(),
            metadata: self
                .metadata
                .iter()
                .map(|(id, m)| (id.clone(), m.clone()))
                .collect(),
            vectors: self.vectors.clone(),
            next_position: self.ids.len(),
        };
        Ok(FlatIndexFiles {
            matrix: self.matrix.to_bytes(),
            meta: serde_json::to_vec(&meta)?,
        })
    }

    /// Rebuild an index from its metadata file and, when present, its
    /// similarity file.
    pub fn decode(meta: &[u8], matrix: Option<&[u8]>) -> Result<Self> {
        let meta: FlatIndexMeta = serde_json::from_slice(meta)?;
        let n = meta.vectors.len();

        if meta.next_position != n
            || meta.id_to_position.len() != n
            || meta.position_to_id.len() != n
        {
            return Err(Error::Format(format!(
                "vector metadata is inconsistent: {} vectors, {} ids, {} positions, next {}",
                n,
                meta.id_to_position.len(),
                meta.position_to_id.len(),
                meta.next_position
            )));
        }
        if n > 0 && meta.dimension.is_none() {
            return Err(Error::Format("vector metadata has vectors but no dimension".into()));
        }

        let mut ids = Vec::with_capacity(n);
        for pos in 0..n {
            let id = meta
                .position_to_id
                .get(&pos.to_string())
                .ok_or_else(|| Error::Format(format!("no id stored for position {}", pos)))?;
            if meta.id_to_position.get(id) != Some(&pos) {
                return Err(Error::Format(format!(
                    "id {} does not map back to position {}",
                    id, pos
                )));
            }
            ids.push(id.clone());
        }

        let dimension = meta.dimension;
        if let Some(d) = dimension {
            if let Some(bad) = meta.vectors.iter().find(|v| v.len() != d) {
                return Err(Error::DimensionMismatch {
                    expected: d,
                    actual: bad.len(),
                });
            }
        }

        let positions = ids
            .iter()
            .enumerate()
            .map(|(pos, id)| (id.clone(), pos))
            .collect();
        let mut metadata: HashMap<String, Metadata> = meta.metadata.into_iter().collect();
        metadata.retain(|id, _| meta.id_to_position.contains_key(id));

        let mut index = Self {
            dimension,
            ids,
            positions,
            vectors: meta.vectors,
            metadata,
            matrix: InnerProductMatrix::default(),
        };
        index.rebuild();

        if let Some(bytes) = matrix {
            match InnerProductMatrix::from_bytes(bytes) {
                Ok(stored) if stored == index.matrix => {}
                Ok(_) => tracing::warn!("similarity file disagrees with stored vectors; rebuilt"),
                Err(e) => tracing::warn!(error = %e, "unreadable similarity file; rebuilt"),
            }
        }

        Ok(index)
    }
}
