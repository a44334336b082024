use domain::models::{Chunk, EmbeddingVector, IndexEntry, RetrievalResult, ScoredChunk};
use domain::{RagError, Result};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Below this many entries scoring stays on the calling thread.
const PARALLEL_THRESHOLD: usize = 4096;

/// Unit length; scaling by the largest component first keeps the squared
/// norm from overflowing.
fn normalized(mut v: EmbeddingVector) -> EmbeddingVector {
    let max = v.iter().fold(0.0f32, |m, x| m.max(x.abs()));
    if max == 0.0 {
        return v;
    }
    v.iter_mut().for_each(|x| *x /= max);
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter_mut().for_each(|x| *x /= norm);
    v
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Higher score first; equal scores fall back to ascending chunk index.
fn rank(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

fn check_finite(vector: &[f32]) -> Result<()> {
    if vector.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(RagError::EmbeddingUnavailable(
            "embedding contains non-finite values".into(),
        ))
    }
}

/// Immutable exact-search index over unit-normalized vectors.
#[derive(Debug, Default)]
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<EmbeddingVector>,
    dimension: Option<usize>,
}

impl VectorIndex {
    pub fn build(entries: Vec<IndexEntry>) -> Result<Self> {
        let mut chunks = Vec::with_capacity(entries.len());
        let mut vectors = Vec::with_capacity(entries.len());
        let mut dimension = None;
        for entry in entries {
            let expected = *dimension.get_or_insert(entry.vector.len());
            if entry.vector.len() != expected {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: entry.vector.len(),
                });
            }
            check_finite(&entry.vector)?;
            chunks.push(entry.chunk);
            vectors.push(normalized(entry.vector));
        }
        Ok(Self {
            chunks,
            vectors,
            dimension,
        })
    }

    /// Pair chunks with their vectors, in order, and build.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<EmbeddingVector>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RagError::EmbeddingUnavailable(format!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        Self::build(entries)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Exact top-`k` by cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        self.search_with_min_score(query, k, None)
    }

    pub fn search_with_min_score(
        &self,
        query: &[f32],
        k: usize,
        min_score: Option<f32>,
    ) -> Result<RetrievalResult> {
        let Some(dimension) = self.dimension else {
            return Ok(RetrievalResult::default());
        };
        if query.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }
        check_finite(query)?;
        if k == 0 {
            return Ok(RetrievalResult::default());
        }

        let query = normalized(query.to_vec());
        let score = |(i, v): (usize, &EmbeddingVector)| (dot(&query, v), i);
        let mut similarities: Vec<(f32, usize)> = if self.vectors.len() >= PARALLEL_THRESHOLD {
            self.vectors.par_iter().enumerate().map(score).collect()
        } else {
            self.vectors.iter().enumerate().map(score).collect()
        };
        if let Some(min) = min_score {
            similarities.retain(|(s, _)| *s >= min);
        }

        let k = k.min(similarities.len());
        if k < similarities.len() {
            similarities.select_nth_unstable_by(k, rank);
            similarities.truncate(k);
        }
        similarities.sort_by(rank);

        Ok(RetrievalResult {
            hits: similarities
                .into_iter()
                .map(|(score, i)| ScoredChunk {
                    chunk: self.chunks[i].clone(),
                    score,
                })
                .collect(),
        })
    }
}
