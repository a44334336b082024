use domain::models::{Chunk, EmbeddingVector};
use domain::ports::EmbeddingService;
use domain::{RagError, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

const BATCH_SIZE: usize = 32;

/// Wraps an embedding service and pins the vector dimension for the
/// lifetime of the process: the first vector (or an explicit pin) decides.
pub struct Embedder {
    service: Arc<dyn EmbeddingService>,
    dimension: OnceLock<usize>,
    concurrency: usize,
    timeout: Option<Duration>,
}

impl Embedder {
    pub fn new(service: Arc<dyn EmbeddingService>) -> Self {
        Self {
            service,
            dimension: OnceLock::new(),
            concurrency: 8,
            timeout: None,
        }
    }

    pub fn with_dimension(self, dimension: usize) -> Self {
        let _ = self.dimension.set(dimension);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Bound every single embedding call, whatever the service does itself.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn check(&self, vector: EmbeddingVector) -> Result<EmbeddingVector> {
        if vector.is_empty() {
            return Err(RagError::EmbeddingUnavailable(
                "service returned an empty embedding".into(),
            ));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RagError::EmbeddingUnavailable(
                "service returned non-finite values".into(),
            ));
        }
        let expected = *self.dimension.get_or_init(|| vector.len());
        if vector.len() != expected {
            return Err(RagError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    pub async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        let vector = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.service.embed(text))
                .await
                .map_err(|_| {
                    RagError::EmbeddingUnavailable(format!(
                        "request timed out after {}s",
                        limit.as_secs_f32()
                    ))
                })??,
            None => self.service.embed(text).await?,
        };
        self.check(vector)
    }

    /// Embed every chunk, returning vectors in chunk order.
    pub async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(BATCH_SIZE).enumerate() {
            debug!(batch = batch_no, size = batch.len(), "embedding batch");
            let requests: Vec<_> = batch
                .iter()
                .map(|chunk| self.embed_text(&chunk.text))
                .collect();
            let batch_vectors: Vec<EmbeddingVector> = stream::iter(requests)
                .buffered(self.concurrency)
                .try_collect()
                .await?;
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}
