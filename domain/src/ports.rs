//! Seams to the external model services.
//!
//! Both traits are object safe so the engine can hold `Arc<dyn ...>` handles
//! and tests can swap in stubs.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EmbeddingVector, Prompt};

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &Prompt) -> Result<String>;
}
