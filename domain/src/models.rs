use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

pub type EmbeddingVector = Vec<f32>;

/// The single source document, normalized and immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source: String,
    pub text: String,
    pub checksum: String,
}

impl Document {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A contiguous slice of the document. `start_offset` counts characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_offset: usize,
    pub index: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Offset one past the last character of this chunk.
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.char_len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: EmbeddingVector,
}

/// User question, guaranteed non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query(String);

impl Query {
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Hits in descending score order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.chunk.text.as_str())
    }
}

/// A fully assembled generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub text: String,
    pub context_chunks: usize,
    pub has_context: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
}

/// Body accepted by the `answer_query` boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Why a reply carries an error instead of an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyStatus {
    ClientError,
    NotReady,
    #[default]
    Internal,
}

/// `{ "answer": ... }` or `{ "error": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatReply {
    Answer {
        answer: String,
    },
    Error {
        error: String,
        #[serde(skip)]
        status: ReplyStatus,
    },
}

impl ChatReply {
    pub const NO_MESSAGE: &'static str = "No message provided";
    pub const NOT_READY: &'static str = "Service is not ready";
    pub const INTERNAL: &'static str = "Internal server error";

    pub fn answer(text: impl Into<String>) -> Self {
        Self::Answer {
            answer: text.into(),
        }
    }

    pub fn no_message() -> Self {
        Self::Error {
            error: Self::NO_MESSAGE.to_string(),
            status: ReplyStatus::ClientError,
        }
    }

    pub fn not_ready() -> Self {
        Self::Error {
            error: Self::NOT_READY.to_string(),
            status: ReplyStatus::NotReady,
        }
    }

    pub fn internal() -> Self {
        Self::Error {
            error: Self::INTERNAL.to_string(),
            status: ReplyStatus::Internal,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer { .. })
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Error {
                status: ReplyStatus::ClientError,
                ..
            }
        )
    }

    pub fn status(&self) -> Option<ReplyStatus> {
        match self {
            Self::Answer { .. } => None,
            Self::Error { status, .. } => Some(*status),
        }
    }
}
