use crate::prompt::PromptAssembler;
use domain::models::{Answer, ChatReply, ChatRequest, Document, Query, RetrievalResult};
use domain::ports::{EmbeddingService, GenerationService};
use domain::{RagError, Result};
use infrastructure::chunker::Chunker;
use infrastructure::config::{Config, EmptyContextPolicy, RetrievalConfig};
use infrastructure::document_loader::DocumentLoader;
use infrastructure::embedder::Embedder;
use infrastructure::search::VectorIndex;
use shared::telemetry::Telemetry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Building,
    Ready,
    Failed,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Building,
            2 => Self::Ready,
            _ => Self::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Building => 1,
            Self::Ready => 2,
            Self::Failed => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexStats {
    pub chunks: usize,
    pub dimension: Option<usize>,
    pub elapsed: Duration,
}

struct ReadyIndex {
    document: Document,
    index: VectorIndex,
}

/// Marks the engine failed if a build future is dropped before it finishes,
/// so a half-built index is never served.
struct BuildGuard<'a> {
    state: &'a AtomicU8,
    armed: bool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .store(EngineState::Failed.as_u8(), Ordering::SeqCst);
        }
    }
}

/// Owns the whole pipeline for one document: a single build at startup,
/// then any number of concurrent read-only queries.
pub struct QueryEngine {
    loader: DocumentLoader,
    chunker: Chunker,
    embedder: Embedder,
    generator: Arc<dyn GenerationService>,
    assembler: PromptAssembler,
    retrieval: RetrievalConfig,
    call_timeout: Duration,
    state: AtomicU8,
    ready: OnceLock<ReadyIndex>,
    next_request: AtomicU64,
}

impl QueryEngine {
    pub fn new(
        config: &Config,
        embeddings: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
    ) -> Result<Self> {
        config.validate()?;
        let mut embedder = Embedder::new(embeddings)
            .with_concurrency(config.embed_concurrency)
            .with_timeout(config.model.timeout);
        if let Some(dimension) = config.embed_dimension {
            embedder = embedder.with_dimension(dimension);
        }
        Ok(Self {
            loader: DocumentLoader::new(),
            chunker: Chunker::new(config.chunking)?,
            embedder,
            generator,
            assembler: PromptAssembler::new(config.retrieval.max_context_chars),
            retrieval: config.retrieval.clone(),
            call_timeout: config.model.timeout,
            state: AtomicU8::new(EngineState::Uninitialized.as_u8()),
            ready: OnceLock::new(),
            next_request: AtomicU64::new(1),
        })
    }

    pub fn with_loader(mut self, loader: DocumentLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// Load, chunk, embed and index the document at `path`.
    pub async fn build(&self, path: &Path) -> Result<IndexStats> {
        let mut guard = self.begin_build()?;
        let telemetry = Telemetry::new();
        let result = async {
            let document = self.load(path.to_path_buf()).await?;
            self.index_document(document).await
        }
        .await;
        self.finish_build(&mut guard, result, telemetry)
    }

    /// Same as [`QueryEngine::build`] for text that is already in memory.
    pub async fn build_from_document(&self, document: Document) -> Result<IndexStats> {
        let mut guard = self.begin_build()?;
        let telemetry = Telemetry::new();
        let result = self.index_document(document).await;
        self.finish_build(&mut guard, result, telemetry)
    }

    fn begin_build(&self) -> Result<BuildGuard<'_>> {
        self.state
            .compare_exchange(
                EngineState::Uninitialized.as_u8(),
                EngineState::Building.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| RagError::InvalidConfig("index already built".into()))?;
        Ok(BuildGuard {
            state: &self.state,
            armed: true,
        })
    }

    fn finish_build(
        &self,
        guard: &mut BuildGuard<'_>,
        result: Result<ReadyIndex>,
        telemetry: Telemetry,
    ) -> Result<IndexStats> {
        guard.armed = false;
        match result {
            Ok(ready) => {
                let stats = IndexStats {
                    chunks: ready.index.len(),
                    dimension: ready.index.dimension().or(self.embedder.dimension()),
                    elapsed: telemetry.elapsed(),
                };
                if self.ready.set(ready).is_err() {
                    self.set_state(EngineState::Failed);
                    return Err(RagError::InvalidConfig("index already built".into()));
                }
                self.set_state(EngineState::Ready);
                info!(
                    chunks = stats.chunks,
                    dimension = ?stats.dimension,
                    elapsed_ms = telemetry.elapsed_ms(),
                    "index ready"
                );
                Ok(stats)
            }
            Err(e) => {
                self.set_state(EngineState::Failed);
                error!(kind = e.kind(), error = %e, "index build failed");
                Err(e)
            }
        }
    }

    fn set_state(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    async fn load(&self, path: PathBuf) -> Result<Document> {
        let loader = self.loader;
        tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .map_err(|e| RagError::LoadFailure(format!("loader task failed: {e}")))?
    }

    async fn index_document(&self, document: Document) -> Result<ReadyIndex> {
        let chunks = self.chunker.chunk_document(&document);
        debug!(chunks = chunks.len(), source = %document.source, "document chunked");
        if chunks.is_empty() {
            warn!(source = %document.source, "document has no text; every query will run without context");
        }
        let vectors = self.embedder.embed_chunks(&chunks).await?;
        let index = VectorIndex::from_parts(chunks, vectors)?;
        Ok(ReadyIndex { document, index })
    }

    fn ready_index(&self) -> Result<&ReadyIndex> {
        match self.ready.get() {
            Some(ready) if self.is_ready() => Ok(ready),
            _ => Err(RagError::NotReady),
        }
    }

    /// Nearest chunks for `text`, without generating an answer.
    pub async fn retrieve(&self, text: &str) -> Result<RetrievalResult> {
        let query = Query::parse(text)?;
        let ready = self.ready_index()?;
        self.search(ready, &query).await
    }

    async fn search(&self, ready: &ReadyIndex, query: &Query) -> Result<RetrievalResult> {
        let vector = self.embedder.embed_text(query.as_str()).await?;
        ready.index.search_with_min_score(
            &vector,
            self.retrieval.top_k,
            self.retrieval.min_score,
        )
    }

    pub async fn query(&self, text: &str) -> Result<Answer> {
        let query = Query::parse(text)?;
        let ready = self.ready_index()?;
        let result = self.search(ready, &query).await?;
        debug!(hits = result.len(), "retrieved context");

        let prompt = if result.is_empty()
            && self.retrieval.empty_context == EmptyContextPolicy::FullDocument
        {
            self.assembler
                .assemble_from_text(&ready.document.text, &query)
        } else {
            self.assembler.assemble(&result, &query)
        };

        let text = tokio::time::timeout(self.call_timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| {
                RagError::GenerationUnavailable(format!(
                    "request timed out after {}s",
                    self.call_timeout.as_secs_f32()
                ))
            })??;
        Ok(Answer { text })
    }

    /// Wire-level handler: every outcome becomes a reply, never an error.
    pub async fn answer_query(&self, request: ChatRequest) -> ChatReply {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let message = request.message.unwrap_or_default();
        let telemetry = Telemetry::new();
        let outcome = self
            .query(&message)
            .instrument(info_span!("query", id))
            .await;

        match outcome {
            Ok(answer) => {
                info!(id, elapsed_ms = telemetry.elapsed_ms(), "answered");
                ChatReply::answer(answer.text)
            }
            Err(e) if e.is_client_error() => {
                warn!(id, kind = e.kind(), "rejected request without a message");
                ChatReply::no_message()
            }
            Err(RagError::NotReady) => {
                warn!(id, "rejected request before the index was ready");
                ChatReply::not_ready()
            }
            Err(e) => {
                error!(id, kind = e.kind(), error = %e, "query failed");
                ChatReply::internal()
            }
        }
    }
}
