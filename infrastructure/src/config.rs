use domain::{RagError, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Wire dialect spoken by the model server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
}

impl Provider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    fn default_embed_model(self) -> &'static str {
        match self {
            Self::Ollama => "nomic-embed-text",
            Self::OpenAi => "text-embedding-3-small",
        }
    }

    fn default_chat_model(self) -> &'static str {
        match self {
            Self::Ollama => "qwen2.5:1.5b-instruct",
            Self::OpenAi => "gpt-3.5-turbo",
        }
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "open-ai" | "openai-compatible" => Ok(Self::OpenAi),
            other => Err(RagError::InvalidConfig(format!("unknown provider '{other}'"))),
        }
    }
}

/// What to put in the prompt when retrieval comes back empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyContextPolicy {
    /// Tell the model that nothing relevant was found.
    #[default]
    NoContext,
    /// Fall back to the whole document text.
    FullDocument,
}

impl FromStr for EmptyContextPolicy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no-context" | "none" => Ok(Self::NoContext),
            "full-document" | "document" => Ok(Self::FullDocument),
            other => Err(RagError::InvalidConfig(format!(
                "unknown empty-context policy '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub word_boundaries: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            word_boundaries: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub embed_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl ModelConfig {
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            api_key: None,
            embed_model: provider.default_embed_model().to_string(),
            chat_model: provider.default_chat_model().to_string(),
            temperature: 0.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_provider(Provider::Ollama)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_score: Option<f32>,
    pub max_context_chars: usize,
    pub empty_context: EmptyContextPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            min_score: None,
            max_context_chars: 4000,
            empty_context: EmptyContextPolicy::NoContext,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub document_path: Option<PathBuf>,
    pub model: ModelConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embed_concurrency: usize,
    pub embed_dimension: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_path: None,
            model: ModelConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embed_concurrency: 8,
            embed_dimension: None,
        }
    }
}

impl Config {
    /// Read `.env` (if any) and then the process environment.
    pub fn load() -> Result<Self> {
        let config = Self::load_unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the environment without range checks, so callers can layer
    /// overrides on top and call [`Config::validate`] once at the end.
    pub fn load_unvalidated() -> Result<Self> {
        dotenv().ok();
        Self::parse_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::parse_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::from_lookup`] but only fails on unparseable values.
    pub fn parse_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("DOCQA_PROVIDER") {
            Some(raw) => raw.parse()?,
            None => Provider::Ollama,
        };
        let mut model = ModelConfig::for_provider(provider);
        if let Some(url) = get("DOCQA_BASE_URL") {
            model.base_url = url.trim_end_matches('/').to_string();
        }
        model.api_key = get("DOCQA_API_KEY").or_else(|| match provider {
            Provider::OpenAi => get("OPENAI_API_KEY"),
            Provider::Ollama => None,
        });
        if let Some(m) = get("DOCQA_EMBED_MODEL") {
            model.embed_model = m;
        }
        if let Some(m) = get("DOCQA_CHAT_MODEL") {
            model.chat_model = m;
        }
        if let Some(t) = parse_opt::<f32>(&get, "DOCQA_TEMPERATURE")? {
            model.temperature = t;
        }
        if let Some(secs) = parse_opt::<u64>(&get, "DOCQA_TIMEOUT_SECS")? {
            model.timeout = Duration::from_secs(secs);
        }

        let defaults = ChunkingConfig::default();
        let chunking = ChunkingConfig {
            chunk_size: parse_opt(&get, "DOCQA_CHUNK_SIZE")?.unwrap_or(defaults.chunk_size),
            overlap: parse_opt(&get, "DOCQA_CHUNK_OVERLAP")?.unwrap_or(defaults.overlap),
            word_boundaries: parse_opt(&get, "DOCQA_WORD_BOUNDARIES")?
                .unwrap_or(defaults.word_boundaries),
        };

        let defaults = RetrievalConfig::default();
        let retrieval = RetrievalConfig {
            top_k: parse_opt(&get, "DOCQA_TOP_K")?.unwrap_or(defaults.top_k),
            min_score: parse_opt(&get, "DOCQA_MIN_SCORE")?,
            max_context_chars: parse_opt(&get, "DOCQA_MAX_CONTEXT_CHARS")?
                .unwrap_or(defaults.max_context_chars),
            empty_context: match get("DOCQA_EMPTY_CONTEXT") {
                Some(raw) => raw.parse()?,
                None => defaults.empty_context,
            },
        };

        Ok(Self {
            document_path: get("DOCQA_DOCUMENT").map(PathBuf::from),
            model,
            chunking,
            retrieval,
            embed_concurrency: parse_opt(&get, "DOCQA_EMBED_CONCURRENCY")?.unwrap_or(8),
            embed_dimension: parse_opt(&get, "DOCQA_EMBED_DIMENSION")?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk size must be > 0".into()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::InvalidConfig("top_k must be > 0".into()));
        }
        if self.retrieval.max_context_chars == 0 {
            return Err(RagError::InvalidConfig("max context chars must be > 0".into()));
        }
        if self.embed_concurrency == 0 {
            return Err(RagError::InvalidConfig("embed concurrency must be > 0".into()));
        }
        if self.model.timeout.is_zero() {
            return Err(RagError::InvalidConfig("timeout must be > 0".into()));
        }
        if self.embed_dimension == Some(0) {
            return Err(RagError::InvalidConfig("embedding dimension must be > 0".into()));
        }
        Ok(())
    }

    pub fn document_path(&self) -> Result<&PathBuf> {
        self.document_path
            .as_ref()
            .ok_or_else(|| RagError::InvalidConfig("no document path configured".into()))
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| RagError::InvalidConfig(format!("{key}='{raw}': {e}"))),
    }
}
