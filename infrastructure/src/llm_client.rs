use crate::config::{ModelConfig, Provider};
use async_trait::async_trait;
use domain::models::{EmbeddingVector, Prompt};
use domain::ports::{EmbeddingService, GenerationService};
use domain::{RagError, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

const ERROR_BODY_PREVIEW: usize = 200;

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Option<Vec<f32>>,
}

#[derive(Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    #[serde(default)]
    data: Vec<OpenAiEmbeddingData>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<Message>,
    #[serde(default)]
    done: bool,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: Option<Message>,
}

/// Which side of the client a failure belongs to.
#[derive(Clone, Copy)]
enum Stage {
    Embedding,
    Generation,
}

impl Stage {
    fn unavailable(self, reason: String) -> RagError {
        match self {
            Self::Embedding => RagError::EmbeddingUnavailable(reason),
            Self::Generation => RagError::GenerationUnavailable(reason),
        }
    }
}

/// HTTP client for an Ollama or OpenAI-compatible model server.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct LlmClient {
    client: Arc<Client>,
    config: ModelConfig,
}

impl LlmClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    fn transport_error(&self, stage: Stage, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            stage.unavailable(format!(
                "request timed out after {}s",
                self.config.timeout.as_secs_f32()
            ))
        } else {
            stage.unavailable(format!("request failed: {e}"))
        }
    }

    /// POST a JSON body and return the raw response text of a 2xx reply.
    async fn post_json<B: Serialize + ?Sized>(
        &self,
        stage: Stage,
        path: &str,
        body: &B,
    ) -> Result<String> {
        let url = self.url(path);
        debug!(%url, "posting to model server");
        let response = self
            .with_auth(self.client.post(&url).json(body))
            .send()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(stage, e))?;
        check_status(stage, status, &text)?;
        Ok(text)
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<EmbeddingVector> {
        let raw = match self.config.provider {
            Provider::Ollama => {
                let request = OllamaEmbeddingRequest {
                    model: &self.config.embed_model,
                    prompt: text,
                };
                self.post_json(Stage::Embedding, "/api/embeddings", &request)
                    .await?
            }
            Provider::OpenAi => {
                let request = OpenAiEmbeddingRequest {
                    model: &self.config.embed_model,
                    input: text,
                };
                self.post_json(Stage::Embedding, "/embeddings", &request)
                    .await?
            }
        };
        parse_embedding(self.config.provider, &raw)
    }

    pub async fn generate_response(&self, prompt: &str) -> Result<String> {
        let messages = vec![Message {
            role: "user".to_string(),
            content: prompt.to_string(),
        }];
        let raw = match self.config.provider {
            Provider::Ollama => {
                let request = OllamaChatRequest {
                    model: &self.config.chat_model,
                    messages,
                    stream: false,
                    options: OllamaOptions {
                        temperature: self.config.temperature,
                    },
                };
                self.post_json(Stage::Generation, "/api/chat", &request)
                    .await?
            }
            Provider::OpenAi => {
                let request = OpenAiChatRequest {
                    model: &self.config.chat_model,
                    messages,
                    temperature: self.config.temperature,
                };
                self.post_json(Stage::Generation, "/chat/completions", &request)
                    .await?
            }
        };
        parse_chat(self.config.provider, &raw)
    }
}

#[async_trait]
impl EmbeddingService for LlmClient {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.generate_embedding(text).await
    }
}

#[async_trait]
impl GenerationService for LlmClient {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.generate_response(&prompt.text).await
    }
}

fn preview(body: &str) -> String {
    let mut out: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    if body.chars().count() > ERROR_BODY_PREVIEW {
        out.push_str("...");
    }
    out
}

fn check_status(stage: Stage, status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let reason = format!("HTTP {}: {}", status.as_u16(), preview(body));
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(match stage {
            Stage::Generation => RagError::RateLimited(reason),
            Stage::Embedding => RagError::EmbeddingUnavailable(reason),
        });
    }
    Err(stage.unavailable(reason))
}

fn parse_embedding(provider: Provider, raw: &str) -> Result<EmbeddingVector> {
    let vector = match provider {
        Provider::Ollama => serde_json::from_str::<OllamaEmbeddingResponse>(raw)
            .ok()
            .and_then(|r| r.embedding),
        Provider::OpenAi => serde_json::from_str::<OpenAiEmbeddingResponse>(raw)
            .ok()
            .and_then(|r| r.data.into_iter().next())
            .map(|d| d.embedding),
    };
    match vector {
        Some(v) if !v.is_empty() => Ok(v),
        Some(_) => Err(RagError::EmbeddingUnavailable(
            "service returned an empty embedding".into(),
        )),
        None => Err(RagError::EmbeddingUnavailable(format!(
            "unexpected embedding response: {}",
            preview(raw)
        ))),
    }
}

fn parse_chat(provider: Provider, raw: &str) -> Result<String> {
    let content = match provider {
        Provider::Ollama => parse_ollama_chat(raw),
        Provider::OpenAi => serde_json::from_str::<OpenAiChatResponse>(raw)
            .ok()
            .and_then(|r| r.choices.into_iter().next())
            .and_then(|c| c.message)
            .map(|m| m.content),
    };
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        _ => Err(RagError::MalformedResponse(format!(
            "answer field missing from response: {}",
            preview(raw)
        ))),
    }
}

/// Ollama answers with one JSON object, or NDJSON when a server ignores
/// `stream: false`.
fn parse_ollama_chat(raw: &str) -> Option<String> {
    if let Ok(resp) = serde_json::from_str::<OllamaChatResponse>(raw) {
        return resp.message.map(|m| m.content);
    }
    let mut full_content = String::new();
    let mut seen = false;
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(chunk) = serde_json::from_str::<OllamaChatResponse>(line) {
            if let Some(message) = chunk.message {
                seen = true;
                full_content.push_str(&message.content);
            }
            if chunk.done {
                break;
            }
        }
    }
    seen.then_some(full_content)
}
