//! Stub model services and fixtures shared by the scenario tests.

use async_trait::async_trait;
use domain::models::{Document, EmbeddingVector, Prompt};
use domain::ports::{EmbeddingService, GenerationService};
use domain::{RagError, Result};
use infrastructure::config::{ChunkingConfig, Config, ModelConfig, Provider};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

pub const VOCABULARY: [&str; 6] = ["cats", "dogs", "fish", "are", "not", "mammals"];

pub const ANIMALS: &str = "Cats are mammals. Dogs are mammals. Fish are not mammals.";

/// Bag-of-words vector over [`VOCABULARY`].
pub fn vocab_vector(text: &str) -> EmbeddingVector {
    let mut vector = vec![0.0; VOCABULARY.len()];
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if let Some(slot) = VOCABULARY.iter().position(|v| *v == word) {
            vector[slot] += 1.0;
        }
    }
    vector
}

/// One sentence of [`ANIMALS`] per chunk.
pub fn sentence_config() -> Config {
    Config {
        chunking: ChunkingConfig {
            chunk_size: 21,
            overlap: 0,
            word_boundaries: true,
        },
        ..Config::default()
    }
}

pub fn document(text: &str) -> Document {
    Document {
        source: "memory".into(),
        text: text.into(),
        checksum: String::new(),
    }
}

pub struct VocabEmbedder {
    calls: AtomicUsize,
    hang_on: Option<String>,
    gate: Option<watch::Receiver<bool>>,
}

impl Default for VocabEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl VocabEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            hang_on: None,
            gate: None,
        }
    }

    /// Never answer for text containing `marker`.
    pub fn hanging_on(marker: &str) -> Self {
        Self {
            hang_on: Some(marker.to_lowercase()),
            ..Self::new()
        }
    }

    /// Hold every call until the gate opens.
    pub fn gated(gate: watch::Receiver<bool>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.hang_on {
            if text.to_lowercase().contains(marker) {
                std::future::pending::<()>().await;
            }
        }
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            let opened = gate.wait_for(|open| *open).await.is_ok();
            if !opened {
                return Err(RagError::EmbeddingUnavailable("gate dropped".into()));
            }
        }
        Ok(vocab_vector(text))
    }
}

/// Returns a fixed reply and remembers every prompt it was given.
pub struct StubGenerator {
    reply: String,
    prompts: Mutex<Vec<Prompt>>,
}

impl StubGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GenerationService for StubGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.clone());
        }
        Ok(self.reply.clone())
    }
}

/// OpenAI-style model server on localhost: vocabulary embeddings and a
/// fixed chat reply. Returns the base URL.
pub async fn spawn_model_server(reply: &'static str) -> std::io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(handle_connection(socket, reply));
        }
    });
    Ok(format!("http://{addr}"))
}

pub fn model_config(base_url: String) -> ModelConfig {
    ModelConfig {
        base_url,
        api_key: Some("test-key".into()),
        timeout: Duration::from_secs(5),
        ..ModelConfig::for_provider(Provider::OpenAi)
    }
}

async fn handle_connection(mut socket: TcpStream, reply: &'static str) {
    let Some((path, body)) = read_request(&mut socket).await else {
        return;
    };
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let (status, payload) = if path.ends_with("/embeddings") {
        let input = request["input"].as_str().unwrap_or_default();
        (
            "200 OK",
            json!({ "object": "list", "data": [{ "index": 0, "embedding": vocab_vector(input) }] }),
        )
    } else if path.ends_with("/chat/completions") {
        (
            "200 OK",
            json!({ "choices": [{ "index": 0, "message": { "role": "assistant", "content": reply } }] }),
        )
    } else {
        ("404 Not Found", json!({ "error": "unknown route" }))
    };
    let body = payload.to_string();
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Request path and body, read up to `Content-Length`.
async fn read_request(socket: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head.split_whitespace().nth(1)?.to_string();
    let length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let end = buf.len().min(header_end + length);
    Some((path, buf[header_end..end].to_vec()))
}
