pub mod chunker;
pub mod config;
pub mod document_loader;
pub mod embedder;
pub mod llm_client;
pub mod search;
