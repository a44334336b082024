use crate::config::ChunkingConfig;
use domain::models::{Chunk, Document};
use domain::{RagError, Result};
use std::iter::FusedIterator;

/// Splits text into overlapping windows of at most `chunk_size` characters.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(RagError::InvalidConfig("chunk size must be > 0".into()));
        }
        if config.overlap >= config.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    /// Lazily yields chunks of `text`. The iterator is single-pass.
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks::new(text, self.config)
    }

    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunks(&document.text).collect()
    }
}

pub struct Chunks<'a> {
    text: &'a str,
    chars: Vec<char>,
    // byte offset of every char, plus text.len() as a sentinel
    byte_offsets: Vec<usize>,
    config: ChunkingConfig,
    start: usize,
    next_index: usize,
    finished: bool,
}

impl<'a> Chunks<'a> {
    fn new(text: &'a str, config: ChunkingConfig) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut byte_offsets = Vec::with_capacity(text.len() + 1);
        for (offset, c) in text.char_indices() {
            chars.push(c);
            byte_offsets.push(offset);
        }
        byte_offsets.push(text.len());
        Self {
            text,
            chars,
            byte_offsets,
            config,
            start: 0,
            next_index: 0,
            finished: false,
        }
    }

    fn at_word_boundary(&self, pos: usize) -> bool {
        pos == 0
            || pos >= self.chars.len()
            || self.chars[pos - 1].is_whitespace()
            || self.chars[pos].is_whitespace()
    }

    /// Pull a mid-word cut back to just after the last whitespace, as long as
    /// the chunk still reaches past the overlap region.
    fn pull_back_to_boundary(&self, hard_end: usize) -> usize {
        if self.at_word_boundary(hard_end) {
            return hard_end;
        }
        let min_end = self.start + self.config.overlap + 1;
        (min_end..hard_end)
            .rev()
            .find(|&p| self.chars[p - 1].is_whitespace())
            .unwrap_or(hard_end)
    }

    /// Move an overlap start forward to the next word start, never past `end`.
    fn push_forward_to_word_start(&self, mut pos: usize, end: usize) -> usize {
        while pos < end && !self.chars[pos - 1].is_whitespace() {
            pos += 1;
        }
        pos
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let total = self.chars.len();
        if self.finished || self.start >= total {
            self.finished = true;
            return None;
        }

        let hard_end = (self.start + self.config.chunk_size).min(total);
        let end = if self.config.word_boundaries && hard_end < total {
            self.pull_back_to_boundary(hard_end)
        } else {
            hard_end
        };

        let chunk = Chunk {
            text: self.text[self.byte_offsets[self.start]..self.byte_offsets[end]].to_string(),
            start_offset: self.start,
            index: self.next_index,
        };
        self.next_index += 1;

        if end >= total {
            self.finished = true;
        } else {
            let mut next_start = end - self.config.overlap;
            if self.config.word_boundaries && self.config.overlap > 0 {
                next_start = self.push_forward_to_word_start(next_start, end);
            }
            self.start = next_start;
        }
        Some(chunk)
    }
}

impl FusedIterator for Chunks<'_> {}
