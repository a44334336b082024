use docx_rs::{read_docx, DocumentChild, Table, TableCellContent, TableChild, TableRowChild};
use domain::models::Document;
use domain::{RagError, Result};
use memmap2::Mmap;
use shared::utils::{extension_of, is_supported_file};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Reads the source document into normalized text.
#[derive(Debug, Clone, Copy)]
pub struct DocumentLoader {
    max_file_bytes: u64,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader {
    pub fn new() -> Self {
        Self {
            max_file_bytes: 64 * 1024 * 1024,
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn load(&self, path: &Path) -> Result<Document> {
        let meta = path
            .metadata()
            .map_err(|e| load_failure(path, format!("cannot stat: {e}")))?;
        if !meta.is_file() {
            return Err(load_failure(path, "not a regular file"));
        }
        if meta.len() > self.max_file_bytes {
            return Err(load_failure(
                path,
                format!("{} bytes exceeds limit of {}", meta.len(), self.max_file_bytes),
            ));
        }
        if !is_supported_file(path) {
            return Err(load_failure(
                path,
                "unsupported format (expected text, markdown, PDF or DOCX)",
            ));
        }

        let raw = match extension_of(path).as_str() {
            "pdf" => pdf_extract::extract_text(path)
                .map_err(|e| load_failure(path, format!("PDF extraction failed: {e}")))?,
            "docx" => self.read_docx_text(path)?,
            _ => self.read_plain_text(path, meta.len())?,
        };

        let text = normalize_text(&raw);
        let checksum = format!("{:x}", md5::compute(text.as_bytes()));
        let document = Document {
            source: path.to_string_lossy().to_string(),
            text,
            checksum,
        };
        info!(
            source = %document.source,
            chars = document.char_len(),
            checksum = %document.checksum,
            "document loaded"
        );
        Ok(document)
    }

    fn read_plain_text(&self, path: &Path, len: u64) -> Result<String> {
        if len == 0 {
            return Ok(String::new());
        }
        let file = File::open(path).map_err(|e| load_failure(path, e.to_string()))?;
        // SAFETY: the mapping is read-only and dropped before this function returns.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| load_failure(path, e.to_string()))?;
        // Lossy conversion keeps stray non-UTF8 bytes from failing the load.
        Ok(String::from_utf8_lossy(&mmap).into_owned())
    }

    fn read_docx_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path).map_err(|e| load_failure(path, e.to_string()))?;
        let docx = read_docx(&bytes)
            .map_err(|e| load_failure(path, format!("DOCX parsing failed: {e}")))?;
        let mut text = String::new();
        for child in &docx.document.children {
            match child {
                DocumentChild::Paragraph(p) => {
                    text.push_str(&p.raw_text());
                    text.push('\n');
                }
                DocumentChild::Table(table) => push_table_text(table, &mut text),
                _ => debug!("skipping non-text DOCX element"),
            }
        }
        Ok(text)
    }
}

/// One line per row, cells separated by tabs. Nested tables are flattened
/// into the cell that holds them.
fn push_table_text(table: &Table, out: &mut String) {
    for row in &table.rows {
        let TableChild::TableRow(row) = row;
        let mut cells = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            let TableRowChild::TableCell(cell) = cell;
            let mut cell_text = String::new();
            for content in &cell.children {
                match content {
                    TableCellContent::Paragraph(p) => {
                        if !cell_text.is_empty() {
                            cell_text.push(' ');
                        }
                        cell_text.push_str(&p.raw_text());
                    }
                    TableCellContent::Table(inner) => push_table_text(inner, &mut cell_text),
                    _ => warn!("skipping unsupported content in DOCX table cell"),
                }
            }
            cells.push(cell_text.trim().to_string());
        }
        out.push_str(&cells.join("\t"));
        out.push('\n');
    }
}

fn load_failure(path: &Path, reason: impl std::fmt::Display) -> RagError {
    RagError::LoadFailure(format!("{}: {}", path.display(), reason))
}

/// Unify line endings, drop control characters and squeeze runs of blank
/// lines down to a single paragraph break.
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut newlines = 0usize;
    for c in unified.chars() {
        if c == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(c);
            }
            continue;
        }
        if c.is_control() && c != '\t' {
            continue;
        }
        newlines = 0;
        out.push(c);
    }
    out.trim().to_string()
}
