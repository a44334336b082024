use std::path::Path;

/// Lower-cased extension of `path`, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

pub fn is_supported_file(path: &Path) -> bool {
    matches!(
        extension_of(path).as_str(),
        "" | "txt" | "md" | "markdown" | "rst" | "pdf" | "docx"
    )
}
