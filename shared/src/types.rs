/// Top-level result used by binaries and glue code; typed errors live in `domain`.
pub type Result<T> = anyhow::Result<T>;
