//! Typed failure kinds.
//!
//! Everything in this crate returns `anyhow::Result`. The variants below are
//! the failures callers are expected to tell apart; recover them with
//! `err.downcast_ref::<DatasetError>()`.
//!
//! Setup failures (`NotFoundOrCorrupted`, `IntegrityMismatch`,
//! `DownloadLocked`, `HttpStatus`) surface while a dataset is being
//! constructed and are never retried. Access failures (`IndexOutOfRange`,
//! `MalformedRow`) surface where the bad index or row is used.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error(
        "Dataset not found or corrupted in '{}'. You can use download=true to download it",
        dir.display()
    )]
    NotFoundOrCorrupted { dir: PathBuf },

    #[error(
        "checksum mismatch for '{}'\n  expected: {expected}\n  actual:   {actual}",
        path.display()
    )]
    IntegrityMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("dataset directory is locked by another process: {}", lock.display())]
    DownloadLocked { lock: PathBuf },

    #[error("GET {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("malformed row {line} in split file '{}': {reason}", path.display())]
    MalformedRow {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}
