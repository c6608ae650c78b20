// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for docsort

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docsort operations
pub type Result<T> = std::result::Result<T, DocsortError>;

/// docsort error types
#[derive(Error, Debug)]
pub enum DocsortError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Knowledge file {path:?} is corrupt: {reason}")]
    CorruptKnowledge { path: PathBuf, reason: String },

    #[error("Failed to save knowledge to {path:?}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Knowledge file {path:?} is corrupt and cannot be set aside: {reason}")]
    KnowledgeUnusable { path: PathBuf, reason: String },

    #[error("File {0:?} did not become available locally in time")]
    NotMaterialized(PathBuf),

    #[error("Folder conflict for category '{category}': {canonical:?} coexists with {others:?}")]
    Conflict {
        category: String,
        canonical: PathBuf,
        others: Vec<PathBuf>,
    },

    #[error("Failed to move {from:?} to {to:?}: {reason}")]
    FileMove {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },

    #[error("Invalid root folder {0:?}")]
    InvalidRoot(PathBuf),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Category already exists: {0}")]
    DuplicateCategory(String),

    #[error("Invalid category name: {0:?}")]
    InvalidCategoryName(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl DocsortError {
    /// Errors that end a run instead of being recorded per file or per category
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DocsortError::InvalidRoot(_) | DocsortError::KnowledgeUnusable { .. }
        )
    }
}
