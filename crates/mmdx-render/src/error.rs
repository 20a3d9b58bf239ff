//! Error types for the export pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while exporting diagrams
///
/// Every variant aborts the whole batch; nothing is recovered locally.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Malformed or unreadable configuration (JSON configs, CSS, engine script)
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON configuration could not be parsed
    #[error("Invalid JSON in {path}: {source}")]
    ConfigJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The sandbox failed to start, or a call into it failed
    #[error("Sandbox error: {0}")]
    Session(String),

    /// The rendering engine produced no `<svg>` element for a file
    #[error("Rendering failed for {}: {reason}", path.display())]
    RenderFailure { path: PathBuf, reason: String },

    /// The engine output is not a parseable XML document
    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Shorthand for a [`ExportError::Session`] built from any displayable error
    pub fn session(err: impl std::fmt::Display) -> Self {
        Self::Session(err.to_string())
    }
}

impl From<quick_xml::Error> for ExportError {
    fn from(err: quick_xml::Error) -> Self {
        Self::MalformedOutput(err.to_string())
    }
}

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;
