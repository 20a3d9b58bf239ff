//! Type definitions for the export pipeline
//!
//! This module defines the artifact kinds, per-file tasks and viewport sizes
//! shared by the pipeline stages.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Kind of artifact written for a diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// PNG screenshot of the sandbox viewport
    Png,
    /// Normalized SVG document
    Svg,
}

impl OutputKind {
    /// Get the file extension for this kind
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A file written by the emitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub kind: OutputKind,
}

impl OutputArtifact {
    /// Build the artifact path `<output_dir>/<basename><suffix>.<ext>`
    ///
    /// The basename keeps the input's own extension, so `flow.mmd` becomes
    /// `flow.mmd.png`.
    pub fn new(output_dir: &Path, basename: &str, suffix: &str, kind: OutputKind) -> Self {
        let file_name = format!("{basename}{suffix}.{}", kind.extension());
        Self {
            path: output_dir.join(file_name),
            kind,
        }
    }
}

/// One input file, for the duration of one loop iteration
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub basename: String,
    pub source: String,
}

impl FileTask {
    /// Read the diagram source and derive the basename
    pub async fn load(path: &Path) -> Result<Self> {
        let source = tokio::fs::read_to_string(path).await?;
        Ok(Self::from_source(path, source))
    }

    /// Build a task from source text already in memory
    pub fn from_source(path: &Path, source: impl Into<String>) -> Self {
        let basename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "diagram".to_string());
        Self {
            path: path.to_path_buf(),
            basename,
            source: source.into(),
        }
    }

    /// Artifacts to write for this task, PNG first
    pub fn artifacts(
        &self,
        output_dir: &Path,
        suffix: &str,
        png: bool,
        svg: bool,
    ) -> Vec<OutputArtifact> {
        let mut out = Vec::with_capacity(2);
        if png {
            out.push(OutputArtifact::new(
                output_dir,
                &self.basename,
                suffix,
                OutputKind::Png,
            ));
        }
        if svg {
            out.push(OutputArtifact::new(
                output_dir,
                &self.basename,
                suffix,
                OutputKind::Svg,
            ));
        }
        out
    }
}

/// Pixel size of the sandbox's capture area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
}
