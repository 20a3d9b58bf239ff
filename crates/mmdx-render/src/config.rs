//! Pipeline configuration and config-file loading
//!
//! [`RenderConfig`] is the fully resolved set of options one batch runs
//! with. The engine-specific blobs ([`SequenceConfig`], [`GanttConfig`]) are
//! typed for the keys we know about and carry every other key through
//! untouched in their `extra` map.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ExportError, Result};

/// Default target width of the exported image, in pixels
pub const DEFAULT_WIDTH: u32 = 1200;

/// Places searched for the engine script when none is given explicitly
pub const DEFAULT_ENGINE_PATHS: &[&str] = &[
    "dist/mermaid.js",
    "dist/mermaid.min.js",
    "node_modules/mermaid/dist/mermaid.min.js",
    "mermaid.min.js",
];

/// Stylesheet picked up next to the engine script when no CSS is given
pub const DEFAULT_CSS_FILE: &str = "mermaid.css";

/// Sequence-diagram settings handed to the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceConfig {
    /// Margin to the left and right of the diagram
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_margin_x: Option<f64>,
    /// Margin above and below the diagram
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagram_margin_y: Option<f64>,
    /// Space between actors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_margin: Option<f64>,
    /// Width of an actor box
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Height of an actor box
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Margin around loop boxes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub box_margin: Option<f64>,
    /// Repeat the actors below the diagram
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_actors: Option<bool>,
    /// Shrink the diagram to its container. Always `false` on the way to the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_max_width: Option<bool>,
    /// Keys the pipeline does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SequenceConfig {
    /// Copy of this config with width fitting disabled, so diagrams render
    /// at their natural size
    pub fn at_natural_width(&self) -> Self {
        Self {
            use_max_width: Some(false),
            ..self.clone()
        }
    }
}

/// Gantt-diagram settings handed to the engine
///
/// String values starting with `function` are turned back into functions
/// inside the sandbox (e.g. a custom axis formatter).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GanttConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_top_margin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar_height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bar_gap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_padding: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub left_padding: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_line_start_padding: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_section_styles: Option<u32>,
    /// d3 time format of the axis labels, e.g. `%Y-%m-%d`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_format: Option<String>,
    /// Keys the pipeline does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Engine script text plus where it came from
#[derive(Debug, Clone)]
pub struct EngineScript {
    pub path: PathBuf,
    pub source: String,
}

impl EngineScript {
    /// Read the engine script from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path).map_err(|e| {
            ExportError::Config(format!(
                "cannot read engine script {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the explicit script if given, otherwise the first of
    /// [`DEFAULT_ENGINE_PATHS`] that exists
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        Self::discover_in(explicit, Path::new("."))
    }

    /// Like [`EngineScript::discover`], resolving default paths against `base`
    pub fn discover_in(explicit: Option<&Path>, base: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        for candidate in DEFAULT_ENGINE_PATHS {
            let path = base.join(candidate);
            if path.is_file() {
                log::debug!("Using engine script {}", path.display());
                return Self::load(&path);
            }
        }

        Err(ExportError::Config(format!(
            "mermaid engine script not found; pass --engine or place it at one of: {}",
            DEFAULT_ENGINE_PATHS.join(", ")
        )))
    }

    /// `mermaid.css` next to the script, if there is one
    pub fn sibling_css(&self) -> Option<PathBuf> {
        let css = self.path.parent()?.join(DEFAULT_CSS_FILE);
        css.is_file().then_some(css)
    }
}

/// Fully resolved options for one batch
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Directory artifacts are written to; must exist
    pub output_dir: PathBuf,
    pub png: bool,
    pub svg: bool,
    pub verbose: bool,
    /// User stylesheet, injected into the page and the SVG `<style>`
    pub css: String,
    pub sequence: SequenceConfig,
    pub gantt: GanttConfig,
    /// Target width of the exported image in pixels
    pub width: u32,
    /// Appended to the basename of every artifact
    pub output_suffix: String,
    /// Inputs, rendered in this order
    pub files: Vec<PathBuf>,
    pub engine: EngineScript,
}

impl RenderConfig {
    /// Config with defaults: PNG only, width 1200, no CSS, current directory
    pub fn new(engine: EngineScript, files: Vec<PathBuf>) -> Self {
        Self {
            output_dir: PathBuf::from("."),
            png: true,
            svg: false,
            verbose: false,
            css: String::new(),
            sequence: SequenceConfig::default(),
            gantt: GanttConfig::default(),
            width: DEFAULT_WIDTH,
            output_suffix: String::new(),
            files,
            engine,
        }
    }

    /// Check the invariants the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(ExportError::Config(
                "at least one source file is required".to_string(),
            ));
        }
        if !self.png && !self.svg {
            return Err(ExportError::Config(
                "nothing to write: both png and svg are disabled".to_string(),
            ));
        }
        if self.width == 0 {
            return Err(ExportError::Config("width must be positive".to_string()));
        }
        Ok(())
    }
}

/// Read a CSS file into a string
pub fn load_css(path: &Path) -> Result<String> {
    Ok(fs::read_to_string(path)?)
}

/// Read a JSON config file; `None` yields the default config
pub fn load_json_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = fs::read_to_string(path)?;
    parse_json_config(&text).map_err(|source| ExportError::ConfigJson {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_json_config<T: DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    serde_json::from_str(text)
}
