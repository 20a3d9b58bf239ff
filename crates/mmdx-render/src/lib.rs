//! # mmdx-render
//!
//! Renders Mermaid diagram sources to PNG and SVG by driving the Mermaid
//! engine inside a headless browser.
//!
//! ## Pipeline
//!
//! One sandbox session is opened per batch and bootstrapped once with the
//! page shell and the engine script. Each input file then goes through:
//!
//! 1. **render** - the source is sent into the page as a JSON request and the
//!    engine's `<svg>` comes back as markup ([`invoke`])
//! 2. **normalize** - namespaces repaired, stylesheet substituted ([`svg`])
//! 3. **scale** - the diagram is fitted to the configured width ([`Geometry`])
//! 4. **emit** - PNG screenshot and/or SVG file written ([`emit`])
//!
//! Files are processed strictly in order and the first failure stops the
//! batch. The session is closed on every exit path.
//!
//! ## Example
//!
//! ```no_run
//! use mmdx_render::{ChromeLauncher, ChromeOptions, EngineScript, Pipeline, RenderConfig};
//!
//! # async fn demo() -> mmdx_render::Result<()> {
//! let engine = EngineScript::discover(None)?;
//! let mut config = RenderConfig::new(engine, vec!["flow.mmd".into()]);
//! config.svg = true;
//!
//! let report = Pipeline::new(ChromeLauncher::new(ChromeOptions::default()), config)
//!     .run()
//!     .await?;
//! println!("{} artifacts written", report.artifacts.len());
//! # Ok(())
//! # }
//! ```

pub mod chrome;
pub mod config;
pub mod emit;
pub mod error;
pub mod invoke;
pub mod page;
pub mod pipeline;
pub mod sandbox;
pub mod svg;
pub mod types;

pub use chrome::{ChromeLauncher, ChromeOptions, ChromeSandbox};
pub use config::{
    EngineScript, GanttConfig, RenderConfig, SequenceConfig, DEFAULT_ENGINE_PATHS, DEFAULT_WIDTH,
};
pub use error::{ExportError, Result};
pub use pipeline::{BatchReport, Pipeline};
pub use sandbox::{DiagramFit, Launcher, RenderRequest, RenderResponse, Sandbox};
pub use svg::{normalize, Geometry, IntrinsicSize, NormalizedDocument};
pub use types::{FileTask, OutputArtifact, OutputKind, ViewportSpec};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
