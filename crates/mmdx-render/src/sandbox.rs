//! Sandbox abstraction
//!
//! The pipeline never touches the browser directly. Everything it needs
//! from the document environment goes through [`Sandbox`], and every call
//! that carries data across the boundary uses a serializable message
//! ([`RenderRequest`] in, [`RenderResponse`] out).
//!
//! The production implementation is [`crate::chrome::ChromeSandbox`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{GanttConfig, SequenceConfig};
use crate::error::Result;
use crate::types::ViewportSpec;

/// Payload sent into the sandbox for one diagram
///
/// The sandbox must drop whatever a previous request inserted before
/// inserting `contents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    /// Raw diagram source, inserted as text
    pub contents: String,
    pub sequence_config: SequenceConfig,
    pub gantt_config: GanttConfig,
    /// Target width in pixels
    pub conf_width: u32,
}

/// Reply from the sandbox for one diagram
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderResponse {
    /// Serialized first `<svg>` element, if the engine produced one
    pub svg: Option<String>,
    /// Message of an exception thrown by the engine
    pub error: Option<String>,
}

/// Size and style applied to the live diagram before capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramFit {
    /// Inline CSS for both `<body>` and the `<svg>`
    pub style: String,
    pub width: String,
    pub height: String,
}

/// An open document environment that hosts the rendering engine
#[async_trait]
pub trait Sandbox: Send {
    /// Replace the page content with `html`
    async fn set_content(&mut self, html: &str) -> Result<()>;

    /// Evaluate a script in the page's global scope
    async fn inject_script(&mut self, script: &str) -> Result<()>;

    /// Forward in-page console output to the host log
    async fn forward_console(&mut self) -> Result<()>;

    /// Run the engine on one diagram
    async fn render(&mut self, request: &RenderRequest) -> Result<RenderResponse>;

    /// Resize the live diagram and page body
    async fn fit_diagram(&mut self, fit: &DiagramFit) -> Result<()>;

    /// Resize the visible capture area
    async fn set_viewport(&mut self, viewport: ViewportSpec) -> Result<()>;

    /// PNG screenshot of the current viewport
    async fn screenshot_png(&mut self) -> Result<Vec<u8>>;

    /// Shut the sandbox down. Calling it twice is harmless.
    async fn close(&mut self) -> Result<()>;
}

/// Starts sandboxes
#[async_trait]
pub trait Launcher: Send + Sync {
    type Session: Sandbox;

    /// Open a fresh sandbox session
    async fn open(&self) -> Result<Self::Session>;
}
