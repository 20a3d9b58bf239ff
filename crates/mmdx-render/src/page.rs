//! Page bootstrap
//!
//! Builds the HTML shell the engine runs in and loads the engine script.
//! This happens once per session, before the first diagram.

use crate::config::EngineScript;
use crate::error::Result;
use crate::sandbox::Sandbox;

/// Rule every page starts with; the user stylesheet follows it
pub const BASELINE_CSS: &str = "body {background:white;font-family: Arial;}";

/// What the bootstrapper needs from the batch config
#[derive(Debug, Clone, Copy)]
pub struct BootstrapOptions<'a> {
    pub css: &'a str,
    pub engine: &'a EngineScript,
    /// Forward in-page console output to the log
    pub verbose: bool,
}

/// HTML document with an empty body and the stylesheet in the head
pub fn html_shell(css: &str) -> String {
    let style_open = format!("<style type=\"text/css\">{BASELINE_CSS}");
    [
        "<html>",
        "<head>",
        style_open.as_str(),
        css,
        "</style>",
        "</head>",
        "<body>",
        "</body>",
        "</html>",
    ]
    .join("\n")
}

/// Prepare a fresh sandbox for rendering
pub async fn bootstrap<S>(sandbox: &mut S, options: &BootstrapOptions<'_>) -> Result<()>
where
    S: Sandbox + ?Sized,
{
    sandbox.set_content(&html_shell(options.css)).await?;
    sandbox.inject_script(&options.engine.source).await?;
    log::debug!("Loaded engine script {}", options.engine.path.display());

    if options.verbose {
        sandbox.forward_console().await?;
    }
    Ok(())
}
