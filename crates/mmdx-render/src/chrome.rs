//! Headless Chromium sandbox
//!
//! [`ChromeLauncher`] starts a headless Chromium through `chromiumoxide` and
//! hands out a [`ChromeSandbox`] with a single blank page. All page work goes
//! through `Runtime.evaluate` with JSON-literal arguments built by
//! [`crate::invoke`].
//!
//! The CDP connection is driven by a handler task on the tokio runtime. It
//! stops when the browser goes away. A sandbox that is dropped without
//! [`Sandbox::close`] still takes its browser process down with it.

use std::path::PathBuf;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, EventConsoleApiCalled};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::error::{ExportError, Result};
use crate::invoke::{fit_expression, render_expression};
use crate::sandbox::{DiagramFit, Launcher, RenderRequest, RenderResponse, Sandbox};
use crate::types::ViewportSpec;

/// Log target for forwarded in-page console messages
pub const CONSOLE_TARGET: &str = "mmdx::console";

/// How to start Chromium
#[derive(Debug, Clone, Default)]
pub struct ChromeOptions {
    /// Browser binary; discovered on the system when `None`
    pub executable: Option<PathBuf>,
    /// Disable Chromium's own OS sandbox (needed in most containers)
    pub no_sandbox: bool,
}

/// Starts [`ChromeSandbox`] sessions
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    options: ChromeOptions,
}

impl ChromeLauncher {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }

    fn browser_config(&self) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder();
        if let Some(executable) = &self.options.executable {
            builder = builder.chrome_executable(executable);
        }
        if self.options.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(ExportError::Session)
    }
}

#[async_trait]
impl Launcher for ChromeLauncher {
    type Session = ChromeSandbox;

    async fn open(&self) -> Result<ChromeSandbox> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ExportError::Session(format!("failed to launch Chromium: {e}")))?;

        let handler = tokio::spawn(async move {
            drive_handler(&mut handler).await;
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                return Err(ExportError::Session(format!("failed to open page: {err}")));
            }
        };
        log::debug!("Chromium session started");

        Ok(ChromeSandbox {
            browser,
            page,
            handler,
            console: None,
            closed: false,
        })
    }
}

/// One headless Chromium with one page
pub struct ChromeSandbox {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    console: Option<JoinHandle<()>>,
    closed: bool,
}

impl ChromeSandbox {
    async fn evaluate<T: DeserializeOwned>(&self, expression: String) -> Result<T> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(ExportError::Session)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(ExportError::session)?
            .into_value()
            .map_err(|e| ExportError::Session(format!("unexpected sandbox reply: {e}")))
    }
}

#[async_trait]
impl Sandbox for ChromeSandbox {
    async fn set_content(&mut self, html: &str) -> Result<()> {
        self.page
            .set_content(html)
            .await
            .map_err(ExportError::session)?;
        Ok(())
    }

    async fn inject_script(&mut self, script: &str) -> Result<()> {
        // the script's completion value is not serializable, so don't ask for it
        let params = EvaluateParams::builder()
            .expression(script)
            .build()
            .map_err(ExportError::Session)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(|e| ExportError::Session(format!("engine script failed to load: {e}")))?;
        Ok(())
    }

    async fn forward_console(&mut self) -> Result<()> {
        if self.console.is_some() {
            return Ok(());
        }
        let mut events = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(ExportError::session)?;
        self.console = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let text = event
                    .args
                    .iter()
                    .map(|arg| console_text(arg.value.as_ref(), arg.description.as_deref()))
                    .collect::<Vec<_>>()
                    .join(" ");
                log::info!(target: CONSOLE_TARGET, "{text}");
            }
        }));
        Ok(())
    }

    async fn render(&mut self, request: &RenderRequest) -> Result<RenderResponse> {
        self.evaluate(render_expression(request)?).await
    }

    async fn fit_diagram(&mut self, fit: &DiagramFit) -> Result<()> {
        let _: bool = self.evaluate(fit_expression(fit)?).await?;
        Ok(())
    }

    async fn set_viewport(&mut self, viewport: ViewportSpec) -> Result<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        self.page
            .execute(params)
            .await
            .map_err(ExportError::session)?;
        Ok(())
    }

    async fn screenshot_png(&mut self) -> Result<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(ExportError::session)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Some(console) = self.console.take() {
            console.abort();
        }
        let closed = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| ExportError::Session(format!("failed to close Chromium: {e}")));
        if let Err(err) = self.browser.wait().await {
            log::debug!("Waiting for Chromium to exit failed: {err}");
        }
        self.handler.abort();
        log::debug!("Chromium session closed");
        closed
    }
}

impl Drop for ChromeSandbox {
    fn drop(&mut self) {
        if let Some(console) = self.console.take() {
            console.abort();
        }
        self.handler.abort();
        if !self.closed {
            log::warn!("Chromium session dropped without close; killing the browser");
        }
    }
}

/// Poll the CDP handler until its stream ends
///
/// Errors for single messages (e.g. events this client cannot decode) do
/// not end the connection. Returns the number of items seen.
async fn drive_handler<S, E>(events: &mut S) -> usize
where
    S: Stream<Item = std::result::Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut seen = 0;
    while let Some(event) = events.next().await {
        seen += 1;
        if let Err(err) = event {
            log::debug!("CDP handler error: {err}");
        }
    }
    log::debug!("CDP handler stopped");
    seen
}

/// Text of one console argument: its value if it has one, else its description
fn console_text(value: Option<&Value>, description: Option<&str>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => description.unwrap_or_default().to_string(),
    }
}
