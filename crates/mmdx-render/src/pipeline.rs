//! Batch driver
//!
//! One sandbox session serves the whole batch. Files are processed strictly
//! in input order: render, normalize, scale, emit. The first error ends the
//! batch, and the session is closed on every exit path.

use std::path::PathBuf;

use crate::config::RenderConfig;
use crate::emit::emit;
use crate::error::Result;
use crate::invoke;
use crate::page::{bootstrap, BootstrapOptions};
use crate::sandbox::{Launcher, Sandbox};
use crate::svg::{normalize, Geometry};
use crate::types::FileTask;

/// What a finished batch produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Number of input files rendered
    pub files: usize,
    /// Every artifact written, in write order
    pub artifacts: Vec<PathBuf>,
}

/// Renders every file of a [`RenderConfig`] through one sandbox session
pub struct Pipeline<L> {
    launcher: L,
    config: RenderConfig,
}

impl<L: Launcher> Pipeline<L> {
    pub fn new(launcher: L, config: RenderConfig) -> Self {
        Self { launcher, config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Run the batch
    ///
    /// The session is closed whether or not the batch succeeds. If both the
    /// batch and the close fail, the batch error wins.
    pub async fn run(&self) -> Result<BatchReport> {
        self.config.validate()?;

        let mut session = self.launcher.open().await?;
        let outcome = self.run_session(&mut session).await;
        let closed = session.close().await;

        match (outcome, closed) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                log::warn!("Failed to close sandbox after error: {close_err}");
                Err(err)
            }
        }
    }

    async fn run_session(&self, session: &mut L::Session) -> Result<BatchReport> {
        let config = &self.config;
        bootstrap(
            session,
            &BootstrapOptions {
                css: &config.css,
                engine: &config.engine,
                verbose: config.verbose,
            },
        )
        .await?;

        log::info!("Num files to execute : {}", config.files.len());

        let mut report = BatchReport::default();
        for path in &config.files {
            log::info!("ready to execute: {}", path.display());
            let task = FileTask::load(path).await?;
            let written = process_file(session, config, &task).await?;
            report.files += 1;
            report.artifacts.extend(written);
        }
        Ok(report)
    }
}

/// Render, normalize, scale and emit one file on an already bootstrapped sandbox
pub async fn process_file<S>(
    sandbox: &mut S,
    config: &RenderConfig,
    task: &FileTask,
) -> Result<Vec<PathBuf>>
where
    S: Sandbox + ?Sized,
{
    let raw = invoke::render(
        sandbox,
        task,
        &config.sequence,
        &config.gantt,
        config.width,
    )
    .await?;

    let mut document = normalize(&raw, &config.css)?;
    let geometry = Geometry::compute(document.intrinsic(), config.width);
    log::debug!(
        "{}: intrinsic {}x{}, scale {:.4}, height {:.2}",
        task.basename,
        document.intrinsic().width,
        document.intrinsic().height,
        geometry.scale_factor,
        geometry.final_height
    );
    document.apply_geometry(&geometry)?;

    let artifacts = task.artifacts(
        &config.output_dir,
        &config.output_suffix,
        config.png,
        config.svg,
    );
    emit(sandbox, &document, &geometry, &artifacts).await
}
