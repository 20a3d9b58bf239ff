//! Artifact output
//!
//! The viewport is sized once per diagram, then every requested artifact is
//! produced from that same state.

use std::path::PathBuf;

use tokio::fs;

use crate::error::Result;
use crate::sandbox::Sandbox;
use crate::svg::{Geometry, NormalizedDocument};
use crate::types::{OutputArtifact, OutputKind};

/// Size the sandbox to `geometry` and write `artifacts`
///
/// Returns the written paths in the order of `artifacts`.
pub async fn emit<S>(
    sandbox: &mut S,
    document: &NormalizedDocument,
    geometry: &Geometry,
    artifacts: &[OutputArtifact],
) -> Result<Vec<PathBuf>>
where
    S: Sandbox + ?Sized,
{
    sandbox.fit_diagram(&geometry.fit()).await?;
    sandbox.set_viewport(geometry.viewport()).await?;

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        log::info!("{}", artifact.path.display());
        match artifact.kind {
            OutputKind::Png => {
                let png = sandbox.screenshot_png().await?;
                fs::write(&artifact.path, png).await?;
            }
            OutputKind::Svg => {
                fs::write(&artifact.path, document.to_file_contents()).await?;
            }
        }
        log::info!("saved {}: {}", artifact.kind, artifact.path.display());
        written.push(artifact.path.clone());
    }
    Ok(written)
}
