//! Loads the resource document that backs the in-memory directory.

use anyhow::{Context, Result};
use mesh_policy_controller_core::memory::{MemoryDirectory, ResourceDocument};
use std::{path::Path, sync::Arc};

pub async fn load(path: &Path) -> Result<ResourceDocument> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    ResourceDocument::from_json(&bytes)
        .with_context(|| format!("invalid resources in {}", path.display()))
}

/// Reloads the document into `directory` each time the process receives
/// SIGHUP. A document that fails to load leaves the directory unchanged.
#[cfg(unix)]
pub async fn reload_on_hangup(
    path: std::path::PathBuf,
    directory: Arc<MemoryDirectory>,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = signal(SignalKind::hangup())?;
    while hangups.recv().await.is_some() {
        match load(&path).await {
            Ok(doc) => {
                tracing::info!(path = %path.display(), "Reloaded resources");
                directory.replace(doc);
            }
            Err(error) => {
                let error = format!("{error:#}");
                tracing::warn!(%error, "Failed to reload resources");
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(_: std::path::PathBuf, _: Arc<MemoryDirectory>) -> Result<()> {
    futures::future::pending().await
}
