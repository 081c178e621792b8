//! Config store implementations.
//!
//! A namespace is a slash-separated name such as `sidecars/web-1.web.ns`.
//! Each namespace records the version it was last written with.

use ahash::AHashMap as HashMap;
use mesh_policy_controller_core::store::{ConfigFile, ConfigStore, StoreError};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    io,
    path::{Component, Path, PathBuf},
};

/// The file holding a namespace's version.
const VERSION_FILE: &str = ".version";

/// Stores namespaces as directories under a root directory.
#[derive(Clone, Debug)]
pub struct FsConfigStore {
    root: PathBuf,
}

/// Holds namespaces in memory.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
}

#[derive(Clone, Debug, Default)]
struct Namespace {
    version: String,
    files: BTreeMap<String, Vec<u8>>,
    writes: usize,
}

// === impl FsConfigStore ===

impl FsConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self, namespace: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(relative(namespace)?))
    }
}

#[async_trait::async_trait]
impl ConfigStore for FsConfigStore {
    async fn derive_namespace(
        &self,
        target: &str,
        template: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        let target_dir = self.dir(target)?;
        let template_dir = self.dir(template)?;

        let created = !fs::exists(&target_dir).await?;
        fs::create_dir_all(&target_dir).await?;
        if fs::exists(&template_dir).await? {
            fs::copy_tree(&template_dir, &target_dir).await?;
        }
        // An existing namespace keeps its version until a batch lands.
        if created {
            fs::replace(&target_dir.join(VERSION_FILE), version.as_bytes()).await?;
        }
        tracing::trace!(%target, %template, %version, created, "Derived namespace");
        Ok(())
    }

    async fn write_namespace(
        &self,
        namespace: &str,
        version: &str,
        files: Vec<ConfigFile>,
    ) -> Result<(), StoreError> {
        let dir = self.dir(namespace)?;
        if !fs::exists(&dir).await? {
            return Err(StoreError::NotDerived(namespace.to_string()));
        }

        let mut targets = Vec::with_capacity(files.len() + 1);
        for file in files {
            targets.push((dir.join(relative(&file.path)?), file.content));
        }
        targets.push((dir.join(VERSION_FILE), version.as_bytes().to_vec()));

        // Every file is staged beside its target before any is replaced. The
        // version is renamed last so it never names content that is missing.
        let mut staged = Vec::with_capacity(targets.len());
        for (path, content) in &targets {
            match fs::stage(path, content).await {
                Ok(tmp) => staged.push((tmp, path)),
                Err(error) => {
                    for (tmp, _) in &staged {
                        fs::remove_file(tmp).await;
                    }
                    return Err(error);
                }
            }
        }
        for (i, (tmp, path)) in staged.iter().enumerate() {
            if let Err(error) = fs::rename(tmp, path).await {
                for (tmp, _) in &staged[i..] {
                    fs::remove_file(tmp).await;
                }
                return Err(error);
            }
        }
        Ok(())
    }
}

/// Validates a slash-separated name and converts it to a relative path.
fn relative(name: &str) -> Result<PathBuf, StoreError> {
    let path = Path::new(name);
    let valid = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(s) if !s.to_string_lossy().starts_with('.')));
    if !valid {
        return Err(StoreError::InvalidNamespace(name.to_string()));
    }
    Ok(path.to_path_buf())
}

mod fs {
    use super::*;
    use tokio::fs;

    fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The hidden sibling a file is staged in before it replaces `path`.
    fn staging(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.tmp"))
    }

    pub(super) async fn exists(path: &Path) -> Result<bool, StoreError> {
        fs::try_exists(path).await.map_err(io_err(path))
    }

    pub(super) async fn create_dir_all(path: &Path) -> Result<(), StoreError> {
        fs::create_dir_all(path).await.map_err(io_err(path))
    }

    pub(super) async fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
        fs::rename(from, to).await.map_err(io_err(to))
    }

    /// Writes `content` beside `path`, returning the staged file.
    pub(super) async fn stage(path: &Path, content: &[u8]) -> Result<PathBuf, StoreError> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).await?;
        }
        let tmp = staging(path);
        fs::write(&tmp, content).await.map_err(io_err(&tmp))?;
        Ok(tmp)
    }

    /// Replaces `path` so readers see either the old or the new content.
    pub(super) async fn replace(path: &Path, content: &[u8]) -> Result<(), StoreError> {
        let tmp = stage(path, content).await?;
        if let Err(error) = rename(&tmp, path).await {
            remove_file(&tmp).await;
            return Err(error);
        }
        Ok(())
    }

    /// Best-effort removal of a staged file.
    pub(super) async fn remove_file(path: &Path) {
        if let Err(error) = fs::remove_file(path).await {
            if error.kind() != io::ErrorKind::NotFound {
                tracing::debug!(path = %path.display(), %error, "Failed to remove staged file");
            }
        }
    }

    /// Copies every file under `from` into `to`, replacing existing files.
    /// Version markers are not copied.
    pub(super) async fn copy_tree(from: &Path, to: &Path) -> Result<(), StoreError> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            create_dir_all(&dst).await?;
            let mut entries = fs::read_dir(&src).await.map_err(io_err(&src))?;
            while let Some(entry) = entries.next_entry().await.map_err(io_err(&src))? {
                let path = entry.path();
                let target = dst.join(entry.file_name());
                let kind = entry.file_type().await.map_err(io_err(&path))?;
                if kind.is_dir() {
                    pending.push((path, target));
                } else if entry.file_name() != VERSION_FILE {
                    let content = fs::read(&path).await.map_err(io_err(&path))?;
                    replace(&target, &content).await?;
                }
            }
        }
        Ok(())
    }
}

// === impl MemoryConfigStore ===

impl MemoryConfigStore {
    pub fn version(&self, namespace: &str) -> Option<String> {
        self.namespaces
            .read()
            .get(namespace)
            .map(|ns| ns.version.clone())
    }

    pub fn file(&self, namespace: &str, path: &str) -> Option<Vec<u8>> {
        self.namespaces.read().get(namespace)?.files.get(path).cloned()
    }

    /// The number of batches written to a namespace.
    pub fn writes(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .get(namespace)
            .map_or(0, |ns| ns.writes)
    }
}

#[async_trait::async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn derive_namespace(
        &self,
        target: &str,
        template: &str,
        version: &str,
    ) -> Result<(), StoreError> {
        relative(target)?;
        relative(template)?;
        let mut namespaces = self.namespaces.write();
        let inherited = namespaces
            .get(template)
            .map(|t| t.files.clone())
            .unwrap_or_default();
        let ns = namespaces
            .entry(target.to_string())
            .or_insert_with(|| Namespace {
                version: version.to_string(),
                ..Namespace::default()
            });
        ns.files.extend(inherited);
        Ok(())
    }

    async fn write_namespace(
        &self,
        namespace: &str,
        version: &str,
        files: Vec<ConfigFile>,
    ) -> Result<(), StoreError> {
        for file in &files {
            relative(&file.path)?;
        }
        let mut namespaces = self.namespaces.write();
        let ns = namespaces
            .get_mut(namespace)
            .ok_or_else(|| StoreError::NotDerived(namespace.to_string()))?;
        for file in files {
            ns.files.insert(file.path, file.content);
        }
        ns.version = version.to_string();
        ns.writes += 1;
        Ok(())
    }
}
