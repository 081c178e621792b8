use std::path::PathBuf;

/// One file written into a configuration namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFile {
    pub path: String,
    pub content: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("namespace {0} was not derived")]
    NotDerived(String),
}

/// The remote store proxies load their configuration from.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    /// Creates (or updates) the `target` namespace from `template`. A new
    /// namespace is tagged with `version`; an existing one keeps its version
    /// until the next batch is written.
    async fn derive_namespace(
        &self,
        target: &str,
        template: &str,
        version: &str,
    ) -> Result<(), StoreError>;

    /// Replaces the files of a namespace as one batch and tags it with
    /// `version`. A failed batch leaves the namespace's files and version
    /// unchanged.
    async fn write_namespace(
        &self,
        namespace: &str,
        version: &str,
        files: Vec<ConfigFile>,
    ) -> Result<(), StoreError>;
}
