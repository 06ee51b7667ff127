//! Patch store definitions
//!
//! A patch store is a read-only source of named SQL scripts. It makes no
//! ordering or validation promises; the catalog does all of that.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Errors returned by a [`PatchStore`].
#[derive(Debug, thiserror::Error)]
pub enum PatchStoreError {
    /// The store could not enumerate its scripts.
    #[error("failed to list patches: {0}")]
    List(#[source] std::io::Error),
    /// No script with the given name exists.
    #[error("patch {0} not found")]
    NotFound(String),
    /// The script exists but could not be read.
    #[error("failed to read patch {name}: {source}")]
    Read {
        /// The name of the script.
        name: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A read-only provider of SQL patch scripts.
#[async_trait]
pub trait PatchStore: Send + Sync {
    /// Lists the names of every `*.sql` entry in the store, in no particular order.
    async fn list_names(&self) -> Result<Vec<String>, PatchStoreError>;

    /// Reads the raw bytes of the named script.
    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, PatchStoreError>;
}

#[async_trait]
impl<S> PatchStore for &S
where
    S: PatchStore + ?Sized,
{
    async fn list_names(&self) -> Result<Vec<String>, PatchStoreError> {
        (**self).list_names().await
    }

    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, PatchStoreError> {
        (**self).read_bytes(name).await
    }
}

/// A patch store backed by the top level of a filesystem directory.
///
/// Subdirectories are not searched.
#[derive(Debug, Clone)]
pub struct DirPatchStore {
    root: PathBuf,
}

impl DirPatchStore {
    /// Creates a store reading scripts from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory this store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PatchStore for DirPatchStore {
    async fn list_names(&self) -> Result<Vec<String>, PatchStoreError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(PatchStoreError::List)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(PatchStoreError::List)? {
            let file_type = entry.file_type().await.map_err(PatchStoreError::List)?;
            if file_type.is_dir() {
                continue;
            }
            // Names that are not valid UTF-8 can never match the patch grammar.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.ends_with(".sql") {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, PatchStoreError> {
        match tokio::fs::read(self.root.join(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PatchStoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(PatchStoreError::Read {
                name: name.to_string(),
                source: e,
            }),
        }
    }
}
