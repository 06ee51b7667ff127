use async_trait::async_trait;
use pgpatch_core::prelude::*;
use std::collections::BTreeMap;

/// An in-memory patch store.
///
/// Useful for tests and for patch sets compiled into the binary:
///
/// ```ignore
/// let store = InMemoryPatchStore::from_iter([
///     ("1_init.up.sql", include_str!("../patches/1_init.up.sql")),
///     ("2_seed.up.sql", include_str!("../patches/2_seed.up.sql")),
/// ]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryPatchStore {
    files: BTreeMap<String, Vec<u8>>,
}

impl InMemoryPatchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    pub fn insert(&mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(name.into(), contents.into());
    }

    /// Adds or replaces a file, builder style.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(name, contents);
        self
    }

    /// Removes a file, returning its contents.
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }
}

impl<N, C> FromIterator<(N, C)> for InMemoryPatchStore
where
    N: Into<String>,
    C: Into<Vec<u8>>,
{
    fn from_iter<I: IntoIterator<Item = (N, C)>>(iter: I) -> Self {
        let mut store = Self::new();
        for (name, contents) in iter {
            store.insert(name, contents);
        }
        store
    }
}

#[async_trait]
impl PatchStore for InMemoryPatchStore {
    async fn list_names(&self) -> Result<Vec<String>, PatchStoreError> {
        Ok(self
            .files
            .keys()
            .filter(|name| name.ends_with(".sql"))
            .cloned()
            .collect())
    }

    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, PatchStoreError> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| PatchStoreError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_only_sql_files() {
        let store = InMemoryPatchStore::from_iter([
            ("1_init.up.sql", "create table t(x int);"),
            ("README.md", "docs"),
        ]);
        assert_eq!(store.list_names().await.unwrap(), vec!["1_init.up.sql"]);
        assert!(matches!(
            store.read_bytes("README.sql").await,
            Err(PatchStoreError::NotFound(_))
        ));
    }
}
