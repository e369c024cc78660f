//! In-memory lister over a fixed manifest.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::instrument;

use super::{compile_glob, ReferenceLister};
use crate::error::{Result, TermError};

/// Lists references from a fixed map of directory to names.
///
/// Useful for resolving batches over a known manifest and for tests. A
/// poisoned lister fails on every call, which makes it possible to assert
/// that an operation never touched storage.
///
/// # Examples
///
/// ```rust
/// use term_batch::store::InMemoryLister;
///
/// let lister = InMemoryLister::new()
///     .with_directory("/data/A", ["A-100.csv", "A-101.csv"])
///     .with_directory("/data/B", ["B-200.csv"]);
///
/// assert_eq!(lister.call_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryLister {
    directories: HashMap<PathBuf, Vec<String>>,
    poisoned: bool,
    calls: Arc<AtomicUsize>,
}

impl InMemoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a lister that fails whenever it is used.
    pub fn poisoned() -> Self {
        Self {
            poisoned: true,
            ..Self::default()
        }
    }

    /// Adds a directory and its entries.
    pub fn with_directory<I, S>(mut self, path: impl Into<PathBuf>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.directories
            .insert(path.into(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Number of `list_one_level` calls made so far, including failed ones.
    ///
    /// Clones share the counter.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReferenceLister for InMemoryLister {
    #[instrument(skip(self), fields(base = %base.display(), glob = %glob_directive))]
    async fn list_one_level(
        &self,
        base: &Path,
        glob_directive: &str,
    ) -> Result<Option<Vec<String>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.poisoned {
            return Err(TermError::store_unavailable(
                base.display().to_string(),
                "poisoned lister must not be used",
            ));
        }

        let pattern = compile_glob(glob_directive)?;
        Ok(self.directories.get(base).map(|names| {
            let mut references: Vec<String> = names
                .iter()
                .filter(|name| pattern.matches(name))
                .cloned()
                .collect();
            references.sort();
            references
        }))
    }

    fn description(&self) -> String {
        format!("in-memory manifest ({} directories)", self.directories.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filters_and_sorts() {
        let lister = InMemoryLister::new().with_directory("/d", ["b.csv", "a.csv", "c.txt"]);
        let listed = lister
            .list_one_level(Path::new("/d"), "*.csv")
            .await
            .unwrap();
        assert_eq!(listed, Some(vec!["a.csv".to_string(), "b.csv".to_string()]));
        assert!(lister
            .list_one_level(Path::new("/other"), "*")
            .await
            .unwrap()
            .is_none());
        assert_eq!(lister.call_count(), 2);
    }

    #[tokio::test]
    async fn test_poisoned_lister_always_fails() {
        let lister = InMemoryLister::poisoned();
        let shared = lister.clone();
        let err = lister
            .list_one_level(Path::new("/d"), "*")
            .await
            .unwrap_err();
        assert!(matches!(err, TermError::StoreUnavailable { .. }));
        assert_eq!(shared.call_count(), 1);
    }
}
