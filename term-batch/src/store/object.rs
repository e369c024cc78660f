//! Object store lister (S3, GCS, Azure or any `object_store` backend).

use async_trait::async_trait;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};
use url::Url;

use super::{compile_glob, ReferenceLister};
use crate::error::{Result, TermError};

/// Lists references with `list_with_delimiter`, one level below a prefix.
///
/// Object stores have no empty directories, so a prefix with no children is
/// reported as missing.
#[derive(Debug, Clone)]
pub struct ObjectStoreLister {
    store: Arc<dyn ObjectStore>,
    location: String,
}

impl ObjectStoreLister {
    /// Wraps an existing object store.
    pub fn new(store: Arc<dyn ObjectStore>, location: impl Into<String>) -> Self {
        Self {
            store,
            location: location.into(),
        }
    }

    /// Builds a lister from a URL such as `s3://bucket/prefix`.
    ///
    /// Returns the lister and the path component of the URL, to be used as
    /// the connector's base directory.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the URL cannot be parsed or names an
    /// unsupported scheme.
    pub fn from_url(url: &str) -> Result<(Self, String)> {
        let parsed = Url::parse(url)
            .map_err(|e| TermError::Configuration(format!("Invalid store URL '{url}': {e}")))?;
        let (store, path) = object_store::parse_url(&parsed).map_err(|e| {
            TermError::Configuration(format!("Unsupported store URL '{url}': {e}"))
        })?;
        Ok((Self::new(Arc::from(store), url), path.to_string()))
    }
}

fn to_object_path(base: &Path) -> ObjectPath {
    let prefix = base.to_string_lossy();
    ObjectPath::from(prefix.trim_matches('/'))
}

#[async_trait]
impl ReferenceLister for ObjectStoreLister {
    #[instrument(skip(self), fields(store = %self.location, base = %base.display(), glob = %glob_directive))]
    async fn list_one_level(
        &self,
        base: &Path,
        glob_directive: &str,
    ) -> Result<Option<Vec<String>>> {
        let pattern = compile_glob(glob_directive)?;
        let prefix = to_object_path(base);
        let prefix = if prefix.as_ref().is_empty() {
            None
        } else {
            Some(prefix)
        };

        let listing = match self.store.list_with_delimiter(prefix.as_ref()).await {
            Ok(listing) => listing,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => {
                return Err(TermError::store_unavailable_with_source(
                    format!("{}/{}", self.location, base.display()),
                    "failed to list objects",
                    Box::new(e),
                ))
            }
        };

        if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            debug!("Prefix has no children");
            return Ok(None);
        }

        let mut references: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename())
            .chain(listing.objects.iter().filter_map(|o| o.location.filename()))
            .filter(|name| pattern.matches(name))
            .map(str::to_string)
            .collect();
        references.sort();
        references.dedup();

        debug!(count = references.len(), "Listed prefix");
        Ok(Some(references))
    }

    fn description(&self) -> String {
        format!("object store at {}", self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use object_store::PutPayload;

    #[tokio::test]
    async fn test_lists_objects_and_prefixes() {
        let store = Arc::new(InMemory::new());
        for key in ["data/A/A-100.csv", "data/A/A-101.csv", "data/A/part/x.csv", "data/B/B-200.csv"] {
            store
                .put(&ObjectPath::from(key), PutPayload::from_static(b"x"))
                .await
                .unwrap();
        }

        let lister = ObjectStoreLister::new(store, "memory://");
        let listed = lister
            .list_one_level(Path::new("/data/A"), "*")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(listed, vec!["A-100.csv", "A-101.csv", "part"]);

        let top = lister.list_one_level(Path::new("data"), "*").await.unwrap().unwrap();
        assert_eq!(top, vec!["A", "B"]);

        assert!(lister
            .list_one_level(Path::new("data/C"), "*")
            .await
            .unwrap()
            .is_none());
    }
}
