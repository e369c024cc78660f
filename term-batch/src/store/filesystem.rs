//! Local filesystem lister.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, instrument, warn};

use super::{compile_glob, ReferenceLister};
use crate::error::{Result, TermError};

/// Lists a local directory with `tokio::fs::read_dir`.
///
/// Both files and sub-directories are returned when their name matches the
/// glob directive, so a reference can name a partitioned directory.
#[derive(Debug, Clone, Default)]
pub struct FilesystemLister;

impl FilesystemLister {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReferenceLister for FilesystemLister {
    #[instrument(skip(self), fields(base = %base.display(), glob = %glob_directive))]
    async fn list_one_level(
        &self,
        base: &Path,
        glob_directive: &str,
    ) -> Result<Option<Vec<String>>> {
        let pattern = compile_glob(glob_directive)?;

        let mut entries = match tokio::fs::read_dir(base).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Directory does not exist");
                return Ok(None);
            }
            Err(e) => {
                return Err(TermError::store_unavailable_with_source(
                    base.display().to_string(),
                    "cannot read directory",
                    Box::new(e),
                ))
            }
        };

        let mut references = Vec::new();
        loop {
            let entry = entries.next_entry().await.map_err(|e| {
                TermError::store_unavailable_with_source(
                    base.display().to_string(),
                    "failed while reading directory entries",
                    Box::new(e),
                )
            })?;
            let Some(entry) = entry else {
                break;
            };

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                warn!(entry = ?file_name, "Skipping entry with a non UTF-8 name");
                continue;
            };
            if pattern.matches(name) {
                references.push(name.to_string());
            }
        }

        references.sort();
        debug!(count = references.len(), "Listed directory");
        Ok(Some(references))
    }

    fn description(&self) -> String {
        "local filesystem".to_string()
    }
}
