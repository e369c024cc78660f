//! Reference listers: enumerating raw data references in a backing store.
//!
//! A lister answers one question: which names live directly under a base
//! location and match a glob directive. Listing is one level deep and the
//! returned names are relative to the base, sorted for determinism.
//!
//! - [`FilesystemLister`]: local directories via `tokio::fs`
//! - [`InMemoryLister`]: a fixed manifest of directory contents
//! - `ObjectStoreLister` (feature `cloud-storage`): delimiter listing over any
//!   `object_store::ObjectStore`

use async_trait::async_trait;
use glob::Pattern;
use std::fmt::Debug;
use std::path::Path;

use crate::error::{Result, TermError};

mod filesystem;
mod memory;

#[cfg(feature = "cloud-storage")]
mod object;

pub use filesystem::FilesystemLister;
pub use memory::InMemoryLister;

#[cfg(feature = "cloud-storage")]
pub use object::ObjectStoreLister;

/// A store that can enumerate raw references one level below a base location.
///
/// # Examples
///
/// ```rust,ignore
/// use term_batch::store::{FilesystemLister, ReferenceLister};
/// use std::path::Path;
///
/// # async fn example() -> term_batch::error::Result<()> {
/// let lister = FilesystemLister::new();
/// if let Some(references) = lister.list_one_level(Path::new("/data/A"), "*.csv").await? {
///     for reference in references {
///         println!("{reference}");
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ReferenceLister: Debug + Send + Sync {
    /// Lists the names directly under `base` whose file name matches `glob_directive`.
    ///
    /// Returns `Ok(None)` if `base` does not exist, so that callers can decide
    /// whether a missing location is an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if `base` exists but cannot be listed, and
    /// `Configuration` if the glob directive is invalid.
    async fn list_one_level(&self, base: &Path, glob_directive: &str)
        -> Result<Option<Vec<String>>>;

    /// Short human readable description of the store, used in diagnostics.
    fn description(&self) -> String;
}

/// Compiles a glob directive.
///
/// Supports `*`, `?`, `[...]` and `[!...]`.
pub fn compile_glob(glob_directive: &str) -> Result<Pattern> {
    Pattern::new(glob_directive).map_err(|e| {
        TermError::Configuration(format!("Invalid glob directive '{glob_directive}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_glob() {
        let pattern = compile_glob("*.csv").unwrap();
        assert!(pattern.matches("A-100.csv"));
        assert!(!pattern.matches("A-100.parquet"));

        let pattern = compile_glob("[!_]*").unwrap();
        assert!(pattern.matches("data.csv"));
        assert!(!pattern.matches("_SUCCESS"));

        assert!(matches!(
            compile_glob("[unclosed"),
            Err(TermError::Configuration(_))
        ));
    }
}
