//! Data connectors: resolving batch requests to batch definitions and specs.
//!
//! A data connector owns an [`AssetRegistry`], a reference lister and a
//! [`ReferenceCache`]. Resolution runs in a fixed order:
//!
//! ```text
//! BatchRequest
//!     ├── validate request and sorters (no storage access)
//!     ├── refresh cache on first use (list + map every asset)
//!     ├── exact-match filter on names and partition identifiers
//!     ├── partition query
//!     └── sorter chain
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::core::{BatchDefinition, BatchRequest, BatchSpec};
use crate::error::Result;

mod asset;
mod cache;
mod config;
mod filesystem;

pub use asset::{effective_base_directory, Asset, AssetRegistry};
pub use cache::{AssetReferences, CacheHandle, ReferenceCache};
pub use config::{AssetConfig, DataConnectorConfig};
pub use filesystem::ConfiguredAssetFilesystemDataConnector;

/// Number of examples included in each list of a [`SelfCheckReport`].
pub const SELF_CHECK_EXAMPLE_COUNT: usize = 3;

/// Resolves batch requests against a backing store.
///
/// # Examples
///
/// ```rust,ignore
/// use term_batch::connector::{ConfiguredAssetFilesystemDataConnector, DataConnector};
/// use term_batch::core::BatchRequest;
///
/// # async fn example(connector: ConfiguredAssetFilesystemDataConnector) -> term_batch::error::Result<()> {
/// let definitions = connector
///     .get_batch_definitions(&BatchRequest::for_asset("A"))
///     .await?;
/// for definition in &definitions {
///     let spec = connector.build_batch_spec(definition).await?;
///     println!("{:?}", spec.path_ref());
/// }
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait DataConnector: Debug + Send + Sync {
    /// Name of the connector.
    fn name(&self) -> &str;

    /// Name of the execution environment that owns the connector.
    fn environment_name(&self) -> &str;

    /// Names of the registered data assets, in order.
    fn get_available_asset_names(&self) -> Vec<String>;

    /// Resolves a request to an ordered list of batch definitions.
    ///
    /// Refreshes the reference cache if it has not been populated yet.
    async fn get_batch_definitions(&self, request: &BatchRequest) -> Result<Vec<BatchDefinition>>;

    /// Materializes an engine-ready spec for a definition.
    async fn build_batch_spec(&self, definition: &BatchDefinition) -> Result<BatchSpec>;

    /// Rebuilds the reference cache from the store and publishes it.
    async fn refresh(&self) -> Result<()>;

    /// Drops the reference cache; the next resolution lists the store again.
    async fn invalidate(&self);

    /// Total number of cached references, matched or not.
    async fn get_reference_count(&self) -> Result<usize>;

    /// Cached references that did not match their asset's pattern.
    async fn get_unmatched_references(&self) -> Result<Vec<String>>;

    /// Summarizes what the connector sees in the store.
    async fn self_check(&self) -> Result<SelfCheckReport>;
}

/// Per-asset section of a [`SelfCheckReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReport {
    pub batch_definition_count: usize,
    pub example_data_references: Vec<String>,
}

/// A loaded example batch in a [`SelfCheckReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleDataReference {
    pub batch_spec: Value,
    pub n_rows: usize,
}

/// Diagnostic summary of a data connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfCheckReport {
    pub class_name: String,
    pub data_asset_count: usize,
    pub example_data_asset_names: Vec<String>,
    pub data_assets: BTreeMap<String, AssetReport>,
    pub unmatched_data_reference_count: usize,
    pub example_unmatched_data_references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_data_reference: Option<ExampleDataReference>,
}
