//! Data connector over directories with explicitly configured assets.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{
    Asset, AssetRegistry, AssetReport, CacheHandle, DataConnector, DataConnectorConfig,
    ExampleDataReference, ReferenceCache, SelfCheckReport, SELF_CHECK_EXAMPLE_COUNT,
};
use crate::core::{BatchDefinition, BatchRequest, BatchSpec};
use crate::engine::ExecutionEngine;
use crate::error::{Result, TermError};
use crate::logging::{truncate_field, LogConfig};
use crate::partition::SorterChain;
use crate::store::{FilesystemLister, ReferenceLister};
use crate::{log_data_op, log_reference};

const CLASS_NAME: &str = "ConfiguredAssetFilesystemDataConnector";

/// Resolves batches for explicitly configured assets, each a directory of
/// files (or sub-directories) whose names encode partition values.
///
/// The reference cache is populated on first use and reused until
/// [`refresh`](DataConnector::refresh) or
/// [`invalidate`](DataConnector::invalidate) is called.
///
/// # Examples
///
/// ```rust,ignore
/// use term_batch::connector::{
///     AssetConfig, ConfiguredAssetFilesystemDataConnector, DataConnector, DataConnectorConfig,
/// };
/// use term_batch::core::BatchRequest;
/// use term_batch::partition::{RegexConfig, SortOrder, SorterConfig};
///
/// # async fn example() -> term_batch::error::Result<()> {
/// let config = DataConnectorConfig::new(
///     "my_connector",
///     "my_env",
///     "/data",
///     RegexConfig::new(r"(.+)-(\d+)\.csv", ["name", "id"]),
/// )
/// .with_asset("A", AssetConfig::new().with_base_directory("A"))
/// .with_sorter(SorterConfig::numeric("id", SortOrder::Descending));
///
/// let connector = ConfiguredAssetFilesystemDataConnector::from_config(config)?;
/// let definitions = connector.get_batch_definitions(&BatchRequest::for_asset("A")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfiguredAssetFilesystemDataConnector {
    name: String,
    environment_name: String,
    base_directory: PathBuf,
    registry: AssetRegistry,
    sorters: SorterChain,
    lister: Arc<dyn ReferenceLister>,
    tolerate_missing_directories: bool,
    listing_timeout: Option<Duration>,
    cache: CacheHandle,
    log_config: LogConfig,
}

impl ConfiguredAssetFilesystemDataConnector {
    /// Builds a connector that lists the local filesystem.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the configuration, any effective
    /// regex or the sorters are invalid. Storage is not accessed.
    pub fn from_config(config: DataConnectorConfig) -> Result<Self> {
        Self::from_config_with_lister(config, Arc::new(FilesystemLister::new()))
    }

    /// Builds a connector over a custom reference lister.
    pub fn from_config_with_lister(
        config: DataConnectorConfig,
        lister: Arc<dyn ReferenceLister>,
    ) -> Result<Self> {
        debug!(connector = %config.name, "Constructing {CLASS_NAME}");
        config.validate()?;

        let registry = AssetRegistry::from_config(&config)?;
        let sorters = SorterChain::new(config.sorters.clone())?;

        if registry.is_empty() {
            sorters.validate_against(&registry.default_regex().group_names)?;
        } else {
            for asset in registry.iter() {
                sorters.validate_against(asset.group_names()).map_err(|e| {
                    TermError::Configuration(format!(
                        "Data connector '{}' cannot sort data asset '{}': {e}",
                        config.name,
                        asset.name()
                    ))
                })?;
            }
        }

        Ok(Self {
            base_directory: config.resolved_base_directory(),
            listing_timeout: config.listing_timeout(),
            name: config.name,
            environment_name: config.execution_environment_name,
            registry,
            sorters,
            lister,
            tolerate_missing_directories: config.tolerate_missing_directories,
            cache: CacheHandle::new(),
            log_config: LogConfig::default(),
        })
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Connector base directory, resolved against the context root.
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn sorters(&self) -> &SorterChain {
        &self.sorters
    }

    /// Unmatched references of one asset.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before the first refresh and `InvalidRequest`
    /// for an unknown asset.
    pub async fn get_unmatched_references_for(&self, asset: &str) -> Result<Vec<String>> {
        if !self.registry.contains(asset) {
            return Err(TermError::InvalidRequest(format!(
                "Data asset '{asset}' is not registered with data connector '{}'",
                self.name
            )));
        }
        Ok(self.current_cache().await?.unmatched_for(asset))
    }

    /// Like [`self_check`](DataConnector::self_check), additionally loading the
    /// first batch of the first asset with `engine` to report its row count.
    pub async fn self_check_with_engine(
        &self,
        engine: &dyn ExecutionEngine,
    ) -> Result<SelfCheckReport> {
        let mut report = self.self_check().await?;

        let cache = self.ensure_cache().await?;
        let example = cache.first_definitions().into_iter().next();
        if let Some(definition) = example {
            let spec = self.build_batch_spec(&definition).await?;
            let data = engine.get_batch_data(&spec).await?;
            report.example_data_reference = Some(ExampleDataReference {
                batch_spec: spec.to_json(),
                n_rows: data.iter().map(|b| b.num_rows()).sum(),
            });
        }
        Ok(report)
    }

    async fn current_cache(&self) -> Result<Arc<ReferenceCache>> {
        self.cache
            .snapshot()
            .await
            .ok_or_else(|| TermError::NotInitialized(self.name.clone()))
    }

    /// Returns the current snapshot, building and publishing one if needed.
    ///
    /// No lock is held while listing; if another task publishes first, its
    /// snapshot wins.
    async fn ensure_cache(&self) -> Result<Arc<ReferenceCache>> {
        if let Some(cache) = self.cache.snapshot().await {
            return Ok(cache);
        }
        let cache = self.build_cache().await?;
        Ok(self.cache.publish_if_empty(cache).await)
    }

    #[instrument(skip(self), fields(connector = %self.name, assets = self.registry.len()))]
    async fn build_cache(&self) -> Result<ReferenceCache> {
        let listings = try_join_all(self.registry.iter().map(|asset| self.list_asset(asset))).await?;

        let mut cache = ReferenceCache::new();
        for (asset, references) in self.registry.iter().zip(listings) {
            let entries: BTreeMap<String, Vec<BatchDefinition>> = references
                .into_iter()
                .map(|reference| {
                    let definitions = self.map_reference(asset, &reference);
                    (reference, definitions)
                })
                .collect();
            cache.insert_asset(asset.name(), entries);
        }

        let unmatched = cache.unmatched_references().len();
        info!(
            references = cache.reference_count(),
            unmatched = unmatched,
            "Reference cache built"
        );
        Ok(cache)
    }

    fn map_reference(&self, asset: &Asset, reference: &str) -> Vec<BatchDefinition> {
        match asset.mapper().map_reference(
            reference,
            &self.environment_name,
            &self.name,
            Some(asset.name()),
        ) {
            Some(definition) => {
                log_reference!(
                    self.log_config,
                    asset = %asset.name(),
                    reference = %truncate_field(reference, self.log_config.max_field_length),
                    identity = %definition.partition_identity,
                    "Mapped reference"
                );
                vec![definition]
            }
            None => {
                warn!(
                    asset = %asset.name(),
                    reference = %truncate_field(reference, self.log_config.max_field_length),
                    pattern = %asset.mapper().pattern(),
                    "Reference does not match the asset pattern"
                );
                Vec::new()
            }
        }
    }

    #[instrument(skip(self, asset), fields(asset = %asset.name(), base = %asset.base_directory().display()))]
    async fn list_asset(&self, asset: &Asset) -> Result<Vec<String>> {
        let base = asset.base_directory();
        let listing = self.lister.list_one_level(base, asset.glob_directive());

        let listed = match self.listing_timeout {
            Some(limit) => tokio::time::timeout(limit, listing).await.map_err(|_| {
                TermError::store_unavailable(
                    base.display().to_string(),
                    format!("listing did not finish within {limit:?}"),
                )
            })??,
            None => listing.await?,
        };

        match listed {
            Some(references) => {
                log_data_op!(
                    self.log_config,
                    count = references.len(),
                    store = %self.lister.description(),
                    "Listed data asset references"
                );
                Ok(references)
            }
            None if self.tolerate_missing_directories => {
                warn!(
                    asset = %asset.name(),
                    base = %base.display(),
                    "Data asset directory does not exist; treating it as empty"
                );
                Ok(Vec::new())
            }
            None => Err(TermError::store_unavailable(
                base.display().to_string(),
                "directory does not exist",
            )),
        }
    }

    fn validate_request(&self, request: &BatchRequest) -> Result<()> {
        if let Some(ref env) = request.execution_environment_name {
            if env != &self.environment_name {
                return Err(TermError::InvalidRequest(format!(
                    "Execution environment '{env}' does not match '{}' of data connector '{}'",
                    self.environment_name, self.name
                )));
            }
        }
        if let Some(ref connector) = request.data_connector_name {
            if connector != &self.name {
                return Err(TermError::InvalidRequest(format!(
                    "Data connector '{connector}' does not match '{}'",
                    self.name
                )));
            }
        }
        if let Some(ref asset) = request.data_asset_name {
            if !self.registry.contains(asset) {
                return Err(TermError::InvalidRequest(format!(
                    "Data asset '{asset}' is not registered with data connector '{}'; available assets are {:?}",
                    self.name,
                    self.registry.names()
                )));
            }
        }
        if let Some(ref query) = request.partition_query {
            query.validate()?;
        }
        Ok(())
    }

    fn unresolvable(&self, definition: &BatchDefinition, message: impl Into<String>) -> TermError {
        TermError::unresolvable_batch(definition.data_asset_name.clone(), message)
    }
}

#[async_trait]
impl DataConnector for ConfiguredAssetFilesystemDataConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn environment_name(&self) -> &str {
        &self.environment_name
    }

    fn get_available_asset_names(&self) -> Vec<String> {
        self.registry.names()
    }

    #[instrument(skip(self, request), fields(connector = %self.name, asset = ?request.data_asset_name))]
    async fn get_batch_definitions(&self, request: &BatchRequest) -> Result<Vec<BatchDefinition>> {
        self.validate_request(request)?;
        self.sorters
            .validate_against(self.registry.group_names_for(request.data_asset_name.as_deref()))?;

        let cache = self.ensure_cache().await?;

        let definitions: Vec<BatchDefinition> = cache
            .first_definitions()
            .into_iter()
            .filter(|d| d.matches_request(request))
            .collect();

        let definitions = match request.partition_query {
            Some(ref query) => query.select(&definitions),
            None => definitions,
        };

        let definitions = if self.sorters.is_empty() {
            definitions
        } else {
            self.sorters.sort(definitions)?
        };

        debug!(count = definitions.len(), "Resolved batch definitions");
        Ok(definitions)
    }

    #[instrument(skip(self, definition), fields(connector = %self.name, asset = %definition.data_asset_name))]
    async fn build_batch_spec(&self, definition: &BatchDefinition) -> Result<BatchSpec> {
        if definition.execution_environment_name != self.environment_name
            || definition.data_connector_name != self.name
        {
            return Err(self.unresolvable(
                definition,
                format!(
                    "definition belongs to data connector '{}' in '{}', not '{}' in '{}'",
                    definition.data_connector_name,
                    definition.execution_environment_name,
                    self.name,
                    self.environment_name
                ),
            ));
        }

        let asset = self
            .registry
            .get(&definition.data_asset_name)
            .ok_or_else(|| self.unresolvable(definition, "data asset is not registered"))?;

        let cache = self.ensure_cache().await.map_err(|e| {
            TermError::unresolvable_batch_with_source(
                asset.name(),
                "reference cache could not be built",
                Box::new(e),
            )
        })?;

        let rendered = asset.mapper().map_definition(definition).map_err(|e| {
            TermError::unresolvable_batch_with_source(
                asset.name(),
                format!("cannot render partition identity {}", definition.partition_identity),
                Box::new(e),
            )
        })?;

        let reference = if !asset.mapper().template().has_wildcards()
            && cache.reference_maps_to(asset.name(), &rendered, definition)
        {
            rendered
        } else {
            cache
                .find_reference(asset.name(), definition)
                .map(str::to_string)
                .ok_or_else(|| {
                    self.unresolvable(
                        definition,
                        format!(
                            "no data reference matches partition identity {} (template '{}')",
                            definition.partition_identity,
                            asset.mapper().template()
                        ),
                    )
                })?
        };

        let mut spec = BatchSpec::path(asset.base_directory().join(&reference))
            .with_batch_identifiers(definition.partition_identity.clone());
        if let Some(splitter) = asset.splitter() {
            spec = spec.with_splitter(splitter.clone());
        }
        if let Some(sampler) = asset.sampler() {
            spec = spec.with_sampler(sampler.clone());
        }

        debug!(reference = %reference, "Built batch spec");
        Ok(spec)
    }

    async fn refresh(&self) -> Result<()> {
        let cache = self.build_cache().await?;
        self.cache.publish(cache).await;
        Ok(())
    }

    async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    async fn get_reference_count(&self) -> Result<usize> {
        Ok(self.current_cache().await?.reference_count())
    }

    async fn get_unmatched_references(&self) -> Result<Vec<String>> {
        Ok(self.current_cache().await?.unmatched_references())
    }

    #[instrument(skip(self), fields(connector = %self.name))]
    async fn self_check(&self) -> Result<SelfCheckReport> {
        let cache = self.ensure_cache().await?;
        let asset_names = self.registry.names();
        let example_data_asset_names: Vec<String> = asset_names
            .iter()
            .take(SELF_CHECK_EXAMPLE_COUNT)
            .cloned()
            .collect();

        let data_assets = example_data_asset_names
            .iter()
            .map(|name| {
                let matched = cache.matched_for(name);
                let report = AssetReport {
                    batch_definition_count: matched.len(),
                    example_data_references: matched
                        .iter()
                        .take(SELF_CHECK_EXAMPLE_COUNT)
                        .map(|r| r.to_string())
                        .collect(),
                };
                (name.clone(), report)
            })
            .collect();

        let unmatched = cache.unmatched_references();

        Ok(SelfCheckReport {
            class_name: CLASS_NAME.to_string(),
            data_asset_count: asset_names.len(),
            example_data_asset_names,
            data_assets,
            unmatched_data_reference_count: unmatched.len(),
            example_unmatched_data_references: unmatched
                .into_iter()
                .take(SELF_CHECK_EXAMPLE_COUNT)
                .collect(),
            example_data_reference: None,
        })
    }
}
