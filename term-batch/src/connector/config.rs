//! Declarative data connector configuration.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::BatchDirective;
use crate::error::{Result, TermError};
use crate::partition::{RegexConfig, SorterConfig};
use crate::store::compile_glob;

fn default_glob_directive() -> String {
    "*".to_string()
}

/// Configuration of a single data asset. Every field is optional; unset
/// fields fall back to the connector defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Directory of the asset, relative to the connector base or absolute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_directory: Option<PathBuf>,
    /// Glob directive overriding the connector's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob_directive: Option<String>,
    /// Regex overriding the connector's default pattern
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Group names overriding the connector's default group names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splitter_method: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub splitter_kwargs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_method: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub sampling_kwargs: Map<String, Value>,
}

impl AssetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_directory = Some(dir.into());
        self
    }

    pub fn with_glob_directive(mut self, glob: impl Into<String>) -> Self {
        self.glob_directive = Some(glob.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_group_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the splitter directive threaded into every batch spec of the asset.
    pub fn with_splitter(mut self, directive: BatchDirective) -> Self {
        self.splitter_method = Some(directive.method);
        self.splitter_kwargs = directive.kwargs;
        self
    }

    /// Sets the sampling directive threaded into every batch spec of the asset.
    pub fn with_sampler(mut self, directive: BatchDirective) -> Self {
        self.sampling_method = Some(directive.method);
        self.sampling_kwargs = directive.kwargs;
        self
    }

    pub fn splitter(&self) -> Option<BatchDirective> {
        self.splitter_method.as_ref().map(|method| BatchDirective {
            method: method.clone(),
            kwargs: self.splitter_kwargs.clone(),
        })
    }

    pub fn sampler(&self) -> Option<BatchDirective> {
        self.sampling_method.as_ref().map(|method| BatchDirective {
            method: method.clone(),
            kwargs: self.sampling_kwargs.clone(),
        })
    }

    fn validate(&self, asset_name: &str) -> Result<()> {
        if let Some(ref glob) = self.glob_directive {
            compile_glob(glob)?;
        }
        if self.splitter_method.is_none() && !self.splitter_kwargs.is_empty() {
            return Err(TermError::Configuration(format!(
                "Asset '{asset_name}' has splitter_kwargs without a splitter_method"
            )));
        }
        if self.sampling_method.is_none() && !self.sampling_kwargs.is_empty() {
            return Err(TermError::Configuration(format!(
                "Asset '{asset_name}' has sampling_kwargs without a sampling_method"
            )));
        }
        Ok(())
    }
}

/// `"A": null` in the assets map declares an asset with default settings.
fn deserialize_assets<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, AssetConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<AssetConfig>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(name, config)| (name, config.unwrap_or_default()))
        .collect())
}

/// Configuration of a configured-asset filesystem data connector.
///
/// # Examples
///
/// ```rust
/// use term_batch::connector::DataConnectorConfig;
///
/// let config = DataConnectorConfig::from_json_str(r#"{
///     "name": "my_connector",
///     "execution_environment_name": "my_env",
///     "base_directory": "/data",
///     "default_regex": {"pattern": "(.+)-(\\d+)\\.csv", "group_names": ["name", "id"]},
///     "assets": {"A": {"base_directory": "A"}, "B": null},
///     "sorters": [{"name": "id", "orderby": "desc", "class": "NumericSorter"}]
/// }"#).unwrap();
///
/// assert_eq!(config.glob_directive, "*");
/// assert_eq!(config.assets.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConnectorConfig {
    /// Name of the data connector
    pub name: String,
    /// Name of the execution environment that owns the connector
    pub execution_environment_name: String,
    /// Root directory the assets live under
    pub base_directory: PathBuf,
    /// Glob applied to names listed under each asset directory
    #[serde(default = "default_glob_directive")]
    pub glob_directive: String,
    /// Pattern and group names used when an asset does not override them
    pub default_regex: RegexConfig,
    /// Registered assets by name
    #[serde(default, deserialize_with = "deserialize_assets")]
    pub assets: BTreeMap<String, AssetConfig>,
    /// Sorters, highest priority first
    #[serde(default)]
    pub sorters: Vec<SorterConfig>,
    /// Treat a missing asset directory as empty instead of failing
    #[serde(default)]
    pub tolerate_missing_directories: bool,
    /// Root that a relative `base_directory` is resolved against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_context_root_directory: Option<PathBuf>,
    /// Upper bound for a single directory listing, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing_timeout_ms: Option<u64>,
}

impl DataConnectorConfig {
    /// Creates a configuration with no assets or sorters.
    pub fn new(
        name: impl Into<String>,
        execution_environment_name: impl Into<String>,
        base_directory: impl Into<PathBuf>,
        default_regex: RegexConfig,
    ) -> Self {
        Self {
            name: name.into(),
            execution_environment_name: execution_environment_name.into(),
            base_directory: base_directory.into(),
            glob_directive: default_glob_directive(),
            default_regex,
            assets: BTreeMap::new(),
            sorters: Vec::new(),
            tolerate_missing_directories: false,
            data_context_root_directory: None,
            listing_timeout_ms: None,
        }
    }

    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            TermError::Configuration(format!("Invalid data connector configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value).map_err(|e| {
            TermError::Configuration(format!("Invalid data connector configuration: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_glob_directive(mut self, glob: impl Into<String>) -> Self {
        self.glob_directive = glob.into();
        self
    }

    pub fn with_asset(mut self, name: impl Into<String>, asset: AssetConfig) -> Self {
        self.assets.insert(name.into(), asset);
        self
    }

    pub fn with_sorter(mut self, sorter: SorterConfig) -> Self {
        self.sorters.push(sorter);
        self
    }

    pub fn with_tolerate_missing_directories(mut self, tolerate: bool) -> Self {
        self.tolerate_missing_directories = tolerate;
        self
    }

    pub fn with_data_context_root_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_context_root_directory = Some(root.into());
        self
    }

    pub fn with_listing_timeout(mut self, timeout: Duration) -> Self {
        self.listing_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn listing_timeout(&self) -> Option<Duration> {
        self.listing_timeout_ms.map(Duration::from_millis)
    }

    /// The connector base directory, resolved against the context root when relative.
    pub fn resolved_base_directory(&self) -> PathBuf {
        match self.data_context_root_directory {
            Some(ref root) if self.base_directory.is_relative() => {
                root.join(&self.base_directory)
            }
            _ => self.base_directory.clone(),
        }
    }

    /// Validates the configuration shape.
    ///
    /// Pattern compilation and sorter checks happen when the connector is built.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TermError::Configuration(
                "Data connector name cannot be empty".to_string(),
            ));
        }
        if self.execution_environment_name.trim().is_empty() {
            return Err(TermError::Configuration(format!(
                "Data connector '{}' has an empty execution environment name",
                self.name
            )));
        }
        if self.default_regex.pattern.is_empty() {
            return Err(TermError::Configuration(format!(
                "Data connector '{}' has an empty default regex pattern",
                self.name
            )));
        }
        compile_glob(&self.glob_directive)?;

        if self.listing_timeout_ms == Some(0) {
            return Err(TermError::Configuration(
                "listing_timeout_ms must be greater than 0".to_string(),
            ));
        }

        for (name, asset) in &self.assets {
            if name.trim().is_empty() {
                return Err(TermError::Configuration(
                    "Data asset name cannot be empty".to_string(),
                ));
            }
            asset.validate(name)?;
        }
        Ok(())
    }
}
