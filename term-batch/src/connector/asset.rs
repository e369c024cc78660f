//! Registered data assets and their effective settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::BatchDirective;
use crate::error::{Result, TermError};
use crate::partition::{EffectiveRegexConfig, PatternMapper, RegexConfig};

use super::DataConnectorConfig;

/// A named subset of the store with its effective settings resolved.
#[derive(Debug, Clone)]
pub struct Asset {
    name: String,
    base_directory: PathBuf,
    glob_directive: String,
    regex: EffectiveRegexConfig,
    mapper: PatternMapper,
    splitter: Option<BatchDirective>,
    sampler: Option<BatchDirective>,
}

impl Asset {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory listed for this asset.
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    pub fn glob_directive(&self) -> &str {
        &self.glob_directive
    }

    /// Pattern and group names in force for this asset.
    pub fn regex(&self) -> &EffectiveRegexConfig {
        &self.regex
    }

    pub fn mapper(&self) -> &PatternMapper {
        &self.mapper
    }

    pub fn group_names(&self) -> &[String] {
        &self.regex.group_names
    }

    pub fn splitter(&self) -> Option<&BatchDirective> {
        self.splitter.as_ref()
    }

    pub fn sampler(&self) -> Option<&BatchDirective> {
        self.sampler.as_ref()
    }
}

/// Joins an asset directory onto the connector base.
///
/// A relative asset directory is a suffix of the base; an absolute one
/// replaces it. Without an asset directory the base is used as is.
pub fn effective_base_directory(connector_base: &Path, asset_directory: Option<&Path>) -> PathBuf {
    match asset_directory {
        Some(dir) => connector_base.join(dir),
        None => connector_base.to_path_buf(),
    }
}

/// Assets of one connector, ordered by name. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    assets: BTreeMap<String, Asset>,
    default_regex: RegexConfig,
    default_mapper: PatternMapper,
}

impl AssetRegistry {
    /// Resolves and validates every asset of a connector configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error naming the asset whose effective regex
    /// does not compile or does not agree with its group names.
    pub fn from_config(config: &DataConnectorConfig) -> Result<Self> {
        let connector_base = config.resolved_base_directory();
        let default_mapper = PatternMapper::new(&EffectiveRegexConfig::from(&config.default_regex))
            .map_err(|e| {
                TermError::Configuration(format!(
                    "Default regex of data connector '{}' is invalid: {e}",
                    config.name
                ))
            })?;

        let mut assets = BTreeMap::new();
        for (name, asset_config) in &config.assets {
            let regex = EffectiveRegexConfig::resolve(
                &config.default_regex,
                asset_config.pattern.as_deref(),
                asset_config.group_names.as_deref(),
            );
            let mapper = PatternMapper::new(&regex).map_err(|e| {
                TermError::Configuration(format!("Data asset '{name}' is misconfigured: {e}"))
            })?;

            let asset = Asset {
                name: name.clone(),
                base_directory: effective_base_directory(
                    &connector_base,
                    asset_config.base_directory.as_deref(),
                ),
                glob_directive: asset_config
                    .glob_directive
                    .clone()
                    .unwrap_or_else(|| config.glob_directive.clone()),
                regex,
                mapper,
                splitter: asset_config.splitter(),
                sampler: asset_config.sampler(),
            };
            assets.insert(name.clone(), asset);
        }

        Ok(Self {
            assets,
            default_regex: config.default_regex.clone(),
            default_mapper,
        })
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Asset names in order.
    pub fn names(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn default_regex(&self) -> &RegexConfig {
        &self.default_regex
    }

    pub fn default_mapper(&self) -> &PatternMapper {
        &self.default_mapper
    }

    /// Effective group names for an asset, or the default group names when
    /// the asset is unknown or not given.
    pub fn group_names_for(&self, asset: Option<&str>) -> &[String] {
        asset
            .and_then(|name| self.assets.get(name))
            .map(Asset::group_names)
            .unwrap_or(&self.default_regex.group_names)
    }
}
