//! Mapping between raw references and partition identities.
//!
//! The forward direction applies a regex to a raw reference and zips the
//! captured groups with the configured group names. The reverse direction
//! substitutes a partition identity into a [`ReferenceTemplate`] derived from
//! the same regex.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::{BatchDefinition, PartitionIdentity};
use crate::error::{Result, TermError};

use super::ReferenceTemplate;

/// Group name that, when present, carries the data asset name instead of a partition value.
pub const DATA_ASSET_NAME_GROUP: &str = "data_asset_name";

/// Asset name used when a reference is mapped without any asset name.
pub const DEFAULT_DATA_ASSET_NAME: &str = "DEFAULT_ASSET_NAME";

/// A regex pattern and the names of its capture groups, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexConfig {
    pub pattern: String,
    #[serde(default)]
    pub group_names: Vec<String>,
}

impl RegexConfig {
    /// Creates a new regex configuration.
    pub fn new<I, S>(pattern: impl Into<String>, group_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pattern: pattern.into(),
            group_names: group_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// The regex configuration in force for one asset.
///
/// Computed by [`EffectiveRegexConfig::resolve`]: each field set on the asset
/// wins, otherwise the connector default is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRegexConfig {
    pub pattern: String,
    pub group_names: Vec<String>,
}

impl EffectiveRegexConfig {
    /// Merges asset-level overrides into the connector default.
    ///
    /// # Examples
    ///
    /// ```
    /// use term_batch::partition::{EffectiveRegexConfig, RegexConfig};
    ///
    /// let default = RegexConfig::new(r"(.+)_(\d+)\.csv", ["name", "id"]);
    /// let effective = EffectiveRegexConfig::resolve(&default, Some(r"(\d+)\.csv"), None);
    ///
    /// assert_eq!(effective.pattern, r"(\d+)\.csv");
    /// assert_eq!(effective.group_names, vec!["name", "id"]);
    /// ```
    pub fn resolve(
        default: &RegexConfig,
        pattern: Option<&str>,
        group_names: Option<&[String]>,
    ) -> Self {
        Self {
            pattern: pattern.unwrap_or(&default.pattern).to_string(),
            group_names: group_names
                .map(<[String]>::to_vec)
                .unwrap_or_else(|| default.group_names.clone()),
        }
    }
}

impl From<&RegexConfig> for EffectiveRegexConfig {
    fn from(config: &RegexConfig) -> Self {
        Self {
            pattern: config.pattern.clone(),
            group_names: config.group_names.clone(),
        }
    }
}

/// Compiled, validated pattern mapper for one effective regex configuration.
#[derive(Debug, Clone)]
pub struct PatternMapper {
    regex: Regex,
    group_names: Vec<String>,
    template: ReferenceTemplate,
}

impl PatternMapper {
    /// Compiles and validates an effective regex configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the pattern does not compile or if
    /// its number of capture groups differs from the number of group names.
    pub fn new(config: &EffectiveRegexConfig) -> Result<Self> {
        let regex = Regex::new(&config.pattern).map_err(|e| {
            TermError::Configuration(format!("Invalid regex pattern '{}': {e}", config.pattern))
        })?;

        let captures = regex.captures_len() - 1;
        if captures != config.group_names.len() {
            return Err(TermError::Configuration(format!(
                "Regex pattern '{}' has {captures} capture groups but {} group names were configured",
                config.pattern,
                config.group_names.len()
            )));
        }

        let template = ReferenceTemplate::from_regex(&config.pattern, &config.group_names)?;

        Ok(Self {
            regex,
            group_names: config.group_names.clone(),
            template,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn group_names(&self) -> &[String] {
        &self.group_names
    }

    pub fn template(&self) -> &ReferenceTemplate {
        &self.template
    }

    /// Maps a raw reference to a partition identity.
    ///
    /// The match must start at the beginning of the reference but may end
    /// before its end. Groups that did not participate in the match are left
    /// out of the identity. Returns `None` when the reference does not match.
    pub fn to_partition_identity(&self, reference: &str) -> Option<PartitionIdentity> {
        let captures = self.regex.captures(reference)?;
        if captures.get(0).map(|m| m.start()) != Some(0) {
            return None;
        }

        Some(
            self.group_names
                .iter()
                .enumerate()
                .filter_map(|(i, name)| {
                    captures
                        .get(i + 1)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// Renders a partition identity back into a raw reference.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableReference` if a group in the template has no value.
    pub fn to_raw_reference(&self, identity: &PartitionIdentity) -> Result<String> {
        self.template.render(identity)
    }

    /// Maps a raw reference to a batch definition.
    ///
    /// A `data_asset_name` group is removed from the partition identity. Its
    /// value names the asset unless `data_asset_name` is given explicitly.
    pub fn map_reference(
        &self,
        reference: &str,
        execution_environment_name: &str,
        data_connector_name: &str,
        data_asset_name: Option<&str>,
    ) -> Option<BatchDefinition> {
        let mut identity = self.to_partition_identity(reference)?;
        let inferred = identity
            .remove(DATA_ASSET_NAME_GROUP)
            .map(|v| v.as_text().into_owned());

        let asset = match (data_asset_name, inferred) {
            (Some(explicit), _) => explicit.to_string(),
            (None, Some(inferred)) => inferred,
            (None, None) => DEFAULT_DATA_ASSET_NAME.to_string(),
        };

        Some(BatchDefinition::new(
            execution_environment_name,
            data_connector_name,
            asset,
            identity,
        ))
    }

    /// Renders a batch definition back into a raw reference.
    ///
    /// The definition's asset name is substituted for a `data_asset_name` group.
    pub fn map_definition(&self, definition: &BatchDefinition) -> Result<String> {
        if self.group_names.iter().any(|g| g == DATA_ASSET_NAME_GROUP) {
            let identity = definition
                .partition_identity
                .clone()
                .with(DATA_ASSET_NAME_GROUP, definition.data_asset_name.as_str());
            self.to_raw_reference(&identity)
        } else {
            self.to_raw_reference(&definition.partition_identity)
        }
    }
}

/// Maps a raw reference to a partition identity with a one-off pattern.
///
/// # Examples
///
/// ```
/// use term_batch::partition::to_partition_identity;
///
/// let names = vec!["name".to_string(), "id".to_string()];
/// let identity = to_partition_identity("A-100.csv", r"(.+)-(\d+)\.csv", &names)
///     .unwrap()
///     .unwrap();
/// assert_eq!(identity.to_string(), r#"{"name":"A","id":"100"}"#);
///
/// assert!(to_partition_identity("notes.txt", r"(.+)-(\d+)\.csv", &names)
///     .unwrap()
///     .is_none());
/// ```
pub fn to_partition_identity(
    reference: &str,
    pattern: &str,
    group_names: &[String],
) -> Result<Option<PartitionIdentity>> {
    let mapper = PatternMapper::new(&EffectiveRegexConfig {
        pattern: pattern.to_string(),
        group_names: group_names.to_vec(),
    })?;
    Ok(mapper.to_partition_identity(reference))
}

/// Renders a partition identity into a raw reference with a one-off pattern.
pub fn to_raw_reference(
    identity: &PartitionIdentity,
    pattern: &str,
    group_names: &[String],
) -> Result<String> {
    let mapper = PatternMapper::new(&EffectiveRegexConfig {
        pattern: pattern.to_string(),
        group_names: group_names.to_vec(),
    })?;
    mapper.to_raw_reference(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(pattern: &str, names: &[&str]) -> PatternMapper {
        PatternMapper::new(&EffectiveRegexConfig {
            pattern: pattern.to_string(),
            group_names: names.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    #[test]
    fn test_forward_mapping() {
        let m = mapper(r"(.+)-(\d+)\.csv", &["name", "id"]);
        let identity = m.to_partition_identity("A-100.csv").unwrap();
        assert_eq!(identity, PartitionIdentity::new().with("name", "A").with("id", "100"));
        assert!(m.to_partition_identity("README.md").is_none());
    }

    #[test]
    fn test_forward_mapping_is_anchored_at_start_only() {
        let m = mapper(r"(\d+)\.csv", &["id"]);
        assert!(m.to_partition_identity("x100.csv").is_none());
        let identity = m.to_partition_identity("100.csv.bak").unwrap();
        assert_eq!(identity.get("id").map(|v| v.to_string()), Some("100".into()));
    }

    #[test]
    fn test_optional_groups_are_skipped() {
        let m = mapper(r"(\w+?)(?:_(\d+))?\.csv", &["name", "part"]);
        let identity = m.to_partition_identity("sales.csv").unwrap();
        assert_eq!(identity.len(), 1);
        assert!(!identity.contains_key("part"));
    }

    #[test]
    fn test_group_count_mismatch() {
        let err = PatternMapper::new(&EffectiveRegexConfig {
            pattern: r"(.+)-(\d+)\.csv".to_string(),
            group_names: vec!["name".to_string()],
        })
        .unwrap_err();
        assert!(matches!(err, TermError::Configuration(_)));
    }

    #[test]
    fn test_invalid_regex() {
        let err = PatternMapper::new(&EffectiveRegexConfig {
            pattern: r"(unclosed".to_string(),
            group_names: vec!["x".to_string()],
        })
        .unwrap_err();
        assert!(err.to_string().contains("Invalid regex pattern"));
    }

    #[test]
    fn test_round_trip() {
        let m = mapper(r"(\d{4})/(\d{2})/(.+)\.parquet", &["year", "month", "name"]);
        let reference = "2020/01/trips.parquet";
        let identity = m.to_partition_identity(reference).unwrap();
        assert_eq!(m.to_raw_reference(&identity).unwrap(), reference);
    }

    #[test]
    fn test_data_asset_name_group_is_lifted() {
        let m = mapper(r"(.+)_(\d+)\.csv", &["data_asset_name", "id"]);

        let inferred = m.map_reference("alpha_1.csv", "env", "conn", None).unwrap();
        assert_eq!(inferred.data_asset_name, "alpha");
        assert_eq!(inferred.partition_identity, PartitionIdentity::new().with("id", "1"));
        assert_eq!(m.map_definition(&inferred).unwrap(), "alpha_1.csv");

        let configured = m.map_reference("alpha_1.csv", "env", "conn", Some("A")).unwrap();
        assert_eq!(configured.data_asset_name, "A");
    }

    #[test]
    fn test_default_asset_name() {
        let m = mapper(r"(\d+)\.csv", &["id"]);
        let def = m.map_reference("7.csv", "env", "conn", None).unwrap();
        assert_eq!(def.data_asset_name, DEFAULT_DATA_ASSET_NAME);
    }

    #[test]
    fn test_effective_regex_merge() {
        let default = RegexConfig::new(r"(.+)\.csv", ["name"]);
        let names = vec!["id".to_string()];

        let both = EffectiveRegexConfig::resolve(&default, Some(r"(\d+)"), Some(&names));
        assert_eq!(both.pattern, r"(\d+)");
        assert_eq!(both.group_names, names);

        let neither = EffectiveRegexConfig::resolve(&default, None, None);
        assert_eq!(neither, EffectiveRegexConfig::from(&default));
    }
}
