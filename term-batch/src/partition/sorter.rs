//! Multi-key ordering of batch definitions.
//!
//! Sorters are bound to a partition group. A [`SorterChain`] orders
//! definitions by applying stable sorts from the last declared sorter to the
//! first, so the first declared sorter has the highest priority.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::core::BatchDefinition;
use crate::error::{Result, TermError};

/// Default format used by [`SorterKind::DateTimeSorter`].
pub const DEFAULT_DATETIME_FORMAT: &str = "%Y%m%d";

/// Sort direction for a sorter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest key first.
    #[default]
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    /// Largest key first.
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

/// How a sorter turns a partition value into a sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum SorterKind {
    /// Plain string order.
    LexicographicSorter,
    /// Values parsed as floating point numbers.
    NumericSorter,
    /// Values parsed with a chrono format string.
    DateTimeSorter {
        #[serde(default = "default_datetime_format")]
        datetime_format: String,
    },
    /// Position of the value in a fixed reference list.
    CustomListSorter { reference_list: Vec<String> },
}

fn default_datetime_format() -> String {
    DEFAULT_DATETIME_FORMAT.to_string()
}

/// Declarative sorter configuration.
///
/// # Examples
///
/// ```
/// use term_batch::partition::{SortOrder, SorterConfig, SorterKind};
///
/// let config: SorterConfig = serde_json::from_str(
///     r#"{"name": "timestamp", "orderby": "desc", "class": "DateTimeSorter"}"#,
/// ).unwrap();
///
/// assert_eq!(config.orderby, SortOrder::Descending);
/// assert_eq!(
///     config.kind,
///     SorterKind::DateTimeSorter { datetime_format: "%Y%m%d".to_string() }
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SorterConfig {
    /// Group name the sorter reads
    pub name: String,
    /// Sort direction
    #[serde(default)]
    pub orderby: SortOrder,
    /// Key extraction strategy
    #[serde(flatten)]
    pub kind: SorterKind,
}

impl SorterConfig {
    pub fn lexicographic(name: impl Into<String>, orderby: SortOrder) -> Self {
        Self {
            name: name.into(),
            orderby,
            kind: SorterKind::LexicographicSorter,
        }
    }

    pub fn numeric(name: impl Into<String>, orderby: SortOrder) -> Self {
        Self {
            name: name.into(),
            orderby,
            kind: SorterKind::NumericSorter,
        }
    }

    pub fn datetime(
        name: impl Into<String>,
        orderby: SortOrder,
        datetime_format: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            orderby,
            kind: SorterKind::DateTimeSorter {
                datetime_format: datetime_format.into(),
            },
        }
    }

    pub fn custom_list<I, S>(name: impl Into<String>, orderby: SortOrder, reference_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            orderby,
            kind: SorterKind::CustomListSorter {
                reference_list: reference_list.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// Comparable key computed by a sorter for one definition.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
    Position(usize),
}

impl SortKey {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::DateTime(a), Self::DateTime(b)) => a.cmp(b),
            (Self::Position(a), Self::Position(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Text(_) => 0,
            Self::Number(_) => 1,
            Self::DateTime(_) => 2,
            Self::Position(_) => 3,
        }
    }
}

/// A validated sorter.
#[derive(Debug, Clone)]
pub struct Sorter {
    config: SorterConfig,
}

impl Sorter {
    /// Validates a sorter configuration.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for an empty group name, an empty
    /// date-time format or an empty custom reference list.
    pub fn new(config: SorterConfig) -> Result<Self> {
        if config.name.is_empty() {
            return Err(TermError::Configuration(
                "Sorter group name cannot be empty".to_string(),
            ));
        }
        match &config.kind {
            SorterKind::DateTimeSorter { datetime_format } if datetime_format.is_empty() => {
                return Err(TermError::Configuration(format!(
                    "DateTimeSorter '{}' requires a non-empty datetime_format",
                    config.name
                )));
            }
            SorterKind::CustomListSorter { reference_list } if reference_list.is_empty() => {
                return Err(TermError::Configuration(format!(
                    "CustomListSorter '{}' requires a non-empty reference_list",
                    config.name
                )));
            }
            _ => {}
        }
        Ok(Self { config })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn order(&self) -> SortOrder {
        self.config.orderby
    }

    pub fn config(&self) -> &SorterConfig {
        &self.config
    }

    fn sort_key(&self, definition: &BatchDefinition) -> Result<SortKey> {
        let name = &self.config.name;
        let value = definition.partition_identity.get(name).ok_or_else(|| {
            TermError::sorter(
                name,
                format!(
                    "batch definition for asset '{}' has no value for group '{name}'",
                    definition.data_asset_name
                ),
            )
        })?;
        let text = value.as_text();

        match &self.config.kind {
            SorterKind::LexicographicSorter => Ok(SortKey::Text(text.into_owned())),
            SorterKind::NumericSorter => text
                .trim()
                .parse::<f64>()
                .map(SortKey::Number)
                .map_err(|_| TermError::sorter(name, format!("'{text}' is not numeric"))),
            SorterKind::DateTimeSorter { datetime_format } => {
                parse_datetime(&text, datetime_format)
                    .map(SortKey::DateTime)
                    .ok_or_else(|| {
                        TermError::sorter(
                            name,
                            format!("'{text}' does not match date-time format '{datetime_format}'"),
                        )
                    })
            }
            SorterKind::CustomListSorter { reference_list } => reference_list
                .iter()
                .position(|candidate| candidate.as_str() == &*text)
                .map(SortKey::Position)
                .ok_or_else(|| {
                    TermError::sorter(name, format!("'{text}' is not in the reference list"))
                }),
        }
    }
}

fn parse_datetime(value: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, format).ok().or_else(|| {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// An ordered list of sorters, highest priority first.
///
/// # Examples
///
/// ```
/// use term_batch::core::{BatchDefinition, PartitionIdentity};
/// use term_batch::partition::{SortOrder, SorterChain, SorterConfig};
///
/// let chain = SorterChain::new(vec![
///     SorterConfig::numeric("id", SortOrder::Descending),
/// ]).unwrap();
///
/// let defs: Vec<_> = ["1", "10", "2"]
///     .iter()
///     .map(|id| BatchDefinition::new("env", "conn", "asset", PartitionIdentity::new().with("id", *id)))
///     .collect();
///
/// let sorted = chain.sort(defs).unwrap();
/// let ids: Vec<_> = sorted.iter().map(|d| d.partition_identity.get("id").unwrap().to_string()).collect();
/// assert_eq!(ids, vec!["10", "2", "1"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SorterChain {
    sorters: Vec<Sorter>,
}

impl SorterChain {
    /// Validates each sorter configuration and builds the chain.
    pub fn new(configs: Vec<SorterConfig>) -> Result<Self> {
        let sorters = configs
            .into_iter()
            .map(Sorter::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sorters })
    }

    pub fn is_empty(&self) -> bool {
        self.sorters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sorters.len()
    }

    pub fn sorters(&self) -> &[Sorter] {
        &self.sorters
    }

    /// Checks that the chain can sort definitions produced with `group_names`.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if there are more sorters than group
    /// names or a sorter refers to a group that does not exist.
    pub fn validate_against(&self, group_names: &[String]) -> Result<()> {
        if self.sorters.len() > group_names.len() {
            return Err(TermError::Configuration(format!(
                "{} sorters were configured but the pattern only has {} group names {:?}",
                self.sorters.len(),
                group_names.len(),
                group_names
            )));
        }

        let unknown: Vec<&str> = self
            .sorters
            .iter()
            .map(Sorter::name)
            .filter(|name| !group_names.iter().any(|g| g == name))
            .collect();
        if !unknown.is_empty() {
            return Err(TermError::Configuration(format!(
                "Sorters {unknown:?} do not appear among the configured group names {group_names:?}"
            )));
        }

        Ok(())
    }

    /// Orders definitions by every sorter in the chain.
    ///
    /// # Errors
    ///
    /// Returns a `Sorter` error if a key cannot be computed for a definition.
    pub fn sort(&self, definitions: Vec<BatchDefinition>) -> Result<Vec<BatchDefinition>> {
        reverse_priority_stable_sort(definitions, &self.sorters)
    }
}

/// Applies one stable sort per sorter, from the lowest priority sorter to the
/// highest.
///
/// Because every pass is stable, ties under a higher priority sorter keep the
/// order established by the lower priority passes.
pub fn reverse_priority_stable_sort(
    definitions: Vec<BatchDefinition>,
    sorters: &[Sorter],
) -> Result<Vec<BatchDefinition>> {
    let mut definitions = definitions;
    for sorter in sorters.iter().rev() {
        debug!(sorter = %sorter.name(), order = ?sorter.order(), "Applying sorter");

        let mut keyed = definitions
            .into_iter()
            .map(|d| sorter.sort_key(&d).map(|key| (key, d)))
            .collect::<Result<Vec<_>>>()?;

        match sorter.order() {
            SortOrder::Ascending => keyed.sort_by(|a, b| a.0.compare(&b.0)),
            SortOrder::Descending => keyed.sort_by(|a, b| b.0.compare(&a.0)),
        }

        definitions = keyed.into_iter().map(|(_, d)| d).collect();
    }
    Ok(definitions)
}
