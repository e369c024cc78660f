//! Partitioning: mapping raw references to partition identities, ordering
//! and selecting the resulting batch definitions.
//!
//! - [`PatternMapper`] turns a raw reference into a [`PartitionIdentity`] and back
//! - [`SorterChain`] orders definitions by one or more partition groups
//! - [`PartitionQuery`] filters and picks definitions by predicate, position or count
//!
//! [`PartitionIdentity`]: crate::core::PartitionIdentity

mod pattern;
mod query;
mod sorter;
mod template;

pub use pattern::{
    to_partition_identity, to_raw_reference, EffectiveRegexConfig, PatternMapper, RegexConfig,
    DATA_ASSET_NAME_GROUP, DEFAULT_DATA_ASSET_NAME,
};
pub use query::{CustomFilter, IndexSelector, PartitionQuery};
pub use sorter::{
    reverse_priority_stable_sort, SortOrder, Sorter, SorterChain, SorterConfig, SorterKind,
    DEFAULT_DATETIME_FORMAT,
};
pub use template::{ReferenceTemplate, TemplateSegment};
