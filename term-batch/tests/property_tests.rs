//! Property-based tests for pattern mapping, sorting and partition queries.
//!
//! ## Test Categories
//!
//! ### 1. Round trip
//! - Any reference matched by a pattern renders back to itself when the
//!   pattern has no wildcards outside its groups
//!
//! ### 2. Sorter chain
//! - Sorting is a permutation of its input
//! - The first sorter decides the order; later sorters only break ties
//!
//! ### 3. Partition queries
//! - Slices agree with a direct computation of `start:stop:step` semantics
//! - Limits never return more than requested

use proptest::prelude::*;
use term_batch::core::{BatchDefinition, PartitionIdentity};
use term_batch::partition::{
    EffectiveRegexConfig, PartitionQuery, PatternMapper, SortOrder, SorterChain, SorterConfig,
};

fn mapper(pattern: &str, names: &[&str]) -> PatternMapper {
    PatternMapper::new(&EffectiveRegexConfig {
        pattern: pattern.to_string(),
        group_names: names.iter().map(|s| s.to_string()).collect(),
    })
    .unwrap()
}

fn definition(a: u32, b: u32) -> BatchDefinition {
    BatchDefinition::new(
        "env",
        "conn",
        "asset",
        PartitionIdentity::new()
            .with("a", a.to_string())
            .with("b", b.to_string()),
    )
}

fn key(definition: &BatchDefinition, field: &str) -> u32 {
    definition
        .partition_identity
        .get(field)
        .unwrap()
        .to_string()
        .parse()
        .unwrap()
}

/// Reference slice selection over `0..len`.
fn reference_slice(len: usize, start: Option<isize>, stop: Option<isize>, step: isize) -> Vec<usize> {
    let len = len as isize;
    let clamp = |value: Option<isize>, default: isize, low: isize, high: isize| match value {
        None => default,
        Some(v) if v < 0 => (v + len).max(low),
        Some(v) => v.min(high),
    };

    let mut result = Vec::new();
    if step > 0 {
        let start = clamp(start, 0, 0, len);
        let stop = clamp(stop, len, 0, len);
        let mut i = start;
        while i < stop {
            result.push(i as usize);
            i += step;
        }
    } else {
        let start = clamp(start, len - 1, -1, len - 1);
        let stop = clamp(stop, -1, -1, len - 1);
        let mut i = start;
        while i > stop {
            result.push(i as usize);
            i += step;
        }
    }
    result
}

proptest! {
    #[test]
    fn prop_reference_round_trip(
        name in "[a-z]{1,12}",
        year in 1990u32..2100,
        month in 1u32..13,
    ) {
        let m = mapper(r"(\w+)_(\d{4})-(\d{2})\.csv", &["name", "year", "month"]);
        let reference = format!("{name}_{year}-{month:02}.csv");

        let identity = m.to_partition_identity(&reference).unwrap();
        prop_assert_eq!(identity.get("year").unwrap().to_string(), year.to_string());
        prop_assert_eq!(m.to_raw_reference(&identity).unwrap(), reference);
    }

    #[test]
    fn prop_nested_directory_round_trip(
        parts in prop::collection::vec("[A-Za-z0-9]{1,8}", 3),
    ) {
        let m = mapper(r"([^/]+)/([^/]+)/([^/]+)\.parquet", &["x", "y", "z"]);
        let reference = format!("{}/{}/{}.parquet", parts[0], parts[1], parts[2]);

        let identity = m.to_partition_identity(&reference).unwrap();
        prop_assert_eq!(m.to_raw_reference(&identity).unwrap(), reference);
    }

    #[test]
    fn prop_sort_is_permutation_with_priority(
        pairs in prop::collection::vec((0u32..5, 0u32..5), 0..30),
    ) {
        let definitions: Vec<_> = pairs.iter().map(|(a, b)| definition(*a, *b)).collect();
        let chain = SorterChain::new(vec![
            SorterConfig::numeric("a", SortOrder::Descending),
            SorterConfig::numeric("b", SortOrder::Ascending),
        ])
        .unwrap();

        let sorted = chain.sort(definitions.clone()).unwrap();
        prop_assert_eq!(sorted.len(), definitions.len());
        for definition in &definitions {
            prop_assert!(sorted.contains(definition));
        }

        for window in sorted.windows(2) {
            let (a0, b0) = (key(&window[0], "a"), key(&window[0], "b"));
            let (a1, b1) = (key(&window[1], "a"), key(&window[1], "b"));
            prop_assert!(a0 > a1 || (a0 == a1 && b0 <= b1));
        }
    }

    #[test]
    fn prop_slice_matches_reference(
        len in 0usize..20,
        start in prop::option::of(-25isize..25),
        stop in prop::option::of(-25isize..25),
        step in prop::sample::select(vec![-3isize, -2, -1, 1, 2, 3]),
    ) {
        let definitions: Vec<_> = (0..len as u32).map(|i| definition(i, 0)).collect();
        let selected = PartitionQuery::new()
            .with_slice(start, stop, Some(step))
            .select(&definitions);

        let expected: Vec<_> = reference_slice(len, start, stop, step)
            .into_iter()
            .map(|i| definitions[i].clone())
            .collect();
        prop_assert_eq!(selected, expected);
    }

    #[test]
    fn prop_limit_caps_result(len in 0usize..20, limit in 0usize..25) {
        let definitions: Vec<_> = (0..len as u32).map(|i| definition(i, 0)).collect();
        let selected = PartitionQuery::new().with_limit(limit).select(&definitions);

        prop_assert_eq!(selected.len(), len.min(limit));
        prop_assert_eq!(&selected[..], &definitions[..selected.len()]);
    }
}
