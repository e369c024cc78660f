//! Benchmarks for batch resolution.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use term_batch::connector::{
    AssetConfig, ConfiguredAssetFilesystemDataConnector, DataConnector, DataConnectorConfig,
};
use term_batch::core::{BatchDefinition, BatchRequest, PartitionIdentity};
use term_batch::partition::{
    EffectiveRegexConfig, PartitionQuery, PatternMapper, RegexConfig, SortOrder, SorterChain,
    SorterConfig,
};
use term_batch::store::InMemoryLister;
use tokio::runtime::Runtime;

fn references(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("trips_{}-{:02}_{i}.csv", 2000 + i % 25, i % 12 + 1))
        .collect()
}

fn connector(count: usize) -> ConfiguredAssetFilesystemDataConnector {
    let lister = InMemoryLister::new().with_directory("/data/trips", references(count));
    let config = DataConnectorConfig::new(
        "bench_connector",
        "bench_env",
        "/data",
        RegexConfig::new(
            r"(\w+?)_(\d{4})-(\d{2})_(\d+)\.csv",
            ["name", "year", "month", "seq"],
        ),
    )
    .with_asset("trips", AssetConfig::new().with_base_directory("trips"))
    .with_sorter(SorterConfig::numeric("year", SortOrder::Descending))
    .with_sorter(SorterConfig::numeric("month", SortOrder::Descending))
    .with_sorter(SorterConfig::numeric("seq", SortOrder::Ascending));

    ConfiguredAssetFilesystemDataConnector::from_config_with_lister(config, Arc::new(lister))
        .unwrap()
}

fn benchmark_pattern_mapping(c: &mut Criterion) {
    let mapper = PatternMapper::new(&EffectiveRegexConfig {
        pattern: r"(\w+?)_(\d{4})-(\d{2})_(\d+)\.csv".to_string(),
        group_names: ["name", "year", "month", "seq"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    })
    .unwrap();
    let refs = references(1000);

    c.bench_function("map_1000_references", |b| {
        b.iter(|| {
            for reference in &refs {
                let identity = mapper.to_partition_identity(black_box(reference)).unwrap();
                black_box(mapper.to_raw_reference(&identity).unwrap());
            }
        })
    });
}

fn benchmark_sorting(c: &mut Criterion) {
    let chain = SorterChain::new(vec![
        SorterConfig::numeric("year", SortOrder::Descending),
        SorterConfig::lexicographic("name", SortOrder::Ascending),
    ])
    .unwrap();

    let mut group = c.benchmark_group("sorter_chain");
    for count in [100, 1000, 10000] {
        let definitions: Vec<BatchDefinition> = (0..count)
            .map(|i| {
                BatchDefinition::new(
                    "env",
                    "conn",
                    "asset",
                    PartitionIdentity::new()
                        .with("name", format!("n{}", i % 97))
                        .with("year", (2000 + i % 25).to_string()),
                )
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(count), &definitions, |b, defs| {
            b.iter(|| black_box(chain.sort(defs.clone()).unwrap()))
        });
    }
    group.finish();
}

fn benchmark_resolution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("batch_resolution");
    for count in [100, 1000, 10000] {
        group.bench_function(format!("refresh_{count}_references"), |b| {
            let connector = connector(count);
            b.iter(|| rt.block_on(async { connector.refresh().await.unwrap() }))
        });

        group.bench_function(format!("cached_request_{count}_references"), |b| {
            let connector = connector(count);
            let request = BatchRequest::for_asset("trips")
                .with_partition_query(PartitionQuery::new().with_slice(None, Some(10), None));
            rt.block_on(async { connector.refresh().await.unwrap() });
            b.iter(|| {
                rt.block_on(async {
                    black_box(connector.get_batch_definitions(&request).await.unwrap())
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_pattern_mapping,
    benchmark_sorting,
    benchmark_resolution
);
criterion_main!(benches);
