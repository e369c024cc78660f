//! Integration tests for the configured-asset filesystem data connector.

use async_trait::async_trait;
use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use term_batch::connector::{
    AssetConfig, ConfiguredAssetFilesystemDataConnector, DataConnector, DataConnectorConfig,
};
use term_batch::core::{BatchDefinition, BatchDirective, BatchRequest, PartitionIdentity};
use term_batch::engine::DataFusionExecutionEngine;
use term_batch::error::{Result, TermError};
use term_batch::partition::{PartitionQuery, RegexConfig, SortOrder, SorterConfig};
use term_batch::store::{InMemoryLister, ReferenceLister};

fn write_csv(path: &Path, rows: &[(i64, &str)]) {
    let mut file = File::create(path).unwrap();
    writeln!(file, "id,vendor").unwrap();
    for (id, vendor) in rows {
        writeln!(file, "{id},{vendor}").unwrap();
    }
    file.flush().unwrap();
}

/// Creates `A/A-100.csv`, `A/A-101.csv`, `A/notes.txt` and `B/B-200.csv`.
fn create_store() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("A")).unwrap();
    fs::create_dir(dir.path().join("B")).unwrap();

    write_csv(&dir.path().join("A/A-100.csv"), &[(1, "x"), (2, "y")]);
    write_csv(&dir.path().join("A/A-101.csv"), &[(3, "x"), (4, "y"), (5, "z")]);
    fs::write(dir.path().join("A/notes.txt"), "not data").unwrap();
    write_csv(&dir.path().join("B/B-200.csv"), &[(6, "x")]);
    dir
}

fn config(base: &Path) -> DataConnectorConfig {
    DataConnectorConfig::new(
        "my_connector",
        "my_env",
        base,
        RegexConfig::new(r"^(?P<name>[A-Z])-(?P<id>\d+)\.csv$", ["name", "id"]),
    )
    .with_asset("A", AssetConfig::new().with_base_directory("A"))
    .with_asset("B", AssetConfig::new().with_base_directory("B"))
}

fn ids(definitions: &[BatchDefinition]) -> Vec<String> {
    definitions
        .iter()
        .map(|d| d.partition_identity.get("id").unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_end_to_end_asset_resolution() {
    let store = create_store();
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config(store.path())).unwrap();

    let definitions = connector
        .get_batch_definitions(&BatchRequest::for_asset("A"))
        .await
        .unwrap();

    assert_eq!(
        definitions
            .iter()
            .map(|d| d.partition_identity.clone())
            .collect::<Vec<_>>(),
        vec![
            PartitionIdentity::new().with("name", "A").with("id", "100"),
            PartitionIdentity::new().with("name", "A").with("id", "101"),
        ]
    );
    for definition in &definitions {
        assert_eq!(definition.data_asset_name, "A");
        assert_eq!(definition.data_connector_name, "my_connector");
        assert_eq!(definition.execution_environment_name, "my_env");
    }

    let spec = connector.build_batch_spec(&definitions[1]).await.unwrap();
    assert_eq!(spec.path_ref(), Some(store.path().join("A/A-101.csv").as_path()));
}

#[tokio::test]
async fn test_unmatched_references_are_reported_not_raised() {
    let store = create_store();
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config(store.path())).unwrap();
    connector.refresh().await.unwrap();

    assert_eq!(connector.get_reference_count().await.unwrap(), 4);
    assert_eq!(
        connector.get_unmatched_references().await.unwrap(),
        vec!["notes.txt".to_string()]
    );
    assert_eq!(
        connector.get_unmatched_references_for("B").await.unwrap(),
        Vec::<String>::new()
    );
}

#[tokio::test]
async fn test_refresh_is_idempotent() {
    let store = create_store();
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config(store.path())).unwrap();
    let request = BatchRequest::new();

    connector.refresh().await.unwrap();
    let first = connector.get_batch_definitions(&request).await.unwrap();
    connector.refresh().await.unwrap();
    let second = connector.get_batch_definitions(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(ids(&first), vec!["100", "101", "200"]);
}

#[tokio::test]
async fn test_refresh_picks_up_new_files() {
    let store = create_store();
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config(store.path())).unwrap();
    let request = BatchRequest::for_asset("A");

    assert_eq!(connector.get_batch_definitions(&request).await.unwrap().len(), 2);

    write_csv(&store.path().join("A/A-102.csv"), &[(7, "x")]);
    assert_eq!(connector.get_batch_definitions(&request).await.unwrap().len(), 2);

    connector.refresh().await.unwrap();
    assert_eq!(connector.get_batch_definitions(&request).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_invalid_sorter_fails_before_storage_access() {
    let lister = Arc::new(InMemoryLister::poisoned());
    let config = config(Path::new("/data")).with_sorter(SorterConfig::numeric("timestamp", SortOrder::Ascending));

    let err = ConfiguredAssetFilesystemDataConnector::from_config_with_lister(config, lister.clone())
        .unwrap_err();

    assert!(matches!(err, TermError::Configuration(_)));
    assert_eq!(lister.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_request_fails_before_storage_access() {
    let lister = Arc::new(InMemoryLister::poisoned());
    let connector =
        ConfiguredAssetFilesystemDataConnector::from_config_with_lister(config(Path::new("/data")), lister.clone())
            .unwrap();

    let unknown_asset = connector
        .get_batch_definitions(&BatchRequest::for_asset("C"))
        .await
        .unwrap_err();
    assert!(matches!(unknown_asset, TermError::InvalidRequest(_)));

    let both = BatchRequest::for_asset("A")
        .with_partition_query(PartitionQuery::new().with_position(0).with_limit(1));
    let err = connector.get_batch_definitions(&both).await.unwrap_err();
    assert!(matches!(err, TermError::InvalidRequest(_)));

    assert_eq!(lister.call_count(), 0);

    let err = connector
        .get_batch_definitions(&BatchRequest::for_asset("A"))
        .await
        .unwrap_err();
    assert!(matches!(err, TermError::StoreUnavailable { .. }));
    assert!(lister.call_count() > 0);
}

#[tokio::test]
async fn test_sorter_precedence() {
    let lister = InMemoryLister::new().with_directory(
        "/data/A",
        ["1-2.csv", "1-1.csv", "2-5.csv"],
    );
    let config = DataConnectorConfig::new(
        "my_connector",
        "my_env",
        "/data",
        RegexConfig::new(r"(\d+)-(\d+)\.csv", ["a", "b"]),
    )
    .with_asset("A", AssetConfig::new().with_base_directory("A"))
    .with_sorter(SorterConfig::numeric("a", SortOrder::Descending))
    .with_sorter(SorterConfig::numeric("b", SortOrder::Ascending));

    let connector =
        ConfiguredAssetFilesystemDataConnector::from_config_with_lister(config, Arc::new(lister)).unwrap();
    let definitions = connector
        .get_batch_definitions(&BatchRequest::for_asset("A"))
        .await
        .unwrap();

    let order: Vec<(String, String)> = definitions
        .iter()
        .map(|d| {
            (
                d.partition_identity.get("a").unwrap().to_string(),
                d.partition_identity.get("b").unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![
            ("2".to_string(), "5".to_string()),
            ("1".to_string(), "1".to_string()),
            ("1".to_string(), "2".to_string()),
        ]
    );
}

async fn select_ids(
    connector: &ConfiguredAssetFilesystemDataConnector,
    query: PartitionQuery,
) -> Vec<String> {
    let request = BatchRequest::for_asset("A").with_partition_query(query);
    ids(&connector.get_batch_definitions(&request).await.unwrap())
}

#[tokio::test]
async fn test_partition_query_selection() {
    let names: Vec<String> = (0..10).map(|i| format!("A-{i:03}.csv")).collect();
    let lister = InMemoryLister::new()
        .with_directory("/data/A", names)
        .with_directory("/data/B", std::iter::empty::<&str>());
    let connector = ConfiguredAssetFilesystemDataConnector::from_config_with_lister(
        config(Path::new("/data")),
        Arc::new(lister),
    )
    .unwrap();

    assert_eq!(
        select_ids(&connector, PartitionQuery::new().with_position(-1)).await,
        vec!["009"]
    );
    assert!(select_ids(&connector, PartitionQuery::new().with_position(42))
        .await
        .is_empty());
    assert_eq!(
        select_ids(
            &connector,
            PartitionQuery::new().with_slice(Some(2), Some(8), Some(3))
        )
        .await,
        vec!["002", "005"]
    );
    assert_eq!(
        select_ids(&connector, PartitionQuery::new().with_slice(None, None, Some(-4))).await,
        vec!["009", "005", "001"]
    );
    assert_eq!(
        select_ids(&connector, PartitionQuery::new().with_limit(2)).await,
        vec!["000", "001"]
    );
    assert_eq!(
        select_ids(
            &connector,
            PartitionQuery::new()
                .with_partition_identifiers(PartitionIdentity::new().with("id", "004"))
        )
        .await,
        vec!["004"]
    );

    // A custom filter takes priority over partition identifiers.
    let query = PartitionQuery::new()
        .with_partition_identifiers(PartitionIdentity::new().with("id", "004"))
        .with_custom_filter(|identity| {
            identity
                .get("id")
                .is_some_and(|v| v.to_string().ends_with('7'))
        });
    assert_eq!(select_ids(&connector, query).await, vec!["007"]);
}

#[tokio::test]
async fn test_request_identifiers_filter_definitions() {
    let store = create_store();
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config(store.path())).unwrap();

    let request = BatchRequest::new().with_partition_identifier("id", "200");
    let definitions = connector.get_batch_definitions(&request).await.unwrap();

    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].data_asset_name, "B");
}

#[tokio::test]
async fn test_integer_identifiers_match_captured_text() {
    let names: Vec<String> = (1..=5).map(|i| format!("A-{i}.csv")).collect();
    let lister = InMemoryLister::new()
        .with_directory("/data/A", names)
        .with_directory("/data/B", std::iter::empty::<&str>());
    let connector = ConfiguredAssetFilesystemDataConnector::from_config_with_lister(
        config(Path::new("/data")),
        Arc::new(lister),
    )
    .unwrap();

    let query = PartitionQuery::from_json(&json!({"partition_identifiers": {"id": 3}})).unwrap();
    assert_eq!(select_ids(&connector, query).await, vec!["3"]);

    let request = BatchRequest::for_asset("A").with_partition_identifier("id", 3i64);
    let definitions = connector.get_batch_definitions(&request).await.unwrap();
    assert_eq!(ids(&definitions), vec!["3"]);

    let spec = connector.build_batch_spec(&definitions[0]).await.unwrap();
    assert_eq!(spec.path_ref(), Some(Path::new("/data/A/A-3.csv")));
}

#[tokio::test]
async fn test_missing_asset_directory() {
    let store = create_store();
    let strict = config(store.path()).with_asset("C", AssetConfig::new().with_base_directory("C"));
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(strict.clone()).unwrap();
    assert!(matches!(
        connector.refresh().await,
        Err(TermError::StoreUnavailable { .. })
    ));

    let tolerant = ConfiguredAssetFilesystemDataConnector::from_config(
        strict.with_tolerate_missing_directories(true),
    )
    .unwrap();
    tolerant.refresh().await.unwrap();
    assert!(tolerant
        .get_batch_definitions(&BatchRequest::for_asset("C"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_config_from_json() {
    let store = create_store();
    let json = serde_json::json!({
        "name": "my_connector",
        "execution_environment_name": "my_env",
        "base_directory": store.path(),
        "default_regex": { "pattern": r"(.+)-(\d+)\.csv", "group_names": ["name", "id"] },
        "assets": {
            "A": {
                "base_directory": "A",
                "sampling_method": "sample_using_limit",
                "sampling_kwargs": { "n": 1 }
            }
        },
        "sorters": [ { "name": "id", "orderby": "desc", "class": "NumericSorter" } ]
    });

    let config = DataConnectorConfig::from_value(json).unwrap();
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config).unwrap();
    let definitions = connector
        .get_batch_definitions(&BatchRequest::for_asset("A"))
        .await
        .unwrap();
    assert_eq!(ids(&definitions), vec!["101", "100"]);

    let spec = connector.build_batch_spec(&definitions[0]).await.unwrap();
    assert_eq!(spec.sampling_method(), Some("sample_using_limit"));
}

#[tokio::test]
async fn test_self_check_with_engine() {
    let store = create_store();
    let config = config(store.path()).with_asset(
        "A",
        AssetConfig::new()
            .with_base_directory("A")
            .with_splitter(BatchDirective::new("split_on_whole_table")),
    );
    let connector = ConfiguredAssetFilesystemDataConnector::from_config(config).unwrap();
    let engine = DataFusionExecutionEngine::new();

    let report = connector.self_check_with_engine(&engine).await.unwrap();

    assert_eq!(report.class_name, "ConfiguredAssetFilesystemDataConnector");
    assert_eq!(report.data_asset_count, 2);
    assert_eq!(report.example_data_asset_names, vec!["A", "B"]);
    assert_eq!(report.data_assets["A"].batch_definition_count, 2);
    assert_eq!(
        report.data_assets["A"].example_data_references,
        vec!["A-100.csv", "A-101.csv"]
    );
    assert_eq!(report.unmatched_data_reference_count, 1);
    assert_eq!(report.example_unmatched_data_references, vec!["notes.txt"]);

    let example = report.example_data_reference.unwrap();
    assert_eq!(example.n_rows, 2);
    assert_eq!(example.batch_spec["splitter_method"], "split_on_whole_table");
}

/// Lists a replaceable manifest for asset `A`, sleeping before every listing.
#[derive(Debug)]
struct ChangingLister {
    names: Mutex<Vec<String>>,
    delay: Duration,
}

impl ChangingLister {
    fn new(names: &[&str], delay: Duration) -> Self {
        Self {
            names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            delay,
        }
    }

    fn replace(&self, names: &[&str]) {
        *self.names.lock().unwrap() = names.iter().map(|n| n.to_string()).collect();
    }

    fn current(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReferenceLister for ChangingLister {
    async fn list_one_level(&self, base: &Path, _glob_directive: &str) -> Result<Option<Vec<String>>> {
        let names = if base.ends_with("A") {
            self.current()
        } else {
            Vec::new()
        };
        tokio::time::sleep(self.delay).await;
        Ok(Some(names))
    }

    fn description(&self) -> String {
        "changing manifest".to_string()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_see_whole_snapshots_during_refresh() {
    let lister = Arc::new(ChangingLister::new(
        &["A-1.csv", "A-2.csv"],
        Duration::from_millis(100),
    ));
    let connector = Arc::new(
        ConfiguredAssetFilesystemDataConnector::from_config_with_lister(
            config(Path::new("/data")),
            lister.clone(),
        )
        .unwrap(),
    );

    connector.refresh().await.unwrap();
    let old = ids(&connector.get_batch_definitions(&BatchRequest::new()).await.unwrap());
    assert_eq!(old, vec!["1", "2"]);

    lister.replace(&["A-1.csv", "A-2.csv", "A-3.csv", "A-4.csv"]);
    let new: Vec<String> = ["1", "2", "3", "4"].iter().map(|s| s.to_string()).collect();

    let refresh = tokio::spawn({
        let connector = Arc::clone(&connector);
        async move { connector.refresh().await }
    });

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let connector = Arc::clone(&connector);
            tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..30 {
                    let definitions = connector
                        .get_batch_definitions(&BatchRequest::new())
                        .await
                        .unwrap();
                    let count = connector.get_reference_count().await.unwrap();
                    seen.push((ids(&definitions), count));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                seen
            })
        })
        .collect();

    for reader in readers {
        for (seen, count) in reader.await.unwrap() {
            assert!(seen == old || seen == new, "partial snapshot observed: {seen:?}");
            assert!(count == 2 || count == 4);
        }
    }

    refresh.await.unwrap().unwrap();
    assert_eq!(
        ids(&connector.get_batch_definitions(&BatchRequest::new()).await.unwrap()),
        new
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_first_use_agrees() {
    let lister = Arc::new(ChangingLister::new(
        &["A-1.csv", "A-2.csv"],
        Duration::from_millis(50),
    ));
    let connector = Arc::new(
        ConfiguredAssetFilesystemDataConnector::from_config_with_lister(
            config(Path::new("/data")),
            lister,
        )
        .unwrap(),
    );

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let connector = Arc::clone(&connector);
            tokio::spawn(async move {
                connector
                    .get_batch_definitions(&BatchRequest::new())
                    .await
                    .unwrap()
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(ids(&task.await.unwrap()), vec!["1", "2"]);
    }
    assert_eq!(connector.get_reference_count().await.unwrap(), 2);
}
