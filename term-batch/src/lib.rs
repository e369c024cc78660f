//! # Term Batch - Batch discovery and partitioning for Rust
//!
//! Term Batch turns a directory of data files into addressable, ordered
//! batches. Each file name (a *data reference*) is matched against a regular
//! expression whose capture groups become the batch's *partition identity*;
//! requests then select, filter, slice and sort those batches and resolve
//! one of them to an engine-ready [`BatchSpec`](core::BatchSpec).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use term_batch::prelude::*;
//!
//! # async fn example() -> term_batch::error::Result<()> {
//! // /data/A/A-100.csv, /data/A/A-101.csv, /data/B/B-200.csv
//! let config = DataConnectorConfig::new(
//!     "my_connector",
//!     "my_env",
//!     "/data",
//!     RegexConfig::new(r"(.+)-(\d+)\.csv", ["name", "id"]),
//! )
//! .with_asset("A", AssetConfig::new().with_base_directory("A"))
//! .with_asset("B", AssetConfig::new().with_base_directory("B"))
//! .with_sorter(SorterConfig::numeric("id", SortOrder::Descending));
//!
//! let connector = ConfiguredAssetFilesystemDataConnector::from_config(config)?;
//!
//! // Batches of asset A, highest id first
//! let request = BatchRequest::for_asset("A");
//! let definitions = connector.get_batch_definitions(&request).await?;
//!
//! let spec = connector.build_batch_spec(&definitions[0]).await?;
//! let engine = DataFusionExecutionEngine::new();
//! let batch = engine.load_batch(Some(request), definitions[0].clone(), spec).await?;
//! println!("{} rows loaded", batch.num_rows());
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Features
//!
//! ### Pattern mapping in both directions
//!
//! A [`PatternMapper`](partition::PatternMapper) maps `A-100.csv` to
//! `{"name": "A", "id": "100"}` and, through a
//! [`ReferenceTemplate`](partition::ReferenceTemplate) derived from the same
//! regex, maps the identity back to `A-100.csv`.
//!
//! ### Ordering and selection
//!
//! - **Sorters**: lexicographic, numeric, date-time and custom-list sorters,
//!   chained by priority
//! - **Partition queries**: exact identifier matches, custom filters,
//!   negative indexing, `start:stop:step` slices, and limits
//!
//! ### Pluggable storage
//!
//! Directory listings go through the [`ReferenceLister`](store::ReferenceLister)
//! trait. The local filesystem and an in-memory lister ship by default;
//! object stores (S3, GCS, Azure) are available with the `cloud-storage`
//! feature.
//!
//! ### Execution
//!
//! [`DataFusionExecutionEngine`](engine::DataFusionExecutionEngine) loads CSV,
//! TSV, Parquet and NDJSON batches and applies split and sample directives
//! as SQL.
//!
//! ## Architecture
//!
//! - **`core`**: batch definitions, requests, specs and partition identities
//! - **`partition`**: pattern mapping, reference templates, sorters and partition queries
//! - **`store`**: reference listers over filesystems, memory and object stores
//! - **`connector`**: configuration, asset registry, reference cache and data connectors
//! - **`engine`**: execution engines that load a batch spec
//! - **`security`**: SQL identifier and literal escaping
//! - **`logging`**: logging configuration and subscriber setup

pub mod connector;
pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod partition;
pub mod prelude;
pub mod security;
pub mod store;
