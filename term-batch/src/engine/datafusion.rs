use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::{
    CsvReadOptions, NdJsonReadOptions, ParquetReadOptions, SessionConfig, SessionContext,
};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::sql::batch_query;
use super::ExecutionEngine;
use crate::core::{BatchLocation, BatchSpec};
use crate::error::{ErrorContext, Result, TermError};
use crate::logging::LogConfig;
use crate::security::SqlSecurity;
use crate::{log_data_op, perf_debug};

/// File formats the engine can register, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Csv,
    Tsv,
    Parquet,
    NdJson,
}

impl FileFormat {
    fn from_path(path: &Path) -> Result<(Self, String)> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| {
                TermError::NotSupported(format!(
                    "cannot infer a file format for '{}'",
                    path.display()
                ))
            })?;

        let format = match extension.to_ascii_lowercase().as_str() {
            "csv" => Self::Csv,
            "tsv" => Self::Tsv,
            "parquet" => Self::Parquet,
            "json" | "ndjson" | "jsonl" => Self::NdJson,
            other => {
                return Err(TermError::NotSupported(format!(
                    "file format '.{other}' for '{}'",
                    path.display()
                )))
            }
        };
        Ok((format, format!(".{extension}")))
    }
}

/// Execution engine backed by a DataFusion [`SessionContext`].
///
/// Path and runtime specs are registered under a temporary table name,
/// queried, and deregistered again. Table specs query a table already
/// registered in the engine's context.
///
/// # Examples
///
/// ```rust,no_run
/// use term_batch::core::{BatchDirective, BatchSpec};
/// use term_batch::engine::{DataFusionExecutionEngine, ExecutionEngine};
///
/// # async fn example() -> term_batch::error::Result<()> {
/// let engine = DataFusionExecutionEngine::new();
/// let spec = BatchSpec::path("/data/trips/2020-01.csv")
///     .with_sampler(BatchDirective::new("sample_using_limit").with_kwarg("n", 100));
///
/// let data = engine.get_batch_data(&spec).await?;
/// # Ok(())
/// # }
/// ```
pub struct DataFusionExecutionEngine {
    ctx: SessionContext,
    table_counter: AtomicU64,
    log_config: LogConfig,
}

impl fmt::Debug for DataFusionExecutionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFusionExecutionEngine")
            .field("session_id", &self.ctx.session_id())
            .field("log_config", &self.log_config)
            .finish_non_exhaustive()
    }
}

impl Default for DataFusionExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFusionExecutionEngine {
    /// Creates an engine with a fresh session context.
    pub fn new() -> Self {
        Self::with_config(SessionConfig::new().with_information_schema(true))
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_context(SessionContext::new_with_config(config))
    }

    /// Creates an engine over an existing context, so that table specs can
    /// refer to tables registered there.
    pub fn with_context(ctx: SessionContext) -> Self {
        Self {
            ctx,
            table_counter: AtomicU64::new(0),
            log_config: LogConfig::default(),
        }
    }

    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    fn next_table_name(&self) -> String {
        let n = self.table_counter.fetch_add(1, Ordering::Relaxed);
        format!("__term_batch_{n}")
    }

    async fn register_path(&self, table_name: &str, path: &Path) -> Result<()> {
        let (format, extension) = FileFormat::from_path(path)?;
        let location = path.to_string_lossy().into_owned();

        debug!(
            table.name = %table_name,
            path = %location,
            file.format = ?format,
            "Registering batch file"
        );

        match format {
            FileFormat::Csv | FileFormat::Tsv => {
                let delimiter = if format == FileFormat::Tsv { b'\t' } else { b',' };
                let options = CsvReadOptions::new()
                    .has_header(true)
                    .delimiter(delimiter)
                    .file_extension(&extension);
                self.ctx.register_csv(table_name, &location, options).await?;
            }
            FileFormat::Parquet => {
                let mut options = ParquetReadOptions::default();
                options.file_extension = &extension;
                self.ctx
                    .register_parquet(table_name, &location, options)
                    .await?;
            }
            FileFormat::NdJson => {
                let mut options = NdJsonReadOptions::default();
                options.file_extension = &extension;
                self.ctx.register_json(table_name, &location, options).await?;
            }
        }
        Ok(())
    }

    fn register_runtime(&self, table_name: &str, batches: &[RecordBatch]) -> Result<()> {
        let schema = batches
            .first()
            .map(RecordBatch::schema)
            .ok_or_else(|| {
                TermError::InvalidBatchSpec("runtime batch spec has no batch data".to_string())
            })?;
        let table = MemTable::try_new(schema, vec![batches.to_vec()])?;
        self.ctx.register_table(table_name, Arc::new(table))?;
        Ok(())
    }

    async fn run_query(&self, table: &str, spec: &BatchSpec) -> Result<Vec<RecordBatch>> {
        let sql = batch_query(table, spec)?;
        perf_debug!(self.log_config, sql = %sql, "Executing batch query");

        let df = self.ctx.sql(&sql).await?;
        Ok(df.collect().await?)
    }

    async fn query_temporary(&self, table_name: &str, spec: &BatchSpec) -> Result<Vec<RecordBatch>> {
        let escaped = SqlSecurity::escape_identifier(table_name)?;
        let result = self.run_query(&escaped, spec).await;
        self.ctx
            .deregister_table(table_name)
            .with_context(|| format!("Failed to deregister temporary table '{table_name}'"))?;
        result
    }
}

#[async_trait]
impl ExecutionEngine for DataFusionExecutionEngine {
    #[instrument(skip(self, spec), fields(
        splitter = spec.splitter_method().unwrap_or("none"),
        sampler = spec.sampling_method().unwrap_or("none"),
    ))]
    async fn get_batch_data(&self, spec: &BatchSpec) -> Result<Vec<RecordBatch>> {
        let data = match spec.location() {
            BatchLocation::Path(path) => {
                let table_name = self.next_table_name();
                self.register_path(&table_name, path).await?;
                self.query_temporary(&table_name, spec).await?
            }
            BatchLocation::Runtime(batches) => {
                let table_name = self.next_table_name();
                self.register_runtime(&table_name, batches)?;
                self.query_temporary(&table_name, spec).await?
            }
            BatchLocation::Table(name) => {
                let escaped = SqlSecurity::escape_qualified_identifier(name)?;
                self.run_query(&escaped, spec).await?
            }
        };

        log_data_op!(
            self.log_config,
            rows = data.iter().map(RecordBatch::num_rows).sum::<usize>(),
            batches = data.len(),
            "Loaded batch data"
        );
        Ok(data)
    }
}
