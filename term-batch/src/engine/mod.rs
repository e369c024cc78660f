//! Execution engines that load the data described by a [`BatchSpec`].
//!
//! Data connectors stop at the spec: a resolved location plus optional split
//! and sample directives. An [`ExecutionEngine`] turns that spec into Arrow
//! record batches. [`DataFusionExecutionEngine`] is the engine shipped with
//! this crate.
//!
//! # Supported directives
//!
//! | Splitter | Arguments |
//! |----------|-----------|
//! | `split_on_whole_table` | none |
//! | `split_on_column_value` | `column_name` |
//! | `split_on_divided_integer` | `column_name`, `divisor` |
//! | `split_on_mod_integer` | `column_name`, `mod` |
//! | `split_on_multi_column_values` | `column_names` |
//!
//! Splitter values come from the spec's batch identifiers.
//!
//! | Sampler | Arguments |
//! |---------|-----------|
//! | `sample_using_limit` | `n` |
//! | `sample_using_random` | `p` (default 0.1) |
//! | `sample_using_mod` | `column_name`, `mod`, `value` |
//! | `sample_using_a_list` | `column_name`, `value_list` |

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::fmt::Debug;

use crate::core::{Batch, BatchDefinition, BatchMarkers, BatchRequest, BatchSpec};
use crate::error::Result;

mod datafusion;
mod sql;

pub use self::datafusion::DataFusionExecutionEngine;
pub use sql::{
    SAMPLE_USING_A_LIST, SAMPLE_USING_LIMIT, SAMPLE_USING_MOD, SAMPLE_USING_RANDOM,
    SPLIT_ON_COLUMN_VALUE, SPLIT_ON_DIVIDED_INTEGER, SPLIT_ON_MOD_INTEGER,
    SPLIT_ON_MULTI_COLUMN_VALUES, SPLIT_ON_WHOLE_TABLE,
};

/// Loads batch data from a [`BatchSpec`].
///
/// # Examples
///
/// ```rust,ignore
/// use term_batch::engine::{DataFusionExecutionEngine, ExecutionEngine};
///
/// let engine = DataFusionExecutionEngine::new();
/// let spec = connector.build_batch_spec(&definition).await?;
/// let batch = engine.load_batch(None, definition, spec).await?;
/// println!("{} rows", batch.num_rows());
/// ```
#[async_trait]
pub trait ExecutionEngine: Debug + Send + Sync {
    /// Loads the record batches described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns `NotSupported` for unknown directive methods or locations,
    /// `InvalidBatchSpec` for missing or malformed directive arguments, and
    /// `DataFusion` errors from reading the data.
    async fn get_batch_data(&self, spec: &BatchSpec) -> Result<Vec<RecordBatch>>;

    /// Loads a batch and stamps it with its load time.
    async fn load_batch(
        &self,
        request: Option<BatchRequest>,
        definition: BatchDefinition,
        spec: BatchSpec,
    ) -> Result<Batch> {
        let data = self.get_batch_data(&spec).await?;
        Ok(Batch {
            data,
            batch_request: request,
            batch_definition: definition,
            batch_spec: spec,
            batch_markers: BatchMarkers::now(),
        })
    }
}
