//! Prelude for commonly used types and traits in term-batch.

pub use crate::connector::{
    AssetConfig, ConfiguredAssetFilesystemDataConnector, DataConnector, DataConnectorConfig,
};
pub use crate::core::{
    Batch, BatchDefinition, BatchDirective, BatchRequest, BatchSpec, PartitionIdentity,
    PartitionValue,
};
pub use crate::engine::{DataFusionExecutionEngine, ExecutionEngine};
pub use crate::error::{ErrorContext, Result, TermError};
pub use crate::logging::LogConfig;
pub use crate::partition::{PartitionQuery, RegexConfig, SortOrder, SorterConfig};
pub use crate::store::ReferenceLister;
