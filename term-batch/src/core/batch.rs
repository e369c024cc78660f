//! Batch definitions, requests and engine-ready batch specs.

use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Result, TermError};
use crate::partition::PartitionQuery;

use super::PartitionIdentity;

/// Identity of one logical batch.
///
/// A definition is created during a cache refresh and never mutated
/// afterwards. Together with the reference cache it resolves to at most one
/// raw reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchDefinition {
    /// Execution environment that owns the connector
    pub execution_environment_name: String,
    /// Data connector that discovered the batch
    pub data_connector_name: String,
    /// Data asset the batch belongs to
    pub data_asset_name: String,
    /// Structured partition key extracted from the raw reference
    pub partition_identity: PartitionIdentity,
}

impl BatchDefinition {
    /// Creates a new batch definition.
    pub fn new(
        execution_environment_name: impl Into<String>,
        data_connector_name: impl Into<String>,
        data_asset_name: impl Into<String>,
        partition_identity: PartitionIdentity,
    ) -> Self {
        Self {
            execution_environment_name: execution_environment_name.into(),
            data_connector_name: data_connector_name.into(),
            data_asset_name: data_asset_name.into(),
            partition_identity,
        }
    }

    /// Returns a stable identifier for this definition.
    ///
    /// The id is the hex-encoded SHA-256 digest of the definition's canonical
    /// JSON form (object keys sorted, values as text), so it does not depend
    /// on group order and agrees with equality.
    pub fn id(&self) -> String {
        let identity: Map<String, Value> = self
            .partition_identity
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v.as_text())))
            .collect();
        let canonical = json!({
            "execution_environment_name": self.execution_environment_name,
            "data_connector_name": self.data_connector_name,
            "data_asset_name": self.data_asset_name,
            "partition_identity": identity,
        });

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns `true` if the definition satisfies the request's exact-match criteria.
    ///
    /// Names left unset on the request match anything.
    pub fn matches_request(&self, request: &BatchRequest) -> bool {
        if let Some(ref env) = request.execution_environment_name {
            if env != &self.execution_environment_name {
                return false;
            }
        }
        if let Some(ref connector) = request.data_connector_name {
            if connector != &self.data_connector_name {
                return false;
            }
        }
        if let Some(ref asset) = request.data_asset_name {
            if asset != &self.data_asset_name {
                return false;
            }
        }
        match request.partition_identifiers {
            Some(ref identifiers) => self.partition_identity.matches(identifiers),
            None => true,
        }
    }
}

impl fmt::Display for BatchDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

/// A caller's query for batches.
///
/// # Example
///
/// ```rust
/// use term_batch::core::BatchRequest;
///
/// let request = BatchRequest::for_asset("taxi_trips")
///     .with_environment("local")
///     .with_connector("monthly_files")
///     .with_partition_identifier("year", "2020");
///
/// assert_eq!(request.data_asset_name.as_deref(), Some("taxi_trips"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Execution environment name, if the caller wants it checked
    pub execution_environment_name: Option<String>,
    /// Data connector name, if the caller wants it checked
    pub data_connector_name: Option<String>,
    /// Data asset to resolve; `None` addresses every asset of the connector
    pub data_asset_name: Option<String>,
    /// Exact-match criteria applied before the partition query
    pub partition_identifiers: Option<PartitionIdentity>,
    /// Optional selector applied after exact matching
    pub partition_query: Option<PartitionQuery>,
}

impl BatchRequest {
    /// Creates a request that addresses every asset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request for a single data asset.
    pub fn for_asset(data_asset_name: impl Into<String>) -> Self {
        Self {
            data_asset_name: Some(data_asset_name.into()),
            ..Default::default()
        }
    }

    /// Restricts the request to an execution environment.
    pub fn with_environment(mut self, name: impl Into<String>) -> Self {
        self.execution_environment_name = Some(name.into());
        self
    }

    /// Restricts the request to a data connector.
    pub fn with_connector(mut self, name: impl Into<String>) -> Self {
        self.data_connector_name = Some(name.into());
        self
    }

    /// Adds an exact-match criterion on a partition group.
    pub fn with_partition_identifier(
        mut self,
        key: impl Into<String>,
        value: impl Into<super::PartitionValue>,
    ) -> Self {
        self.partition_identifiers
            .get_or_insert_with(PartitionIdentity::new)
            .insert(key, value);
        self
    }

    /// Replaces the exact-match criteria.
    pub fn with_partition_identifiers(mut self, identifiers: PartitionIdentity) -> Self {
        self.partition_identifiers = Some(identifiers);
        self
    }

    /// Attaches a partition query.
    pub fn with_partition_query(mut self, query: PartitionQuery) -> Self {
        self.partition_query = Some(query);
        self
    }

    /// Renders the request as JSON for diagnostics.
    pub fn to_json(&self) -> Value {
        json!({
            "execution_environment_name": self.execution_environment_name,
            "data_connector_name": self.data_connector_name,
            "data_asset_name": self.data_asset_name,
            "partition_identifiers": self.partition_identifiers,
            "partition_query": self.partition_query.as_ref().map(PartitionQuery::to_json),
        })
    }
}

/// A named post-load transformation (split or sample) and its keyword arguments.
///
/// The resolution core threads directives through to the execution engine
/// without interpreting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDirective {
    /// Method name understood by the execution engine
    pub method: String,
    /// Keyword arguments for the method
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl BatchDirective {
    /// Creates a directive without arguments.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            kwargs: Map::new(),
        }
    }

    /// Adds a keyword argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.into(), value.into());
        self
    }
}

/// Where an execution engine finds the data for a batch.
#[derive(Debug, Clone)]
pub enum BatchLocation {
    /// A resolved file or directory path
    Path(PathBuf),
    /// A table already known to the engine
    Table(String),
    /// Record batches supplied by the caller at runtime
    Runtime(Vec<RecordBatch>),
}

/// Materialized, engine-ready description of how to load a batch.
///
/// # Example
///
/// ```rust
/// use term_batch::core::{BatchDirective, BatchSpec};
///
/// let spec = BatchSpec::path("/data/A/A-100.csv")
///     .with_sampler(BatchDirective::new("sample_using_limit").with_kwarg("n", 10));
///
/// assert_eq!(spec.sampling_method(), Some("sample_using_limit"));
/// ```
#[derive(Debug, Clone)]
pub struct BatchSpec {
    location: BatchLocation,
    batch_identifiers: PartitionIdentity,
    splitter: Option<BatchDirective>,
    sampler: Option<BatchDirective>,
}

impl BatchSpec {
    /// Creates a path-flavored spec.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::with_location(BatchLocation::Path(path.into()))
    }

    /// Creates a table-flavored spec.
    pub fn table(table_name: impl Into<String>) -> Self {
        Self::with_location(BatchLocation::Table(table_name.into()))
    }

    /// Creates a spec over in-memory record batches.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBatchSpec` if no batch data is supplied.
    pub fn runtime(batches: Vec<RecordBatch>) -> Result<Self> {
        if batches.is_empty() {
            return Err(TermError::InvalidBatchSpec(
                "runtime batch spec requires batch data".to_string(),
            ));
        }
        Ok(Self::with_location(BatchLocation::Runtime(batches)))
    }

    fn with_location(location: BatchLocation) -> Self {
        Self {
            location,
            batch_identifiers: PartitionIdentity::new(),
            splitter: None,
            sampler: None,
        }
    }

    /// Records the partition identity the spec was built from.
    pub fn with_batch_identifiers(mut self, identity: PartitionIdentity) -> Self {
        self.batch_identifiers = identity;
        self
    }

    /// Attaches a splitter directive.
    pub fn with_splitter(mut self, directive: BatchDirective) -> Self {
        self.splitter = Some(directive);
        self
    }

    /// Attaches a sampler directive.
    pub fn with_sampler(mut self, directive: BatchDirective) -> Self {
        self.sampler = Some(directive);
        self
    }

    pub fn location(&self) -> &BatchLocation {
        &self.location
    }

    /// Returns the resolved path for path-flavored specs.
    pub fn path_ref(&self) -> Option<&Path> {
        match &self.location {
            BatchLocation::Path(p) => Some(p.as_path()),
            _ => None,
        }
    }

    pub fn batch_identifiers(&self) -> &PartitionIdentity {
        &self.batch_identifiers
    }

    pub fn splitter(&self) -> Option<&BatchDirective> {
        self.splitter.as_ref()
    }

    pub fn sampler(&self) -> Option<&BatchDirective> {
        self.sampler.as_ref()
    }

    pub fn splitter_method(&self) -> Option<&str> {
        self.splitter.as_ref().map(|d| d.method.as_str())
    }

    pub fn sampling_method(&self) -> Option<&str> {
        self.sampler.as_ref().map(|d| d.method.as_str())
    }

    /// Renders the spec as JSON. Runtime data is summarized, not serialized.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        match &self.location {
            BatchLocation::Path(p) => {
                object.insert("path".into(), json!(p.to_string_lossy()));
            }
            BatchLocation::Table(t) => {
                object.insert("table_name".into(), json!(t));
            }
            BatchLocation::Runtime(batches) => {
                let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
                object.insert("batch_data".into(), json!(format!("{rows} in-memory rows")));
            }
        }
        if !self.batch_identifiers.is_empty() {
            object.insert("batch_identifiers".into(), json!(self.batch_identifiers));
        }
        if let Some(ref splitter) = self.splitter {
            object.insert("splitter_method".into(), json!(splitter.method));
            object.insert("splitter_kwargs".into(), Value::Object(splitter.kwargs.clone()));
        }
        if let Some(ref sampler) = self.sampler {
            object.insert("sampling_method".into(), json!(sampler.method));
            object.insert("sampling_kwargs".into(), Value::Object(sampler.kwargs.clone()));
        }
        Value::Object(object)
    }
}

/// Markers recorded when an engine loads a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMarkers {
    /// When the batch data was loaded
    pub load_time: DateTime<Utc>,
}

impl BatchMarkers {
    /// Creates markers stamped with the current time.
    pub fn now() -> Self {
        Self {
            load_time: Utc::now(),
        }
    }

    /// Load time in the compact `YYYYMMDDTHHMMSS.ffffffZ` form.
    pub fn load_time_string(&self) -> String {
        self.load_time.format("%Y%m%dT%H%M%S%.6fZ").to_string()
    }
}

/// A loaded batch together with everything that identifies it.
#[derive(Debug, Clone)]
pub struct Batch {
    pub data: Vec<RecordBatch>,
    pub batch_request: Option<BatchRequest>,
    pub batch_definition: BatchDefinition,
    pub batch_spec: BatchSpec,
    pub batch_markers: BatchMarkers,
}

impl Batch {
    /// Total number of rows in the loaded data.
    pub fn num_rows(&self) -> usize {
        self.data.iter().map(RecordBatch::num_rows).sum()
    }

    /// Diagnostic JSON view of the batch.
    pub fn to_json(&self) -> Value {
        json!({
            "data": format!("{} record batches, {} rows", self.data.len(), self.num_rows()),
            "batch_request": self.batch_request.as_ref().map(BatchRequest::to_json),
            "batch_definition": self.batch_definition,
            "batch_spec": self.batch_spec.to_json(),
            "batch_markers": { "load_time": self.batch_markers.load_time_string() },
        })
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.to_json()) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}
