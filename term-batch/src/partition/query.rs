//! Partition queries: selecting batch definitions by predicate, position or count.

use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::core::{BatchDefinition, PartitionIdentity};
use crate::error::{Result, TermError};

/// Predicate over a partition identity supplied by the caller.
pub type CustomFilter = Arc<dyn Fn(&PartitionIdentity) -> bool + Send + Sync>;

const RECOGNIZED_KEYS: [&str; 3] = ["partition_identifiers", "index", "limit"];

/// Positional selection applied after filtering.
///
/// Negative positions count from the end;
/// slices clamp to the candidate list and may step backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSelector {
    /// A single position
    Position(isize),
    /// A `start:stop:step` slice; `None` bounds take the defaults for the step's direction
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: Option<isize>,
    },
}

impl IndexSelector {
    /// Selects the positions of a list of length `len`, in output order.
    fn positions(&self, len: usize) -> Vec<usize> {
        let n = len as isize;
        match *self {
            Self::Position(i) => {
                let idx = if i < 0 { i + n } else { i };
                if (0..n).contains(&idx) {
                    vec![idx as usize]
                } else {
                    Vec::new()
                }
            }
            Self::Slice { start, stop, step } => {
                let step = step.unwrap_or(1);
                if step == 0 {
                    return Vec::new();
                }
                let (start, stop) = adjust_slice(start, stop, step, n);
                let mut positions = Vec::new();
                let mut i = start;
                while (step > 0 && i < stop) || (step < 0 && i > stop) {
                    positions.push(i as usize);
                    match i.checked_add(step) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
                positions
            }
        }
    }

    fn to_json(self) -> Value {
        match self {
            Self::Position(i) => json!(i),
            Self::Slice { start, stop, step } => {
                let part = |v: Option<isize>| v.map(|v| v.to_string()).unwrap_or_default();
                json!(format!("{}:{}:{}", part(start), part(stop), part(step)))
            }
        }
    }
}

/// Resolves slice bounds against a list of length `n`, clamping out-of-range bounds.
fn adjust_slice(start: Option<isize>, stop: Option<isize>, step: isize, n: isize) -> (isize, isize) {
    let (lower, upper) = if step < 0 { (-1, n - 1) } else { (0, n) };

    let clamp = |bound: isize| {
        if bound < 0 {
            (bound + n).max(lower)
        } else {
            bound.min(upper)
        }
    };

    let start = match start {
        Some(s) => clamp(s),
        None if step < 0 => upper,
        None => lower,
    };
    let stop = match stop {
        Some(s) => clamp(s),
        None if step < 0 => lower,
        None => upper,
    };
    (start, stop)
}

/// Selector over batch definitions, rebuilt for every request.
///
/// Filtering uses the custom filter when one is set, otherwise the
/// best-effort exact match on `partition_identifiers`. Then `index` or
/// `limit` (never both) picks from the filtered list.
///
/// # Examples
///
/// ```
/// use term_batch::core::{BatchDefinition, PartitionIdentity};
/// use term_batch::partition::PartitionQuery;
///
/// let defs: Vec<_> = (0..5)
///     .map(|i| BatchDefinition::new("env", "conn", "asset", PartitionIdentity::new().with("id", i.to_string())))
///     .collect();
///
/// let last = PartitionQuery::new().with_position(-1).select(&defs);
/// assert_eq!(last, vec![defs[4].clone()]);
///
/// let query = PartitionQuery::from_json(&serde_json::json!({"index": "::-2"})).unwrap();
/// assert_eq!(query.select(&defs).len(), 3);
/// ```
#[derive(Clone, Default)]
pub struct PartitionQuery {
    custom_filter: Option<CustomFilter>,
    partition_identifiers: Option<PartitionIdentity>,
    index: Option<IndexSelector>,
    limit: Option<usize>,
}

impl PartitionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a predicate that takes priority over `partition_identifiers`.
    pub fn with_custom_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&PartitionIdentity) -> bool + Send + Sync + 'static,
    {
        self.custom_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_partition_identifiers(mut self, identifiers: PartitionIdentity) -> Self {
        self.partition_identifiers = Some(identifiers);
        self
    }

    pub fn with_index(mut self, index: IndexSelector) -> Self {
        self.index = Some(index);
        self
    }

    /// Selects a single position; negative positions count from the end.
    pub fn with_position(self, position: isize) -> Self {
        self.with_index(IndexSelector::Position(position))
    }

    /// Selects a `start:stop:step` slice.
    pub fn with_slice(
        self,
        start: Option<isize>,
        stop: Option<isize>,
        step: Option<isize>,
    ) -> Self {
        self.with_index(IndexSelector::Slice { start, stop, step })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn partition_identifiers(&self) -> Option<&PartitionIdentity> {
        self.partition_identifiers.as_ref()
    }

    pub fn index(&self) -> Option<IndexSelector> {
        self.index
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn has_custom_filter(&self) -> bool {
        self.custom_filter.is_some()
    }

    /// Checks the query shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if both `index` and `limit` are set or a
    /// slice has a zero step.
    pub fn validate(&self) -> Result<()> {
        if self.index.is_some() && self.limit.is_some() {
            return Err(TermError::InvalidRequest(
                "Only one of index or limit may be specified in a partition query".to_string(),
            ));
        }
        if let Some(IndexSelector::Slice { step: Some(0), .. }) = self.index {
            return Err(TermError::InvalidRequest(
                "Partition query slice step cannot be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Selects definitions from `definitions` without modifying it.
    ///
    /// An empty result is valid. A single position outside the list selects
    /// nothing.
    pub fn select(&self, definitions: &[BatchDefinition]) -> Vec<BatchDefinition> {
        let filtered: Vec<&BatchDefinition> = definitions
            .iter()
            .filter(|d| match (&self.custom_filter, &self.partition_identifiers) {
                (Some(filter), _) => filter(&d.partition_identity),
                (None, Some(identifiers)) => d.partition_identity.matches(identifiers),
                (None, None) => true,
            })
            .collect();

        let selected: Vec<&BatchDefinition> = match (self.index, self.limit) {
            (Some(index), _) => index
                .positions(filtered.len())
                .into_iter()
                .map(|i| filtered[i])
                .collect(),
            (None, Some(limit)) => filtered.into_iter().take(limit).collect(),
            (None, None) => filtered,
        };

        selected.into_iter().cloned().collect()
    }

    /// Parses the declarative form of a partition query.
    ///
    /// Recognized keys are `partition_identifiers` (object), `index` (integer,
    /// list of one to three integers or nulls, or a `"start:stop:step"`
    /// string) and `limit` (non-negative integer). Custom filters can only be
    /// attached programmatically.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for unknown keys, malformed values, or an
    /// invalid combination of keys.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            TermError::InvalidRequest(format!("Partition query must be a JSON object, got {value}"))
        })?;

        let unknown: Vec<&String> = object
            .keys()
            .filter(|k| !RECOGNIZED_KEYS.contains(&k.as_str()))
            .collect();
        if !unknown.is_empty() {
            return Err(TermError::InvalidRequest(format!(
                "Unrecognized partition query keys {unknown:?}; expected one of {RECOGNIZED_KEYS:?}"
            )));
        }

        let mut query = Self::new();

        if let Some(identifiers) = object.get("partition_identifiers") {
            if !identifiers.is_null() {
                let identity: PartitionIdentity = serde_json::from_value(identifiers.clone())
                    .map_err(|e| {
                        TermError::InvalidRequest(format!("Invalid partition_identifiers: {e}"))
                    })?;
                query.partition_identifiers = Some(identity);
            }
        }

        if let Some(index) = object.get("index") {
            if !index.is_null() {
                query.index = Some(parse_index(index)?);
            }
        }

        if let Some(limit) = object.get("limit") {
            if !limit.is_null() {
                let limit = limit.as_u64().ok_or_else(|| {
                    TermError::InvalidRequest(format!(
                        "Partition query limit must be a non-negative integer, got {limit}"
                    ))
                })?;
                query.limit = Some(limit as usize);
            }
        }

        query.validate()?;
        Ok(query)
    }

    /// Renders the declarative parts of the query as JSON for diagnostics.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        if self.custom_filter.is_some() {
            object.insert("custom_filter_function".into(), json!("<function>"));
        }
        if let Some(ref identifiers) = self.partition_identifiers {
            object.insert("partition_identifiers".into(), json!(identifiers));
        }
        if let Some(index) = self.index {
            object.insert("index".into(), index.to_json());
        }
        if let Some(limit) = self.limit {
            object.insert("limit".into(), json!(limit));
        }
        Value::Object(object)
    }
}

impl fmt::Debug for PartitionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionQuery")
            .field(
                "custom_filter",
                &self.custom_filter.as_ref().map(|_| "<function>"),
            )
            .field("partition_identifiers", &self.partition_identifiers)
            .field("index", &self.index)
            .field("limit", &self.limit)
            .finish()
    }
}

fn parse_index(value: &Value) -> Result<IndexSelector> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(|i| IndexSelector::Position(i as isize))
            .ok_or_else(|| TermError::InvalidRequest(format!("Invalid partition query index {n}"))),
        Value::Array(items) => {
            let bounds = items
                .iter()
                .map(|item| match item {
                    Value::Null => Ok(None),
                    Value::Number(n) => n.as_i64().map(|i| Some(i as isize)).ok_or_else(|| {
                        TermError::InvalidRequest(format!("Invalid slice bound {n}"))
                    }),
                    other => Err(TermError::InvalidRequest(format!(
                        "Slice bounds must be integers or null, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            slice_from_bounds(&bounds)
        }
        Value::String(s) => parse_index_string(s),
        other => Err(TermError::InvalidRequest(format!(
            "Partition query index must be an integer, a list or a string, got {other}"
        ))),
    }
}

/// Builds a slice from one to three bounds by arity:
/// one bound is the stop, two are start and stop, three add the step.
fn slice_from_bounds(bounds: &[Option<isize>]) -> Result<IndexSelector> {
    match *bounds {
        [stop] => Ok(IndexSelector::Slice {
            start: None,
            stop,
            step: None,
        }),
        [start, stop] => Ok(IndexSelector::Slice {
            start,
            stop,
            step: None,
        }),
        [start, stop, step] => Ok(IndexSelector::Slice { start, stop, step }),
        _ => Err(TermError::InvalidRequest(format!(
            "A partition query index list must have 1 to 3 entries, got {}",
            bounds.len()
        ))),
    }
}

fn parse_index_string(s: &str) -> Result<IndexSelector> {
    let parse_bound = |part: &str| -> Result<Option<isize>> {
        let part = part.trim();
        if part.is_empty() {
            return Ok(None);
        }
        part.parse::<isize>()
            .map(Some)
            .map_err(|_| TermError::InvalidRequest(format!("Invalid slice bound '{part}' in '{s}'")))
    };

    if !s.contains(':') {
        return parse_bound(s)?
            .map(IndexSelector::Position)
            .ok_or_else(|| TermError::InvalidRequest("Empty partition query index".to_string()));
    }

    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() > 3 {
        return Err(TermError::InvalidRequest(format!(
            "Invalid slice '{s}': expected start:stop[:step]"
        )));
    }
    let start = parse_bound(parts[0])?;
    let stop = parse_bound(parts[1])?;
    let step = match parts.get(2) {
        Some(part) => parse_bound(part)?,
        None => None,
    };
    Ok(IndexSelector::Slice { start, stop, step })
}
