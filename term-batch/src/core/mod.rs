//! Core batch types for the Term batch resolution library.
//!
//! This module provides the value types that flow between data connectors and
//! execution engines.
//!
//! ## Overview
//!
//! - **[`PartitionIdentity`]**: structured key extracted from a raw reference
//! - **[`BatchDefinition`]**: identity of one logical batch
//! - **[`BatchRequest`]**: a caller's query for batches
//! - **[`BatchSpec`]**: engine-ready description of how to load a batch
//! - **[`Batch`]**: loaded data plus everything that identifies it
//!
//! ## Architecture
//!
//! ```text
//! BatchRequest
//!     └── DataConnector::get_batch_definitions
//!             └── BatchDefinition (PartitionIdentity)
//!                     └── DataConnector::build_batch_spec
//!                             └── BatchSpec
//!                                     └── ExecutionEngine::load_batch -> Batch
//! ```

mod batch;
mod identity;

pub use batch::{
    Batch, BatchDefinition, BatchDirective, BatchLocation, BatchMarkers, BatchRequest, BatchSpec,
};
pub use identity::{PartitionIdentity, PartitionValue};
