//! Aggregation layer: lifecycle, serialization and rendering of matrix
//! statistics aggregations.
//!
//! This module provides:
//!
//! - [`AggregationState`]: the per-partition / merged / finalized unit,
//!   generic over a [`MatrixStrategy`] that decides what finalize computes
//!   and how the result is rendered.
//!
//! - [`PcaStrategy`]: principal components of the covariance or
//!   correlation matrix.
//!
//! - [`MatrixStatsStrategy`]: per-field moments plus covariance and
//!   correlation rows.
//!
//! # Usage
//!
//! ```rust
//! use pca_stats::aggregation::{AggregationState, PcaStrategy};
//!
//! let mut left = AggregationState::new("pca", PcaStrategy::new(true));
//! let mut right = AggregationState::new("pca", PcaStrategy::new(true));
//! for i in 0..10 {
//!     let t = i as f64;
//!     left.collect([("a", t), ("b", 2.0 * t + 1.0)]);
//!     right.collect([("a", -t), ("b", t * t)]);
//! }
//!
//! let reduced = left.merge(right).unwrap().finalize().unwrap();
//! let doc = reduced.render().unwrap();
//! assert_eq!(doc["doc_count"], 20);
//! assert_eq!(doc["pc"].as_array().unwrap().len(), 2);
//! ```

pub mod matrix_stats;
pub mod pca;
pub mod state;

pub use matrix_stats::{FieldSummary, MatrixStatsResult, MatrixStatsStrategy};
pub use pca::{Decomposition, PcaResult, PcaStrategy, PrincipalComponent};
pub use state::{AggregationState, Reduction};

use std::fmt;

use serde_json::{Map, Value};

use crate::error::Result;
use crate::kernel::{Readable, StreamInput, StreamOutput, StreamingStats, Writeable};

/// What an [`AggregationState`] computes at finalize and how it renders.
///
/// Implementations hold the configuration that must agree between merged
/// states and that travels with the state on the wire.
pub trait MatrixStrategy: Clone + fmt::Debug {
    /// Cached finalize output.
    type Output: Writeable + Readable + Clone + fmt::Debug + PartialEq;

    /// Aggregation kind, used in logs.
    const KIND: &'static str;

    /// Whether states under `self` and `other` may be merged.
    fn is_compatible(&self, other: &Self) -> bool;

    /// Short description for error messages.
    fn describe(&self) -> String;

    /// Run the analysis over fully merged statistics.
    fn compute(&self, stats: &StreamingStats) -> Result<Self::Output>;

    /// Add the result-specific keys to a document that already has `doc_count`.
    fn render(&self, result: &Self::Output, doc: &mut Map<String, Value>);

    fn write_config<W: StreamOutput + ?Sized>(&self, out: &mut W);

    fn read_config<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self>;
}

/// PCA aggregation state.
pub type PcaState = AggregationState<PcaStrategy>;

/// matrix_stats aggregation state.
pub type MatrixStatsState = AggregationState<MatrixStatsStrategy>;
