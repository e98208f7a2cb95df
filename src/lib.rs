//! # pca-stats: Distributed Principal Component Statistics
//!
//! Mergeable streaming moments for numeric document fields, reduced to a
//! covariance or correlation matrix and decomposed into principal components
//! once, at the root of a reduce tree.
//!
//! ## Quick Start
//!
//! ```rust
//! use pca_stats::{PcaConfig, Reducer};
//!
//! let config = PcaConfig::from_json(r#"{"use_covariance": false}"#).unwrap();
//!
//! // Each partition accumulates its own documents.
//! let mut partitions = Vec::new();
//! for shard in 0..3 {
//!     let mut state = config.new_state();
//!     for i in 0..20 {
//!         let t = (shard * 20 + i) as f64;
//!         state.collect([("latency", t.sin() * 3.0 + t), ("bytes", 2.0 * t + 5.0)]);
//!     }
//!     partitions.push(state);
//! }
//!
//! // Merge, finalize once, render.
//! let doc = Reducer::new().render(partitions).unwrap();
//! assert_eq!(doc["doc_count"], 60);
//! assert_eq!(doc["fields"], serde_json::json!(["bytes", "latency"]));
//! assert_eq!(doc["pc"].as_array().unwrap().len(), 2);
//! ```
//!
//! ## Layers
//!
//! - [`kernel`]: streaming moments, matrix construction, Jacobi eigensolver,
//!   binary stream codec
//! - [`aggregation`]: the state lifecycle (collect, merge, finalize, render)
//!   for PCA and matrix_stats
//! - [`highlevel`]: tree reduction over partition states

pub mod aggregation;
pub mod config;
pub mod error;
pub mod highlevel;
pub mod kernel;

// Re-exports for convenience
pub use aggregation::{
    AggregationState, MatrixStatsState, MatrixStatsStrategy, MatrixStrategy, PcaResult, PcaState,
    PcaStrategy,
};
pub use config::PcaConfig;
pub use error::{NumericalError, PcaError, Result, SerializationError};
pub use highlevel::Reducer;
pub use kernel::{JacobiSolver, MatrixBuilder, MatrixMode, StreamingStats};
