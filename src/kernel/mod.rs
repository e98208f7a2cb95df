//! Kernel layer: numeric primitives shared by every aggregation kind.
//!
//! - Streaming, mergeable moments ([`StreamingStats`])
//! - Covariance/correlation matrix construction ([`MatrixBuilder`])
//! - Symmetric eigen-decomposition ([`JacobiSolver`])
//! - Binary stream codec traits ([`StreamOutput`], [`StreamInput`])
//!
//! This layer has no dependencies on [`aggregation`](crate::aggregation) or
//! [`highlevel`](crate::highlevel).
//!
//! # Example
//!
//! ```rust
//! use pca_stats::kernel::{JacobiSolver, MatrixBuilder, MatrixMode, StreamingStats};
//!
//! let mut stats = StreamingStats::new();
//! for (x, y) in [(1.0, 2.0), (2.0, 1.0), (3.0, 4.0), (4.0, 3.0)] {
//!     stats.accumulate([("x", x), ("y", y)]);
//! }
//!
//! let built = MatrixBuilder::build(&stats, MatrixMode::Covariance);
//! let eig = JacobiSolver::new().decompose(&built.matrix).unwrap();
//! assert_eq!(eig.pairs.len(), 2);
//! ```

pub mod eigen;
pub mod matrix;
pub mod running_stats;
pub mod stream;

pub use eigen::{Decomposed, EigenPair, JacobiSolver, DEFAULT_MAX_SWEEPS};
pub use matrix::{BuiltMatrix, MatrixBuilder, MatrixMode, SymmetricMatrix};
pub use running_stats::{FieldMoments, PairMoments, StreamingStats};
pub use stream::{
    from_bytes, to_bytes, BytesInput, BytesOutput, Readable, StreamInput, StreamOutput, Writeable,
};
