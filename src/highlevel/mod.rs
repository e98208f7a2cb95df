//! High-level layer: drivers that run the full aggregation lifecycle.
//!
//! [`Reducer`] merges partition states up a tree of configurable fan-in,
//! finalizes the root once and renders it. Everything it does is available
//! piecewise from [`aggregation`](crate::aggregation).

pub mod reducer;

pub use reducer::Reducer;
