//! Tree reduction driver: merge partition states level by level, finalize
//! once at the root.
//!
//! Hosts with their own reduce scheduling call
//! [`AggregationState::merge`] and [`AggregationState::finalize`] directly;
//! the result does not depend on the tree shape.

use serde_json::Value;

use crate::aggregation::{AggregationState, MatrixStrategy};
use crate::error::{PcaError, Result};

/// Merges sibling states in groups of `fan_in` until one state remains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reducer {
    fan_in: usize,
}

impl Default for Reducer {
    fn default() -> Self {
        Self::new()
    }
}

impl Reducer {
    /// Pairwise (binary tree) reduction.
    pub fn new() -> Self {
        Self { fan_in: 2 }
    }

    /// `fan_in` below 2 is raised to 2.
    pub fn with_fan_in(fan_in: usize) -> Self {
        Self {
            fan_in: fan_in.max(2),
        }
    }

    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    /// Merge all partitions into one unreduced state.
    ///
    /// # Errors
    /// - [`PcaError::EmptyInput`] for an empty partition list.
    /// - [`PcaError::SchemaMismatch`] from any merge.
    pub fn reduce<S: MatrixStrategy>(
        &self,
        partitions: Vec<AggregationState<S>>,
    ) -> Result<AggregationState<S>> {
        let mut level = partitions;
        let mut depth = 0;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(self.fan_in));
            let mut states = level.into_iter();
            while let Some(first) = states.next() {
                let mut acc = first;
                for sibling in states.by_ref().take(self.fan_in - 1) {
                    acc = acc.merge(sibling)?;
                }
                next.push(acc);
            }
            level = next;
            depth += 1;
        }
        log::debug!("reduced partitions in {} level(s)", depth);

        level
            .pop()
            .ok_or_else(|| PcaError::EmptyInput("no partitions to reduce".to_string()))
    }

    /// Reduce, then finalize the root exactly once.
    pub fn reduce_and_finalize<S: MatrixStrategy>(
        &self,
        partitions: Vec<AggregationState<S>>,
    ) -> Result<AggregationState<S>> {
        self.reduce(partitions)?.finalize()
    }

    /// Reduce, finalize and render.
    pub fn render<S: MatrixStrategy>(&self, partitions: Vec<AggregationState<S>>) -> Result<Value> {
        self.reduce_and_finalize(partitions)?.render()
    }
}
