//! The per-partition / merged / finalized aggregation unit.
//!
//! An [`AggregationState`] moves through three phases:
//!
//! ```text
//! Unreduced(stats) --merge--> Unreduced(stats') --finalize--> Reduced(stats', result) --render--> document
//! ```
//!
//! The phase is encoded in [`Reduction`], so "has finalize run" is answered by
//! the type rather than a nullable field. Merging always returns an
//! `Unreduced` state; a merged accumulator's decomposition differs from
//! either input's, so cached results never survive a merge.

use serde_json::{Map, Value};

use super::MatrixStrategy;
use crate::error::{PcaError, Result, SerializationError};
use crate::kernel::{Readable, StreamInput, StreamOutput, StreamingStats, Writeable};

/// Lifecycle phase of an aggregation state.
#[derive(Clone, Debug, PartialEq)]
pub enum Reduction<R> {
    /// Statistics only; finalize has not run.
    Unreduced(StreamingStats),
    /// Statistics plus the result computed from them.
    Reduced { stats: StreamingStats, result: R },
}

impl<R> Default for Reduction<R> {
    fn default() -> Self {
        Reduction::Unreduced(StreamingStats::new())
    }
}

impl<R> Reduction<R> {
    pub fn stats(&self) -> &StreamingStats {
        match self {
            Reduction::Unreduced(stats) => stats,
            Reduction::Reduced { stats, .. } => stats,
        }
    }

    pub fn result(&self) -> Option<&R> {
        match self {
            Reduction::Unreduced(_) => None,
            Reduction::Reduced { result, .. } => Some(result),
        }
    }

    /// Drop any cached result.
    pub fn into_stats(self) -> StreamingStats {
        match self {
            Reduction::Unreduced(stats) => stats,
            Reduction::Reduced { stats, .. } => stats,
        }
    }

    pub fn is_reduced(&self) -> bool {
        matches!(self, Reduction::Reduced { .. })
    }
}

/// Aggregation state parameterised by the analysis run at finalize.
#[derive(Clone, Debug)]
pub struct AggregationState<S: MatrixStrategy> {
    name: String,
    doc_count: u64,
    strategy: S,
    reduction: Reduction<S::Output>,
    /// Opaque passthrough, rendered under `meta`.
    metadata: Option<Map<String, Value>>,
}

impl<S: MatrixStrategy> AggregationState<S> {
    /// Create an empty, unreduced state.
    pub fn new(name: impl Into<String>, strategy: S) -> Self {
        Self::from_stats(name, 0, StreamingStats::new(), strategy)
    }

    /// Wrap statistics a partition already accumulated.
    pub fn from_stats(
        name: impl Into<String>,
        doc_count: u64,
        stats: StreamingStats,
        strategy: S,
    ) -> Self {
        Self {
            name: name.into(),
            doc_count,
            strategy,
            reduction: Reduction::Unreduced(stats),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    // --- Accessors ---

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn stats(&self) -> &StreamingStats {
        self.reduction.stats()
    }

    pub fn reduction(&self) -> &Reduction<S::Output> {
        &self.reduction
    }

    /// The cached result, present only after [`finalize`](Self::finalize).
    pub fn result(&self) -> Option<&S::Output> {
        self.reduction.result()
    }

    pub fn is_reduced(&self) -> bool {
        self.reduction.is_reduced()
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.metadata.as_ref()
    }

    // --- Lifecycle ---

    /// Count one document and fold its values into the statistics.
    ///
    /// A document without values still counts towards `doc_count`.
    /// Collecting into a reduced state drops its cached result.
    pub fn collect<I, K>(&mut self, values: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        if self.reduction.is_reduced() {
            let reduction = std::mem::take(&mut self.reduction);
            self.reduction = Reduction::Unreduced(reduction.into_stats());
        }
        self.doc_count = self.doc_count.saturating_add(1);
        if let Reduction::Unreduced(stats) = &mut self.reduction {
            stats.accumulate(values);
        }
    }

    /// Combine two sibling states into a new unreduced state.
    ///
    /// Both operands are consumed. The name and metadata of `self` are kept.
    ///
    /// # Errors
    /// - [`PcaError::SchemaMismatch`] if the strategies are configured
    ///   differently.
    /// - [`SerializationError::Inconsistent`] if the document counts
    ///   overflow `u64`.
    pub fn merge(self, other: Self) -> Result<Self> {
        if !self.strategy.is_compatible(&other.strategy) {
            return Err(PcaError::SchemaMismatch {
                left: self.strategy.describe(),
                right: other.strategy.describe(),
            });
        }

        let stats = self.reduction.stats().merge(other.reduction.stats());
        let doc_count = self.doc_count.checked_add(other.doc_count).ok_or_else(|| {
            SerializationError::Inconsistent(format!(
                "doc_count overflow merging {} and {}",
                self.doc_count, other.doc_count
            ))
        })?;
        log::trace!(
            "merged `{}`: {} docs, {} fields",
            self.name,
            doc_count,
            stats.num_fields()
        );

        Ok(Self {
            name: self.name,
            doc_count,
            strategy: self.strategy,
            reduction: Reduction::Unreduced(stats),
            metadata: self.metadata,
        })
    }

    /// Compute and cache the result. A reduced state is returned unchanged.
    pub fn finalize(self) -> Result<Self> {
        if self.is_reduced() {
            return Ok(self);
        }

        let Self {
            name,
            doc_count,
            strategy,
            reduction,
            metadata,
        } = self;
        let stats = reduction.into_stats();
        log::debug!(
            "finalizing {} `{}`: {} docs, {} fields",
            S::KIND,
            name,
            doc_count,
            stats.num_fields()
        );
        let result = strategy.compute(&stats)?;

        Ok(Self {
            name,
            doc_count,
            strategy,
            reduction: Reduction::Reduced { stats, result },
            metadata,
        })
    }

    /// Render the finalized state as a JSON document.
    ///
    /// # Errors
    /// [`PcaError::NotFinalized`] if [`finalize`](Self::finalize) has not run.
    pub fn render(&self) -> Result<Value> {
        let result = self
            .reduction
            .result()
            .ok_or_else(|| PcaError::NotFinalized(self.name.clone()))?;

        let mut doc = Map::new();
        doc.insert("doc_count".to_string(), Value::from(self.doc_count));
        self.strategy.render(result, &mut doc);
        if let Some(meta) = &self.metadata {
            doc.insert("meta".to_string(), Value::Object(meta.clone()));
        }
        Ok(Value::Object(doc))
    }
}

impl<S: MatrixStrategy> Writeable for AggregationState<S> {
    fn write_to<W: StreamOutput + ?Sized>(&self, out: &mut W) {
        out.write_string(&self.name);
        out.write_u64(self.doc_count);
        self.reduction.stats().write_to(out);
        match self.reduction.result() {
            Some(result) => {
                out.write_bool(true);
                result.write_to(out);
            }
            None => out.write_bool(false),
        }
        self.strategy.write_config(out);
        let meta = self
            .metadata
            .as_ref()
            .map(|m| Value::Object(m.clone()).to_string());
        out.write_optional_string(meta.as_deref());
    }
}

impl<S: MatrixStrategy> Readable for AggregationState<S> {
    fn read_from<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self> {
        let name = input.read_string()?;
        let doc_count = input.read_u64()?;
        let stats = StreamingStats::read_from(input)?;
        let result = if input.read_bool()? {
            Some(S::Output::read_from(input)?)
        } else {
            None
        };
        let strategy = S::read_config(input)?;
        let metadata = match input.read_optional_string()? {
            Some(json) => Some(serde_json::from_str::<Map<String, Value>>(&json)?),
            None => None,
        };

        let reduction = match result {
            Some(result) => Reduction::Reduced { stats, result },
            None => Reduction::Unreduced(stats),
        };
        Ok(Self {
            name,
            doc_count,
            strategy,
            reduction,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::PcaStrategy;
    use crate::kernel::{from_bytes, to_bytes};
    use serde_json::json;

    fn partition(offset: f64, n: usize, use_covariance: bool) -> AggregationState<PcaStrategy> {
        let mut state = AggregationState::new("pca", PcaStrategy::new(use_covariance));
        for i in 0..n {
            let t = i as f64 + offset;
            state.collect([("x", t), ("y", 3.0 - 0.5 * t + (t * 0.9).sin())]);
        }
        state
    }

    #[test]
    fn test_merge_sums_counts_and_stays_unreduced() {
        let merged = partition(0.0, 4, true)
            .merge(partition(10.0, 6, true))
            .unwrap();
        assert_eq!(merged.doc_count(), 10);
        assert_eq!(merged.stats().field("x").unwrap().count, 10);
        assert!(!merged.is_reduced());
        assert!(merged.result().is_none());
    }

    #[test]
    fn test_merge_drops_cached_result() {
        let reduced = partition(0.0, 5, false).finalize().unwrap();
        assert!(reduced.is_reduced());
        let merged = reduced.merge(partition(1.0, 5, false)).unwrap();
        assert!(!merged.is_reduced());
    }

    #[test]
    fn test_schema_mismatch() {
        let err = partition(0.0, 3, true)
            .merge(partition(0.0, 3, false))
            .unwrap_err();
        match err {
            PcaError::SchemaMismatch { left, right } => {
                assert_eq!(left, "pca(use_covariance=true)");
                assert_eq!(right, "pca(use_covariance=false)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_doc_count_overflow_rejected() {
        let huge = AggregationState::from_stats(
            "pca",
            u64::MAX,
            StreamingStats::new(),
            PcaStrategy::new(true),
        );
        let err = huge.merge(partition(0.0, 1, true)).unwrap_err();
        assert!(matches!(
            err,
            PcaError::Serialization(SerializationError::Inconsistent(_))
        ));

        let mut full = AggregationState::from_stats(
            "pca",
            u64::MAX,
            StreamingStats::new(),
            PcaStrategy::new(true),
        );
        full.collect([("x", 1.0)]);
        assert_eq!(full.doc_count(), u64::MAX);
    }

    #[test]
    fn test_finalize_idempotent() {
        let once = partition(0.0, 12, true).finalize().unwrap();
        let first = once.result().cloned();
        let twice = once.finalize().unwrap();
        assert_eq!(twice.result().cloned(), first);
        assert_eq!(twice.render().unwrap(), twice.clone().finalize().unwrap().render().unwrap());
    }

    #[test]
    fn test_render_before_finalize() {
        let err = partition(0.0, 3, true).render().unwrap_err();
        assert!(matches!(err, PcaError::NotFinalized(ref name) if name == "pca"));
    }

    #[test]
    fn test_render_pca_document() {
        let doc = partition(0.0, 20, true).finalize().unwrap().render().unwrap();
        assert_eq!(doc["doc_count"], 20);
        assert_eq!(doc["fields"], json!(["x", "y"]));
        let pc = doc["pc"].as_array().unwrap();
        assert_eq!(pc.len(), 2);
        for c in pc {
            assert_eq!(c["eigenvector"].as_array().unwrap().len(), 2);
            assert!(c["eigenvalue"].is_f64());
        }
        assert!(doc.get("degenerate_fields").is_none());
        assert!(doc.get("meta").is_none());
    }

    #[test]
    fn test_render_zero_fields() {
        let mut state = AggregationState::new("pca", PcaStrategy::new(true));
        state.collect(Vec::<(&str, f64)>::new());
        state.collect(Vec::<(&str, f64)>::new());
        let doc = state.finalize().unwrap().render().unwrap();
        assert_eq!(doc, json!({"doc_count": 2}));

        let empty = AggregationState::new("pca", PcaStrategy::new(false));
        assert_eq!(
            empty.finalize().unwrap().render().unwrap(),
            json!({"doc_count": 0})
        );
    }

    #[test]
    fn test_collect_after_finalize_demotes() {
        let mut state = partition(0.0, 5, true).finalize().unwrap();
        state.collect([("x", 100.0), ("y", -1.0)]);
        assert!(!state.is_reduced());
        assert_eq!(state.doc_count(), 6);
        assert_eq!(state.stats().field("x").unwrap().count, 6);
    }

    #[test]
    fn test_round_trip_unreduced() {
        let state = partition(2.0, 9, true);
        let restored: AggregationState<PcaStrategy> = from_bytes(&to_bytes(&state)).unwrap();
        assert_eq!(restored.name(), state.name());
        assert_eq!(restored.doc_count(), state.doc_count());
        assert_eq!(restored.stats(), state.stats());
        assert!(restored.strategy().use_covariance());
        assert!(!restored.is_reduced());
    }

    #[test]
    fn test_round_trip_reduced_with_metadata() {
        let mut meta = Map::new();
        meta.insert("owner".to_string(), json!("analytics"));
        let state = partition(0.0, 15, false)
            .with_metadata(meta.clone())
            .finalize()
            .unwrap();

        let restored: AggregationState<PcaStrategy> = from_bytes(&to_bytes(&state)).unwrap();
        assert!(restored.is_reduced());
        assert_eq!(restored.result(), state.result());
        assert!(!restored.strategy().use_covariance());
        assert_eq!(restored.metadata(), Some(&meta));
        assert_eq!(restored.render().unwrap(), state.render().unwrap());
        assert_eq!(restored.render().unwrap()["meta"]["owner"], "analytics");
    }

    #[test]
    fn test_truncated_state_rejected() {
        let bytes = to_bytes(&partition(0.0, 4, true));
        for cut in [0, 1, bytes.len() / 2, bytes.len() - 1] {
            let err = from_bytes::<AggregationState<PcaStrategy>>(&bytes[..cut]).unwrap_err();
            assert!(matches!(
                err,
                PcaError::Serialization(SerializationError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = to_bytes(&partition(0.0, 4, true));
        bytes.push(0);
        let err = from_bytes::<AggregationState<PcaStrategy>>(&bytes).unwrap_err();
        assert!(matches!(
            err,
            PcaError::Serialization(SerializationError::TrailingBytes(1))
        ));
    }
}
