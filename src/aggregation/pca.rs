//! Principal component analysis over merged [`StreamingStats`].
//!
//! Finalize builds the covariance or correlation matrix of every usable
//! field and decomposes it once. The rendered document lists the fields in
//! matrix order followed by one `{eigenvalue, eigenvector}` entry per
//! component, largest eigenvalue first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::MatrixStrategy;
use crate::error::{NumericalError, PcaError, Result, SerializationError};
use crate::kernel::{
    JacobiSolver, MatrixBuilder, MatrixMode, Readable, StreamInput, StreamOutput, StreamingStats,
    Writeable,
};

/// One ranked component.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrincipalComponent {
    pub eigenvalue: f64,
    /// Unit norm, indexed like [`PcaResult::fields`].
    pub eigenvector: Vec<f64>,
}

/// Outcome of the eigen-decomposition step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decomposition {
    /// Sorted by eigenvalue, descending.
    Components(Vec<PrincipalComponent>),
    /// The solver ran out of sweeps; no components are reported.
    NotConverged { sweeps: u32 },
}

/// Immutable PCA snapshot produced by finalize.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PcaResult {
    fields: Vec<String>,
    counts: BTreeMap<String, u64>,
    degenerate: Vec<String>,
    decomposition: Decomposition,
}

impl PcaResult {
    /// Build the matrix for `mode` and decompose it.
    ///
    /// Solver non-convergence is recorded in the result rather than
    /// returned as an error; other numerical failures propagate.
    pub fn compute(stats: &StreamingStats, mode: MatrixMode, solver: &JacobiSolver) -> Result<Self> {
        let built = MatrixBuilder::build(stats, mode);
        if !built.degenerate.is_empty() {
            log::warn!(
                "excluding {} degenerate field(s) from PCA: {:?}",
                built.degenerate.len(),
                built.degenerate
            );
        }

        let decomposition = match solver.decompose(&built.matrix) {
            Ok(decomposed) => {
                log::debug!(
                    "decomposed {}x{} matrix in {} sweeps",
                    built.fields.len(),
                    built.fields.len(),
                    decomposed.sweeps
                );
                Decomposition::Components(
                    decomposed
                        .pairs
                        .into_iter()
                        .map(|p| PrincipalComponent {
                            eigenvalue: p.value,
                            eigenvector: p.vector,
                        })
                        .collect(),
                )
            }
            Err(PcaError::Numerical(NumericalError::NotConverged { sweeps })) => {
                log::warn!("PCA decomposition did not converge after {} sweeps", sweeps);
                Decomposition::NotConverged { sweeps }
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            fields: built.fields,
            counts: stats.counts(),
            degenerate: built.degenerate,
            decomposition,
        })
    }

    /// Fields in matrix order; eigenvector components follow this order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Observation count of every field seen, degenerate ones included.
    pub fn field_counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn field_count(&self, field: &str) -> Option<u64> {
        self.counts.get(field).copied()
    }

    /// Fields excluded from the matrix.
    pub fn degenerate_fields(&self) -> &[String] {
        &self.degenerate
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    pub fn converged(&self) -> bool {
        matches!(self.decomposition, Decomposition::Components(_))
    }

    /// Ranked components, `None` if the solver did not converge.
    pub fn components(&self) -> Option<&[PrincipalComponent]> {
        match &self.decomposition {
            Decomposition::Components(c) => Some(c),
            Decomposition::NotConverged { .. } => None,
        }
    }

    pub fn eigenvalue(&self, rank: usize) -> Option<f64> {
        self.components()?.get(rank).map(|c| c.eigenvalue)
    }

    pub fn eigenvector(&self, rank: usize) -> Option<&[f64]> {
        self.components()?.get(rank).map(|c| c.eigenvector.as_slice())
    }

    /// Share of total variance carried by each component.
    pub fn explained_variance_ratio(&self) -> Option<Vec<f64>> {
        let components = self.components()?;
        let total: f64 = components.iter().map(|c| c.eigenvalue).sum();
        if total <= 0.0 {
            return Some(vec![0.0; components.len()]);
        }
        Some(components.iter().map(|c| c.eigenvalue / total).collect())
    }
}

const TAG_COMPONENTS: u8 = 0;
const TAG_NOT_CONVERGED: u8 = 1;

impl Writeable for PcaResult {
    fn write_to<W: StreamOutput + ?Sized>(&self, out: &mut W) {
        out.write_string_slice(&self.fields);
        out.write_u64(self.counts.len() as u64);
        for (name, &count) in &self.counts {
            out.write_string(name);
            out.write_u64(count);
        }
        out.write_string_slice(&self.degenerate);

        match &self.decomposition {
            Decomposition::Components(components) => {
                out.write_u8(TAG_COMPONENTS);
                out.write_u64(components.len() as u64);
                for c in components {
                    out.write_f64(c.eigenvalue);
                    out.write_f64_slice(&c.eigenvector);
                }
            }
            Decomposition::NotConverged { sweeps } => {
                out.write_u8(TAG_NOT_CONVERGED);
                out.write_u64(u64::from(*sweeps));
            }
        }
    }
}

impl Readable for PcaResult {
    fn read_from<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self> {
        let fields = input.read_string_vec()?;
        let num_counts = input.read_len()?;
        let mut counts = BTreeMap::new();
        for _ in 0..num_counts {
            let name = input.read_string()?;
            counts.insert(name, input.read_u64()?);
        }
        let degenerate = input.read_string_vec()?;

        let decomposition = match input.read_u8()? {
            TAG_COMPONENTS => {
                let len = input.read_len()?;
                if len != fields.len() {
                    return Err(SerializationError::Inconsistent(format!(
                        "{} components for {} fields",
                        len,
                        fields.len()
                    ))
                    .into());
                }
                let mut components = Vec::with_capacity(len);
                for _ in 0..len {
                    let eigenvalue = input.read_f64()?;
                    let eigenvector = input.read_f64_vec()?;
                    if eigenvector.len() != fields.len() {
                        return Err(SerializationError::Inconsistent(format!(
                            "eigenvector of length {} for {} fields",
                            eigenvector.len(),
                            fields.len()
                        ))
                        .into());
                    }
                    components.push(PrincipalComponent {
                        eigenvalue,
                        eigenvector,
                    });
                }
                Decomposition::Components(components)
            }
            TAG_NOT_CONVERGED => {
                let sweeps = input.read_u64()?;
                let sweeps = u32::try_from(sweeps).map_err(|_| {
                    SerializationError::Inconsistent(format!("sweep count {} out of range", sweeps))
                })?;
                Decomposition::NotConverged { sweeps }
            }
            tag => {
                return Err(SerializationError::InvalidTag {
                    what: "pca decomposition",
                    tag,
                }
                .into())
            }
        };

        Ok(Self {
            fields,
            counts,
            degenerate,
            decomposition,
        })
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// PCA configuration carried by every state of one aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct PcaStrategy {
    mode: MatrixMode,
    solver: JacobiSolver,
}

impl PcaStrategy {
    /// `use_covariance = false` runs PCA on the correlation matrix.
    pub fn new(use_covariance: bool) -> Self {
        Self {
            mode: MatrixMode::from_use_covariance(use_covariance),
            solver: JacobiSolver::new(),
        }
    }

    pub fn with_solver(mut self, solver: JacobiSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn mode(&self) -> MatrixMode {
        self.mode
    }

    pub fn use_covariance(&self) -> bool {
        self.mode.uses_covariance()
    }

    pub fn solver(&self) -> &JacobiSolver {
        &self.solver
    }
}

impl MatrixStrategy for PcaStrategy {
    type Output = PcaResult;

    const KIND: &'static str = "pca";

    /// Only the matrix mode has to agree. Solver tuning may differ; a merge
    /// keeps the left operand's.
    fn is_compatible(&self, other: &Self) -> bool {
        self.mode == other.mode
    }

    fn describe(&self) -> String {
        format!("pca(use_covariance={})", self.use_covariance())
    }

    fn compute(&self, stats: &StreamingStats) -> Result<PcaResult> {
        PcaResult::compute(stats, self.mode, &self.solver)
    }

    fn render(&self, result: &PcaResult, doc: &mut Map<String, Value>) {
        if !result.fields.is_empty() {
            doc.insert("fields".to_string(), json!(result.fields));
            match &result.decomposition {
                Decomposition::Components(components) => {
                    let pc: Vec<Value> = components
                        .iter()
                        .map(|c| json!({"eigenvalue": c.eigenvalue, "eigenvector": c.eigenvector}))
                        .collect();
                    doc.insert("pc".to_string(), Value::Array(pc));
                }
                Decomposition::NotConverged { sweeps } => {
                    doc.insert(
                        "error".to_string(),
                        json!({
                            "type": "numerical_error",
                            "reason": NumericalError::NotConverged { sweeps: *sweeps }.to_string(),
                        }),
                    );
                }
            }
        }
        if !result.degenerate.is_empty() {
            doc.insert("degenerate_fields".to_string(), json!(result.degenerate));
        }
    }

    /// Optional `use_covariance` flag, then the optional sweep budget.
    /// Absent values decode to their defaults.
    fn write_config<W: StreamOutput + ?Sized>(&self, out: &mut W) {
        out.write_optional_bool(Some(self.use_covariance()));
        out.write_bool(true);
        out.write_u64(u64::from(self.solver.max_sweeps()));
    }

    fn read_config<R: StreamInput + ?Sized>(input: &mut R) -> Result<Self> {
        let mode = match input.read_optional_bool()? {
            Some(use_covariance) => MatrixMode::from_use_covariance(use_covariance),
            None => MatrixMode::default(),
        };
        let solver = if input.read_bool()? {
            let sweeps = input.read_u64()?;
            let sweeps = u32::try_from(sweeps).map_err(|_| {
                SerializationError::Inconsistent(format!("sweep budget {} out of range", sweeps))
            })?;
            JacobiSolver::with_params(sweeps)
        } else {
            JacobiSolver::new()
        };
        Ok(Self { mode, solver })
    }
}
