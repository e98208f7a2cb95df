//! Request-level configuration for a PCA aggregation.
//!
//! ```rust
//! use pca_stats::PcaConfig;
//!
//! let config = PcaConfig::from_json(r#"{"name": "pca_by_sensor", "use_covariance": true}"#).unwrap();
//! assert!(config.use_covariance);
//! assert_eq!(config.max_sweeps, pca_stats::kernel::DEFAULT_MAX_SWEEPS);
//! ```

use serde::{Deserialize, Serialize};

use crate::aggregation::{AggregationState, PcaStrategy};
use crate::error::Result;
use crate::kernel::{JacobiSolver, DEFAULT_MAX_SWEEPS};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PcaConfig {
    /// Aggregation name, echoed in logs and errors.
    pub name: String,
    /// `false` (default) decomposes the correlation matrix.
    pub use_covariance: bool,
    /// Jacobi sweep budget for the finalize step.
    pub max_sweeps: u32,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            name: "pca".to_string(),
            use_covariance: false,
            max_sweeps: DEFAULT_MAX_SWEEPS,
        }
    }
}

impl PcaConfig {
    /// Parse a JSON object; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn strategy(&self) -> PcaStrategy {
        PcaStrategy::new(self.use_covariance).with_solver(JacobiSolver::with_params(self.max_sweeps))
    }

    /// Fresh per-partition state for this configuration.
    pub fn new_state(&self) -> AggregationState<PcaStrategy> {
        AggregationState::new(self.name.clone(), self.strategy())
    }
}
