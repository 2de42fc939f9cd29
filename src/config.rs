//! Run configuration for a reweighting pass.
//!
//! The configuration is passed explicitly into every call of the core; nothing is
//! held as process-wide state. It can be built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "temperature_K": 300.0,
//!   "grid": { "cv_dim": 1, "lower_bounds": [-180.0], "bin_widths": [6.0], "bin_counts": [60] },
//!   "out_of_range_policy": "drop",
//!   "variance_convention": "population"
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{BOLTZMANN_KCAL_MOL_K, MAX_GRID_BINS};
use crate::error::{ReweightError, Result};

/// What to do with samples whose CV values fall outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutOfRangePolicy {
    /// Assign the sample to the nearest edge bin.
    Clip,
    /// Exclude the sample and count it as dropped.
    #[default]
    Drop,
}

/// Normalization of the per-bin boost-potential variance.
///
/// For a single-sample bin both conventions give a variance of zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceConvention {
    /// Divide the sum of squared deviations by `n`.
    #[default]
    Population,
    /// Divide by `n - 1` (unbiased estimator).
    Sample,
}

/// Fixed-width histogram grid over one or two collective variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub cv_dim: usize,
    pub lower_bounds: Vec<f64>,
    pub bin_widths: Vec<f64>,
    pub bin_counts: Vec<usize>,
}

impl GridSpec {
    pub fn one_d(lower_bound: f64, bin_width: f64, bin_count: usize) -> Self {
        Self {
            cv_dim: 1,
            lower_bounds: vec![lower_bound],
            bin_widths: vec![bin_width],
            bin_counts: vec![bin_count],
        }
    }

    pub fn two_d(lower_bounds: [f64; 2], bin_widths: [f64; 2], bin_counts: [usize; 2]) -> Self {
        Self {
            cv_dim: 2,
            lower_bounds: lower_bounds.to_vec(),
            bin_widths: bin_widths.to_vec(),
            bin_counts: bin_counts.to_vec(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.cv_dim != 1 && self.cv_dim != 2 {
            return Err(ReweightError::invalid_config(format!(
                "cv_dim must be 1 or 2, got {}",
                self.cv_dim
            )));
        }
        for (field, len) in [
            ("lower_bounds", self.lower_bounds.len()),
            ("bin_widths", self.bin_widths.len()),
            ("bin_counts", self.bin_counts.len()),
        ] {
            if len != self.cv_dim {
                return Err(ReweightError::invalid_config(format!(
                    "{field} has {len} entries but cv_dim is {}",
                    self.cv_dim
                )));
            }
        }
        for dim in 0..self.cv_dim {
            let lower = self.lower_bounds[dim];
            let width = self.bin_widths[dim];
            if !lower.is_finite() {
                return Err(ReweightError::invalid_config(format!(
                    "lower bound of dimension {dim} must be finite"
                )));
            }
            if !(width.is_finite() && width > 0.0) {
                return Err(ReweightError::invalid_config(format!(
                    "bin width of dimension {dim} must be larger than zero, got {width}"
                )));
            }
            if self.bin_counts[dim] == 0 {
                return Err(ReweightError::invalid_config(format!(
                    "bin count of dimension {dim} must be at least 1"
                )));
            }
            if !self.upper_bound(dim).is_finite() {
                return Err(ReweightError::invalid_config(format!(
                    "upper bound of dimension {dim} overflows"
                )));
            }
        }
        match self.checked_n_bins() {
            Some(total) if total <= MAX_GRID_BINS => Ok(()),
            Some(total) => Err(ReweightError::invalid_config(format!(
                "grid has {total} bins, more than the limit of {MAX_GRID_BINS}"
            ))),
            None => Err(ReweightError::invalid_config(format!(
                "total bin count of {:?} overflows",
                self.bin_counts
            ))),
        }
    }

    /// Grid shape as `(bins along CV 1, bins along CV 2)`; 1-D grids have a second
    /// extent of one.
    pub fn shape(&self) -> (usize, usize) {
        match self.cv_dim {
            2 => (self.bin_counts[0], self.bin_counts[1]),
            _ => (self.bin_counts[0], 1),
        }
    }

    /// Product of the bin counts, `None` on overflow.
    pub fn checked_n_bins(&self) -> Option<usize> {
        self.bin_counts
            .iter()
            .try_fold(1usize, |total, &count| total.checked_mul(count))
    }

    /// Total number of bins; saturates for grids that fail [`validate`](Self::validate).
    pub fn n_bins(&self) -> usize {
        self.checked_n_bins().unwrap_or(usize::MAX)
    }

    /// Lower edge of bin `index` along `dim`.
    ///
    /// Edges are always computed as `lower + index * width` so that binning and
    /// reporting agree on where a boundary lies.
    pub fn edge(&self, dim: usize, index: usize) -> f64 {
        self.lower_bounds[dim] + index as f64 * self.bin_widths[dim]
    }

    pub fn upper_bound(&self, dim: usize) -> f64 {
        self.edge(dim, self.bin_counts[dim])
    }

    pub fn bin_center(&self, dim: usize, index: usize) -> f64 {
        self.lower_bounds[dim] + (index as f64 + 0.5) * self.bin_widths[dim]
    }
}

fn default_boltzmann_constant() -> f64 {
    BOLTZMANN_KCAL_MOL_K
}

fn default_min_samples_per_bin() -> usize {
    1
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReweightConfig {
    /// Simulation temperature in kelvin.
    #[serde(rename = "temperature_K")]
    pub temperature: f64,
    pub grid: GridSpec,
    #[serde(default)]
    pub out_of_range_policy: OutOfRangePolicy,
    #[serde(default)]
    pub variance_convention: VarianceConvention,
    /// Boltzmann constant in the energy unit of the boost potential per kelvin.
    #[serde(default = "default_boltzmann_constant")]
    pub boltzmann_constant: f64,
    /// Bins with fewer samples are treated as unpopulated.
    #[serde(default = "default_min_samples_per_bin")]
    pub min_samples_per_bin: usize,
    /// Compute per-bin statistics on the rayon thread pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl ReweightConfig {
    pub fn new(temperature: f64, grid: GridSpec) -> Self {
        Self {
            temperature,
            grid,
            out_of_range_policy: OutOfRangePolicy::default(),
            variance_convention: VarianceConvention::default(),
            boltzmann_constant: BOLTZMANN_KCAL_MOL_K,
            min_samples_per_bin: 1,
            parallel: true,
        }
    }

    pub fn with_out_of_range_policy(mut self, policy: OutOfRangePolicy) -> Self {
        self.out_of_range_policy = policy;
        self
    }

    pub fn with_variance_convention(mut self, convention: VarianceConvention) -> Self {
        self.variance_convention = convention;
        self
    }

    pub fn with_boltzmann_constant(mut self, boltzmann_constant: f64) -> Self {
        self.boltzmann_constant = boltzmann_constant;
        self
    }

    pub fn with_min_samples_per_bin(mut self, min_samples: usize) -> Self {
        self.min_samples_per_bin = min_samples;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ReweightError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Checks every field; called before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(ReweightError::invalid_config(format!(
                "temperature must be larger than zero, got {}",
                self.temperature
            )));
        }
        if !(self.boltzmann_constant.is_finite() && self.boltzmann_constant > 0.0) {
            return Err(ReweightError::invalid_config(format!(
                "boltzmann_constant must be larger than zero, got {}",
                self.boltzmann_constant
            )));
        }
        if self.min_samples_per_bin == 0 {
            return Err(ReweightError::invalid_config(
                "min_samples_per_bin must be at least 1",
            ));
        }
        self.grid.validate()
    }

    /// Thermal energy k_B T.
    pub fn kt(&self) -> f64 {
        self.boltzmann_constant * self.temperature
    }

    /// Inverse thermal energy 1 / (k_B T).
    pub fn beta(&self) -> f64 {
        1.0 / self.kt()
    }
}
