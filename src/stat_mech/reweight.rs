//! The full reweighting pass: validation, binning, per-bin cumulant reweighting
//! and free-energy assembly.

use std::fmt;

use log::{debug, info, warn};

use crate::config::ReweightConfig;
use crate::error::{ReweightError, Result};
use crate::stat_mech::binning::bin_trajectory;
use crate::stat_mech::cumulant::{reweight_bins, BinStatistics, ReweightedBin};
use crate::stat_mech::free_energy::FreeEnergySurface;
use crate::trajectory::Trajectory;

/// Conditions under which a valid run produces a degenerate surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// No bin kept any population; the surface is entirely undefined.
    NoPopulatedBins,
    /// Every retained sample sits in one bin, whose free energy is 0 by convention.
    SinglePopulatedBin { index: (usize, usize) },
}

impl fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degeneracy::NoPopulatedBins => write!(f, "no populated bins after filtering"),
            Degeneracy::SinglePopulatedBin { index } => {
                write!(f, "only one bin is populated: {index:?}")
            }
        }
    }
}

/// Per-bin outcome for a bin that received at least one sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinReport {
    pub index: (usize, usize),
    pub statistics: BinStatistics,
    pub ln_c2: f64,
    /// False when the bin has fewer samples than `min_samples_per_bin`.
    pub included: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Diagnostics {
    pub total_samples: usize,
    /// Samples that were assigned to a bin.
    pub processed_samples: usize,
    pub dropped_samples: usize,
    pub clipped_samples: usize,
    pub populated_bins: usize,
    pub zero_population_bins: usize,
    /// Bins with samples but fewer than `min_samples_per_bin`, left undefined.
    pub sparse_bins: usize,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} samples, {} processed, {} dropped, {} clipped; {} populated bins, {} empty, {} below threshold",
            self.total_samples,
            self.processed_samples,
            self.dropped_samples,
            self.clipped_samples,
            self.populated_bins,
            self.zero_population_bins,
            self.sparse_bins
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReweightResult {
    pub surface: FreeEnergySurface,
    /// Row-major over the grid; `None` for bins without samples.
    pub bins: Vec<Option<BinReport>>,
    pub diagnostics: Diagnostics,
    pub warnings: Vec<Degeneracy>,
}

impl ReweightResult {
    fn report(&self, i: usize, j: usize) -> Option<&BinReport> {
        let (_, n2) = self.surface.shape();
        self.bins.get(i * n2 + j).and_then(Option::as_ref)
    }

    pub fn bin_statistics(&self, i: usize, j: usize) -> Option<&BinStatistics> {
        self.report(i, j).map(|report| &report.statistics)
    }

    /// Cumulant reweighting factor `c2` of a bin with samples.
    pub fn reweighting_factor(&self, i: usize, j: usize) -> Option<f64> {
        self.report(i, j).map(|report| report.ln_c2.exp())
    }

    pub fn is_degenerate(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Runs the second-order cumulant reweighting of `trajectory` on the configured grid.
///
/// Configuration and input problems are reported before anything is computed;
/// degenerate but valid inputs produce a result carrying [`Degeneracy`] warnings.
pub fn reweight(trajectory: &Trajectory, config: &ReweightConfig) -> Result<ReweightResult> {
    config.validate()?;
    let beta = config.beta();

    let binned = bin_trajectory(trajectory, config)?;
    debug!(
        "binned {} of {} samples into {} bins",
        binned.processed_samples(),
        binned.total_samples(),
        binned.n_bins()
    );

    let reweighted = reweight_bins(
        binned.bins(),
        beta,
        config.variance_convention,
        config.parallel,
    );

    let mut bins = Vec::with_capacity(reweighted.len());
    let mut ln_weights = Vec::with_capacity(reweighted.len());
    let mut diagnostics = Diagnostics {
        total_samples: binned.total_samples(),
        processed_samples: binned.processed_samples(),
        dropped_samples: binned.dropped_samples(),
        clipped_samples: binned.clipped_samples(),
        ..Diagnostics::default()
    };

    for (flat, bin) in reweighted.iter().enumerate() {
        let index = binned.grid_index(flat);
        let Some(ReweightedBin {
            statistics,
            ln_c2,
            ln_weight,
        }) = *bin
        else {
            diagnostics.zero_population_bins += 1;
            bins.push(None);
            ln_weights.push(None);
            continue;
        };
        if !ln_weight.is_finite() {
            return Err(ReweightError::NumericOverflow {
                bin: index,
                detail: format!(
                    "ln c2 = {ln_c2} from mean {} and variance {}",
                    statistics.mean, statistics.variance
                ),
            });
        }

        let included = statistics.count >= config.min_samples_per_bin;
        if included {
            diagnostics.populated_bins += 1;
            ln_weights.push(Some(ln_weight));
        } else {
            diagnostics.sparse_bins += 1;
            ln_weights.push(None);
        }
        bins.push(Some(BinReport {
            index,
            statistics,
            ln_c2,
            included,
        }));
    }

    let surface = FreeEnergySurface::from_log_weights(&config.grid, &ln_weights, config.kt());

    let mut warnings = Vec::new();
    match diagnostics.populated_bins {
        0 => warnings.push(Degeneracy::NoPopulatedBins),
        1 => {
            if let Some(report) = bins.iter().flatten().find(|report| report.included) {
                warnings.push(Degeneracy::SinglePopulatedBin {
                    index: report.index,
                });
            }
        }
        _ => {}
    }
    for warning in &warnings {
        warn!("degenerate reweighting: {warning}");
    }

    info!("reweighted at {} K: {diagnostics}", config.temperature);

    Ok(ReweightResult {
        surface,
        bins,
        diagnostics,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridSpec, OutOfRangePolicy, VarianceConvention};
    use approx::assert_relative_eq;

    fn trajectory(cv: Vec<f64>, boost: Vec<f64>) -> Trajectory {
        Trajectory::new(
            (0..cv.len()).map(|i| i as f64).collect(),
            boost,
            vec!["x".to_string()],
            vec![cv],
        )
        .unwrap()
    }

    #[test]
    fn unbiased_histogram_is_plain_boltzmann_inversion() {
        let trajectory = trajectory(vec![0.25, 0.25, 0.25, 0.75], vec![0.0; 4]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 0.5, 2));
        let result = reweight(&trajectory, &config).unwrap();

        assert_eq!(result.reweighting_factor(0, 0), Some(1.0));
        assert_eq!(result.surface.free_energy(0, 0), Some(0.0));
        assert_relative_eq!(
            result.surface.free_energy(1, 0).unwrap(),
            config.kt() * 3f64.ln(),
            max_relative = 1e-12
        );
        assert_relative_eq!(result.surface.probability(0, 0), 0.75, max_relative = 1e-12);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn boost_shifts_free_energy_by_cumulant() {
        // equal raw counts, so F differences come from ln c2 alone
        let trajectory = trajectory(vec![0.25, 0.25, 0.75, 0.75], vec![1.0, 3.0, 0.0, 0.0]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 0.5, 2));
        let result = reweight(&trajectory, &config).unwrap();

        let beta = config.beta();
        let stats = result.bin_statistics(0, 0).unwrap();
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.variance, 1.0);
        let ln_c2 = beta * 2.0 + 0.5 * beta * beta;
        assert_relative_eq!(
            result.reweighting_factor(0, 0).unwrap(),
            ln_c2.exp(),
            max_relative = 1e-12
        );
        assert_eq!(result.surface.free_energy(0, 0), Some(0.0));
        assert_relative_eq!(
            result.surface.free_energy(1, 0).unwrap(),
            config.kt() * ln_c2,
            max_relative = 1e-12
        );
    }

    #[test]
    fn single_bin_warns_and_is_zero() {
        let trajectory = trajectory(vec![1.1, 1.2, 1.3], vec![0.5, 0.7, 0.9]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 1.0, 3));
        let result = reweight(&trajectory, &config).unwrap();

        assert_eq!(
            result.warnings,
            vec![Degeneracy::SinglePopulatedBin { index: (1, 0) }]
        );
        assert_eq!(result.surface.profile(), Some(vec![None, Some(0.0), None]));
        assert_eq!(result.diagnostics.zero_population_bins, 2);
        assert_eq!(
            result.warnings[0].to_string(),
            "only one bin is populated: (1, 0)"
        );
    }

    #[test]
    fn single_bin_warning_ignores_sparse_bins() {
        // the second bin holds a sample but sits below the threshold
        let trajectory = trajectory(vec![0.5, 0.5, 1.5], vec![0.0; 3]);
        let config =
            ReweightConfig::new(300.0, GridSpec::one_d(0.0, 1.0, 2)).with_min_samples_per_bin(2);
        let result = reweight(&trajectory, &config).unwrap();

        assert_eq!(
            result.warnings,
            vec![Degeneracy::SinglePopulatedBin { index: (0, 0) }]
        );
        assert_eq!(result.diagnostics.sparse_bins, 1);
        assert_eq!(
            Degeneracy::NoPopulatedBins.to_string(),
            "no populated bins after filtering"
        );
    }

    #[test]
    fn everything_dropped_gives_undefined_surface() {
        let trajectory = trajectory(vec![10.0, 11.0], vec![0.5, 0.7]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 1.0, 3));
        let result = reweight(&trajectory, &config).unwrap();

        assert_eq!(result.warnings, vec![Degeneracy::NoPopulatedBins]);
        assert_eq!(result.surface.defined_bins(), 0);
        assert_eq!(result.diagnostics.dropped_samples, 2);
        assert_eq!(result.diagnostics.processed_samples, 0);
    }

    #[test]
    fn sparse_bins_are_undefined_but_reported() {
        let trajectory = trajectory(vec![0.5, 0.5, 0.5, 1.5, 2.5, 2.5], vec![0.0; 6]);
        let config =
            ReweightConfig::new(300.0, GridSpec::one_d(0.0, 1.0, 3)).with_min_samples_per_bin(2);
        let result = reweight(&trajectory, &config).unwrap();

        assert_eq!(result.diagnostics.sparse_bins, 1);
        assert_eq!(result.diagnostics.populated_bins, 2);
        assert!(!result.surface.is_defined(1, 0));
        assert!(!result.bins[1].unwrap().included);
        assert_relative_eq!(result.surface.probability(0, 0), 0.6, max_relative = 1e-12);
    }

    #[test]
    fn invalid_temperature_fails_before_binning() {
        let trajectory = trajectory(vec![0.5], vec![0.0]);
        let config = ReweightConfig::new(-1.0, GridSpec::one_d(0.0, 1.0, 3));
        assert!(matches!(
            reweight(&trajectory, &config),
            Err(ReweightError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn oversized_grid_fails_before_allocating() {
        let trajectory = Trajectory::new(
            vec![0.0],
            vec![0.0],
            vec!["phi".to_string(), "psi".to_string()],
            vec![vec![0.5], vec![0.5]],
        )
        .unwrap();
        let config =
            ReweightConfig::new(300.0, GridSpec::two_d([0.0, 0.0], [1.0, 1.0], [1 << 33, 1 << 33]));
        assert!(matches!(
            reweight(&trajectory, &config),
            Err(ReweightError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn overflowing_cumulant_fails_the_run() {
        let trajectory = trajectory(vec![0.5, 0.5], vec![-1e200, 1e200]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 1.0, 1));
        assert!(matches!(
            reweight(&trajectory, &config),
            Err(ReweightError::NumericOverflow { bin: (0, 0), .. })
        ));
    }

    #[test]
    fn variance_convention_changes_small_bins() {
        let trajectory = trajectory(vec![0.5, 0.5, 1.5], vec![1.0, 2.0, 0.0]);
        let grid = GridSpec::one_d(0.0, 1.0, 2);
        let population = reweight(&trajectory, &ReweightConfig::new(300.0, grid.clone())).unwrap();
        let sample = reweight(
            &trajectory,
            &ReweightConfig::new(300.0, grid).with_variance_convention(VarianceConvention::Sample),
        )
        .unwrap();

        assert_eq!(population.bin_statistics(0, 0).unwrap().variance, 0.25);
        assert_eq!(sample.bin_statistics(0, 0).unwrap().variance, 0.5);
        // the single-sample bin is unaffected
        assert_eq!(
            population.bin_statistics(1, 0),
            sample.bin_statistics(1, 0)
        );
    }

    #[test]
    fn clip_counts_are_reported() {
        let trajectory = trajectory(vec![-3.0, 0.5, 9.0], vec![0.0; 3]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 1.0, 2))
            .with_out_of_range_policy(OutOfRangePolicy::Clip);
        let result = reweight(&trajectory, &config).unwrap();
        assert_eq!(result.diagnostics.clipped_samples, 2);
        assert_eq!(result.diagnostics.processed_samples, 3);
        assert_eq!(result.bin_statistics(0, 0).unwrap().count, 2);
    }
}
