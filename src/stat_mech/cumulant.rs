//! Second-order cumulant expansion of the GaMD reweighting factor.
//!
//! For the frames of one bin with boost potential ΔV,
//!
//! ```text
//! <exp(β ΔV)> ≈ exp(β <ΔV> + β²/2 σ²(ΔV))
//! ```
//!
//! Everything here is kept in log space: the factor is stored as `ln c2` and the
//! reweighted population as `ln n + ln c2`, so sparsely sampled bins with a large
//! boost mean or variance never overflow before normalization.

use rayon::prelude::*;

use crate::config::VarianceConvention;

/// Count, mean and variance of the boost potential in one bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinStatistics {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
}

impl BinStatistics {
    /// Returns `None` for an empty bin.
    ///
    /// Values are summed in ascending order, which makes the result independent
    /// of the order frames were fed in. A single value has zero variance under
    /// either convention.
    pub fn from_values(values: &[f64], convention: VarianceConvention) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let variance = if count == 1 {
            0.0
        } else {
            let squared = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
            let denominator = match convention {
                VarianceConvention::Population => count,
                VarianceConvention::Sample => count - 1,
            };
            squared / denominator as f64
        };

        Some(Self {
            count,
            mean,
            variance,
        })
    }

    /// `ln c2 = β m + β²σ²/2`.
    pub fn log_reweighting_factor(&self, beta: f64) -> f64 {
        beta * self.mean + 0.5 * beta * beta * self.variance
    }

    /// `c2 = exp(β m + β²σ²/2)`; may overflow for extreme bins, unlike the log form.
    pub fn reweighting_factor(&self, beta: f64) -> f64 {
        self.log_reweighting_factor(beta).exp()
    }
}

/// A populated bin after reweighting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReweightedBin {
    pub statistics: BinStatistics,
    /// Natural log of the cumulant reweighting factor.
    pub ln_c2: f64,
    /// Natural log of the unbiased population, `ln n + ln c2`.
    pub ln_weight: f64,
}

impl ReweightedBin {
    pub fn from_values(values: &[f64], beta: f64, convention: VarianceConvention) -> Option<Self> {
        let statistics = BinStatistics::from_values(values, convention)?;
        let ln_c2 = statistics.log_reweighting_factor(beta);
        Some(Self {
            statistics,
            ln_c2,
            ln_weight: (statistics.count as f64).ln() + ln_c2,
        })
    }

    pub fn reweighting_factor(&self) -> f64 {
        self.ln_c2.exp()
    }

    pub fn unbiased_population(&self) -> f64 {
        self.ln_weight.exp()
    }
}

/// Reweights every bin independently; `None` marks empty bins.
///
/// Each bin is a pure function of its own values, so the parallel path returns
/// exactly what the sequential one does.
pub fn reweight_bins(
    bins: &[Vec<f64>],
    beta: f64,
    convention: VarianceConvention,
    parallel: bool,
) -> Vec<Option<ReweightedBin>> {
    if parallel {
        bins.par_iter()
            .map(|values| ReweightedBin::from_values(values, beta, convention))
            .collect()
    } else {
        bins.iter()
            .map(|values| ReweightedBin::from_values(values, beta, convention))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BOLTZMANN_KCAL_MOL_K;
    use approx::assert_relative_eq;

    #[test]
    fn zero_boost_gives_unit_factor() {
        let stats = BinStatistics::from_values(&[0.0; 25], VarianceConvention::Population).unwrap();
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.variance, 0.0);
        assert_eq!(stats.reweighting_factor(1.7), 1.0);
    }

    #[test]
    fn reproduces_closed_form_at_300k() {
        let beta = 1.0 / (BOLTZMANN_KCAL_MOL_K * 300.0);
        let stats = BinStatistics {
            count: 10,
            mean: 2.0,
            variance: 0.5,
        };
        let expected = (beta * 2.0 + 0.5 * beta * beta * 0.5).exp();
        assert_relative_eq!(stats.reweighting_factor(beta), expected, max_relative = 1e-12);
        assert_relative_eq!(stats.log_reweighting_factor(beta), expected.ln(), max_relative = 1e-12);
    }

    #[test]
    fn statistics_of_known_values() {
        // mean 2.0, squared deviations sum to 2.0 over three values
        let values = [1.0, 2.0, 3.0];
        let population = BinStatistics::from_values(&values, VarianceConvention::Population).unwrap();
        let sample = BinStatistics::from_values(&values, VarianceConvention::Sample).unwrap();
        assert_eq!(population.count, 3);
        assert_eq!(population.mean, 2.0);
        assert_relative_eq!(population.variance, 2.0 / 3.0, max_relative = 1e-15);
        assert_eq!(sample.variance, 1.0);
    }

    #[test]
    fn single_sample_has_zero_variance_under_both_conventions() {
        for convention in [VarianceConvention::Population, VarianceConvention::Sample] {
            let stats = BinStatistics::from_values(&[4.2], convention).unwrap();
            assert_eq!(stats.variance, 0.0);
            assert_eq!(stats.mean, 4.2);
        }
    }

    #[test]
    fn empty_bin_has_no_statistics() {
        assert!(BinStatistics::from_values(&[], VarianceConvention::Population).is_none());
        assert!(ReweightedBin::from_values(&[], 1.0, VarianceConvention::Population).is_none());
    }

    #[test]
    fn statistics_ignore_order() {
        let values = [0.1, 7.3, 2.2, 1e-3, 5.5, 3.3, 0.7];
        let mut reversed = values;
        reversed.reverse();
        let a = BinStatistics::from_values(&values, VarianceConvention::Sample).unwrap();
        let b = BinStatistics::from_values(&reversed, VarianceConvention::Sample).unwrap();
        assert_eq!(a.mean.to_bits(), b.mean.to_bits());
        assert_eq!(a.variance.to_bits(), b.variance.to_bits());
    }

    #[test]
    fn log_weight_survives_where_exp_overflows() {
        let beta = 1.0 / (BOLTZMANN_KCAL_MOL_K * 300.0);
        let bin = ReweightedBin::from_values(&[400.0, 600.0], beta, VarianceConvention::Population)
            .unwrap();
        assert!(bin.ln_weight.is_finite());
        assert!(bin.reweighting_factor().is_infinite());
        assert_relative_eq!(bin.ln_weight, 2f64.ln() + bin.ln_c2, max_relative = 1e-15);
    }

    #[test]
    fn parallel_matches_sequential_bitwise() {
        let bins: Vec<Vec<f64>> = (0..64)
            .map(|b| (0..b).map(|k| ((k * 37 + b * 11) % 23) as f64 * 0.173).collect())
            .collect();
        let beta = 1.0 / (BOLTZMANN_KCAL_MOL_K * 310.0);
        let sequential = reweight_bins(&bins, beta, VarianceConvention::Population, false);
        let parallel = reweight_bins(&bins, beta, VarianceConvention::Population, true);
        assert_eq!(sequential.len(), parallel.len());
        for (s, p) in sequential.iter().zip(&parallel) {
            assert_eq!(s.map(|b| b.ln_weight.to_bits()), p.map(|b| b.ln_weight.to_bits()));
        }
        assert!(sequential[0].is_none());
    }
}
