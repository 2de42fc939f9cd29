//! Assignment of trajectory frames to a fixed-width CV grid.
//!
//! Bin `k` along a dimension covers `[lower + k * width, lower + (k + 1) * width)`,
//! so a frame sitting exactly on an edge goes to the upper bin. Bins are addressed
//! by `(i, j)` grid coordinates, stored row-major (`i * n_j + j`); 1-D grids have a
//! single column `j = 0`.

use log::{debug, warn};

use crate::config::{GridSpec, OutOfRangePolicy, ReweightConfig};
use crate::error::{ReweightError, Result};
use crate::trajectory::Trajectory;

/// Bin index along one dimension, or `None` when out of range and dropped.
pub fn locate(grid: &GridSpec, dim: usize, coordinate: f64, policy: OutOfRangePolicy) -> Option<usize> {
    let n_bins = grid.bin_counts[dim];
    if coordinate < grid.lower_bounds[dim] {
        return match policy {
            OutOfRangePolicy::Clip => Some(0),
            OutOfRangePolicy::Drop => None,
        };
    }
    if coordinate >= grid.upper_bound(dim) {
        return match policy {
            OutOfRangePolicy::Clip => Some(n_bins - 1),
            OutOfRangePolicy::Drop => None,
        };
    }

    let fraction = (coordinate - grid.lower_bounds[dim]) / grid.bin_widths[dim];
    let mut index = (fraction.floor() as usize).min(n_bins - 1);
    // the division can round across an edge; settle against the edges themselves
    while index + 1 < n_bins && grid.edge(dim, index + 1) <= coordinate {
        index += 1;
    }
    while index > 0 && grid.edge(dim, index) > coordinate {
        index -= 1;
    }
    Some(index)
}

fn in_range(grid: &GridSpec, dim: usize, coordinate: f64) -> bool {
    coordinate >= grid.lower_bounds[dim] && coordinate < grid.upper_bound(dim)
}

/// Boost-potential values grouped by bin, plus bookkeeping of what was binned.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedTrajectory {
    shape: (usize, usize),
    bins: Vec<Vec<f64>>,
    total_samples: usize,
    dropped_samples: usize,
    clipped_samples: usize,
}

impl BinnedTrajectory {
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    /// Boost values of every bin in row-major order; each list keeps trajectory order.
    pub fn bins(&self) -> &[Vec<f64>] {
        &self.bins
    }

    pub fn bin(&self, i: usize, j: usize) -> &[f64] {
        &self.bins[self.flat_index(i, j)]
    }

    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        i * self.shape.1 + j
    }

    pub fn grid_index(&self, flat: usize) -> (usize, usize) {
        (flat / self.shape.1, flat % self.shape.1)
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    /// Samples assigned to a bin, clipped ones included.
    pub fn processed_samples(&self) -> usize {
        self.total_samples - self.dropped_samples
    }

    pub fn dropped_samples(&self) -> usize {
        self.dropped_samples
    }

    pub fn clipped_samples(&self) -> usize {
        self.clipped_samples
    }
}

/// Groups the boost potential of every frame by CV bin.
pub fn bin_trajectory(trajectory: &Trajectory, config: &ReweightConfig) -> Result<BinnedTrajectory> {
    let grid = &config.grid;
    grid.validate()?;
    if trajectory.cv_dim() != grid.cv_dim {
        return Err(ReweightError::invalid_config(format!(
            "grid has {} dimensions but the trajectory has {} CV columns",
            grid.cv_dim,
            trajectory.cv_dim()
        )));
    }

    let shape = grid.shape();
    let policy = config.out_of_range_policy;
    let mut bins = vec![Vec::new(); shape.0 * shape.1];
    let mut dropped_samples = 0;
    let mut clipped_samples = 0;

    for (row, &boost) in trajectory.boost().iter().enumerate() {
        let mut index = [0usize; 2];
        let mut outside = false;
        let mut located = true;
        for dim in 0..grid.cv_dim {
            let coordinate = trajectory.cv(dim)[row];
            outside |= !in_range(grid, dim, coordinate);
            match locate(grid, dim, coordinate, policy) {
                Some(bin) => index[dim] = bin,
                None => located = false,
            }
        }
        if !located {
            dropped_samples += 1;
            continue;
        }
        if outside {
            clipped_samples += 1;
        }
        bins[index[0] * shape.1 + index[1]].push(boost);
    }

    if dropped_samples > 0 {
        warn!(
            "dropped {dropped_samples} of {} samples outside the CV grid",
            trajectory.len()
        );
    }
    if clipped_samples > 0 {
        debug!("clipped {clipped_samples} samples onto edge bins");
    }

    Ok(BinnedTrajectory {
        shape,
        bins,
        total_samples: trajectory.len(),
        dropped_samples,
        clipped_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trajectory_1d(cv: &[f64]) -> Trajectory {
        Trajectory::new(
            (0..cv.len()).map(|i| i as f64).collect(),
            (0..cv.len()).map(|i| i as f64 * 0.5).collect(),
            vec!["x".to_string()],
            vec![cv.to_vec()],
        )
        .unwrap()
    }

    #[test]
    fn boundary_goes_to_upper_bin() {
        let grid = GridSpec::one_d(0.0, 0.5, 4);
        assert_eq!(locate(&grid, 0, 0.0, OutOfRangePolicy::Drop), Some(0));
        assert_eq!(locate(&grid, 0, 0.5, OutOfRangePolicy::Drop), Some(1));
        assert_eq!(locate(&grid, 0, 0.4999, OutOfRangePolicy::Drop), Some(0));
        assert_eq!(locate(&grid, 0, 1.5, OutOfRangePolicy::Drop), Some(3));
        assert_eq!(locate(&grid, 0, 2.0, OutOfRangePolicy::Drop), None);
        assert_eq!(locate(&grid, 0, -0.01, OutOfRangePolicy::Drop), None);
    }

    #[test]
    fn boundary_agrees_with_computed_edges() {
        // 0.1 is not representable, so edges are whatever lower + k * width gives
        let grid = GridSpec::one_d(0.0, 0.1, 10);
        for k in 1..10 {
            let edge = grid.edge(0, k);
            assert_eq!(locate(&grid, 0, edge, OutOfRangePolicy::Drop), Some(k));
            let below = f64::from_bits(edge.to_bits() - 1);
            assert_eq!(locate(&grid, 0, below, OutOfRangePolicy::Drop), Some(k - 1));
        }
    }

    #[test]
    fn clip_assigns_edge_bins() {
        let grid = GridSpec::one_d(-1.0, 0.5, 4);
        assert_eq!(locate(&grid, 0, -7.0, OutOfRangePolicy::Clip), Some(0));
        assert_eq!(locate(&grid, 0, 1.0, OutOfRangePolicy::Clip), Some(3));
        assert_eq!(locate(&grid, 0, 99.0, OutOfRangePolicy::Clip), Some(3));
    }

    #[test]
    fn drop_counts_out_of_range_samples() {
        let trajectory = trajectory_1d(&[-0.5, 0.1, 0.6, 0.7, 2.0, 5.0]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 0.5, 4));
        let binned = bin_trajectory(&trajectory, &config).unwrap();

        assert_eq!(binned.total_samples(), 6);
        assert_eq!(binned.dropped_samples(), 3);
        assert_eq!(binned.processed_samples(), 3);
        assert_eq!(binned.clipped_samples(), 0);
        assert_eq!(binned.bin(0, 0), &[0.5]);
        assert_eq!(binned.bin(1, 0), &[1.0, 1.5]);
        assert!(binned.bin(2, 0).is_empty());
    }

    #[test]
    fn clip_keeps_every_sample() {
        let trajectory = trajectory_1d(&[-0.5, 0.1, 0.6, 0.7, 2.0, 5.0]);
        let config = ReweightConfig::new(300.0, GridSpec::one_d(0.0, 0.5, 4))
            .with_out_of_range_policy(OutOfRangePolicy::Clip);
        let binned = bin_trajectory(&trajectory, &config).unwrap();

        assert_eq!(binned.dropped_samples(), 0);
        assert_eq!(binned.clipped_samples(), 3);
        assert_eq!(binned.bin(0, 0), &[0.0, 0.5]);
        assert_eq!(binned.bin(3, 0), &[2.0, 2.5]);
    }

    #[test]
    fn two_dimensional_layout_is_row_major() {
        let trajectory = Trajectory::new(
            vec![0.0, 1.0, 2.0],
            vec![1.0, 2.0, 3.0],
            vec!["phi".to_string(), "psi".to_string()],
            vec![vec![0.25, 1.5, 1.5], vec![0.75, 0.0, 9.0]],
        )
        .unwrap();
        let config = ReweightConfig::new(300.0, GridSpec::two_d([0.0, 0.0], [1.0, 0.5], [2, 3]));
        let binned = bin_trajectory(&trajectory, &config).unwrap();

        assert_eq!(binned.shape(), (2, 3));
        assert_eq!(binned.bin(0, 1), &[1.0]);
        assert_eq!(binned.bin(1, 0), &[2.0]);
        // second coordinate out of range drops the whole sample
        assert_eq!(binned.dropped_samples(), 1);
        assert_eq!(binned.flat_index(1, 2), 5);
        assert_eq!(binned.grid_index(5), (1, 2));
    }

    #[test]
    fn rejects_dimension_mismatch() {
        let trajectory = trajectory_1d(&[0.0]);
        let config = ReweightConfig::new(300.0, GridSpec::two_d([0.0; 2], [1.0; 2], [2; 2]));
        assert!(matches!(
            bin_trajectory(&trajectory, &config),
            Err(ReweightError::InvalidConfiguration(_))
        ));
    }
}
