//! Conversion of reweighted bin populations into a free-energy surface.

use itertools::iproduct;
use ndarray::Array2;

use crate::config::GridSpec;
use crate::constants::UNDEFINED_FREE_ENERGY;

/// One cell of a [`FreeEnergySurface`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCell {
    pub index: (usize, usize),
    /// Bin center along each CV; the second is `None` on a 1-D grid.
    pub center: (f64, Option<f64>),
    /// `None` for bins without reweighted population.
    pub free_energy: Option<f64>,
    pub probability: f64,
}

/// Free energy and probability per bin, congruent to the bin grid.
///
/// Arrays have shape `(n_1, n_2)`, with `n_2 = 1` for a 1-D grid. Bins without
/// population hold [`UNDEFINED_FREE_ENERGY`] and probability zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeEnergySurface {
    grid: GridSpec,
    free_energy: Array2<f64>,
    probability: Array2<f64>,
}

impl FreeEnergySurface {
    /// A surface with every bin undefined.
    pub fn undefined(grid: &GridSpec) -> Self {
        let shape = grid.shape();
        Self {
            grid: grid.clone(),
            free_energy: Array2::from_elem(shape, UNDEFINED_FREE_ENERGY),
            probability: Array2::zeros(shape),
        }
    }

    /// Normalizes log-populations and converts them to free energies.
    ///
    /// `ln_weights` is row-major over the grid; `None` entries are excluded from
    /// normalization and left undefined. With `w_max` the largest population,
    /// `F = -kT ln P + F_ref = kT (ln w_max - ln w)`, so the minimum is exactly 0.
    pub fn from_log_weights(grid: &GridSpec, ln_weights: &[Option<f64>], kt: f64) -> Self {
        let shape = grid.shape();
        debug_assert_eq!(ln_weights.len(), shape.0 * shape.1);

        let max = ln_weights
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return Self::undefined(grid);
        }
        // sequential in index order, so every run normalizes identically
        let log_normalization =
            max + ln_weights.iter().flatten().map(|w| (w - max).exp()).sum::<f64>().ln();

        let flat = |(i, j): (usize, usize)| ln_weights[i * shape.1 + j];
        Self {
            grid: grid.clone(),
            free_energy: Array2::from_shape_fn(shape, |index| match flat(index) {
                Some(w) => kt * (max - w),
                None => UNDEFINED_FREE_ENERGY,
            }),
            probability: Array2::from_shape_fn(shape, |index| match flat(index) {
                Some(w) => (w - log_normalization).exp(),
                None => 0.0,
            }),
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }

    pub fn free_energies(&self) -> &Array2<f64> {
        &self.free_energy
    }

    pub fn probabilities(&self) -> &Array2<f64> {
        &self.probability
    }

    pub fn free_energy(&self, i: usize, j: usize) -> Option<f64> {
        let value = self.free_energy[[i, j]];
        value.is_finite().then_some(value)
    }

    pub fn probability(&self, i: usize, j: usize) -> f64 {
        self.probability[[i, j]]
    }

    pub fn is_defined(&self, i: usize, j: usize) -> bool {
        self.free_energy[[i, j]].is_finite()
    }

    pub fn defined_bins(&self) -> usize {
        self.free_energy.iter().filter(|f| f.is_finite()).count()
    }

    /// Largest finite free energy, i.e. the highest populated point of the surface.
    pub fn max_free_energy(&self) -> Option<f64> {
        self.free_energy
            .iter()
            .copied()
            .filter(|f| f.is_finite())
            .reduce(f64::max)
    }

    /// Free-energy profile of a 1-D surface, `None` on 2-D grids.
    pub fn profile(&self) -> Option<Vec<Option<f64>>> {
        (self.grid.cv_dim == 1)
            .then(|| (0..self.shape().0).map(|i| self.free_energy(i, 0)).collect())
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = SurfaceCell> + '_ {
        let (n1, n2) = self.shape();
        iproduct!(0..n1, 0..n2).map(move |(i, j)| SurfaceCell {
            index: (i, j),
            center: (
                self.grid.bin_center(0, i),
                (self.grid.cv_dim == 2).then(|| self.grid.bin_center(1, j)),
            ),
            free_energy: self.free_energy(i, j),
            probability: self.probability(i, j),
        })
    }
}
