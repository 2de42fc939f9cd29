//! Histogram reweighting of GaMD trajectories with the second-order cumulant expansion.

pub mod binning;
pub mod cumulant;
pub mod free_energy;
pub mod reweight;

pub use binning::{bin_trajectory, BinnedTrajectory};
pub use cumulant::{BinStatistics, ReweightedBin};
pub use free_energy::{FreeEnergySurface, SurfaceCell};
pub use reweight::{reweight, BinReport, Degeneracy, Diagnostics, ReweightResult};
