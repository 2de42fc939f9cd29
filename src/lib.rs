//! Reweighting of Gaussian-accelerated Molecular Dynamics (GaMD) trajectories.
//!
//! GaMD adds a boost potential ΔV to every frame, so the sampled distribution is
//! biased. Per bin of one or two collective variables, the unbiased population is
//! recovered with the second-order cumulant expansion
//!
//! ```text
//! n_unbiased = n_biased * exp(β <ΔV> + β²/2 σ²(ΔV)),    β = 1 / (k_B T)
//! ```
//!
//! and turned into a free-energy surface `F = -k_B T ln P`, shifted so its minimum
//! is zero.
//!
//! ```no_run
//! use gamd_reweight::{read_gamd_logs, reweight, ColumnSelection, ReweightConfig, Trajectory};
//!
//! # fn main() -> gamd_reweight::Result<()> {
//! let table = read_gamd_logs(&["md1/gamd.log", "md2/gamd.log"])?;
//! let columns = ColumnSelection::new(
//!     ["Boost-Energy-Potential", "Boost-Energy-Dihedral"],
//!     ["phi"],
//! );
//! let trajectory = Trajectory::from_table(&table, &columns)?;
//! let config = ReweightConfig::from_json_file("reweight.json")?;
//! let result = reweight(&trajectory, &config)?;
//! println!("{}", result.diagnostics);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod gamd_log;
pub mod stat_mech;
pub mod trajectory;

pub use config::{GridSpec, OutOfRangePolicy, ReweightConfig, VarianceConvention};
pub use error::{ReweightError, Result};
pub use gamd_log::{read_cv_table, read_gamd_log, read_gamd_logs, LogTable};
pub use stat_mech::{reweight, Degeneracy, Diagnostics, FreeEnergySurface, ReweightResult};
pub use trajectory::{ColumnSelection, Sample, Trajectory};
