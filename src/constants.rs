/// Boltzmann constant in kcal/(mol K), the energy unit of AMBER GaMD logs.
pub const BOLTZMANN_KCAL_MOL_K: f64 = 0.0019872041;

/// Marker stored in free-energy cells of bins without reweighted population.
pub const UNDEFINED_FREE_ENERGY: f64 = f64::INFINITY;

/// Column names of the two boost terms written by AMBER dual-boost GaMD.
pub const AMBER_BOOST_COLUMNS: [&str; 2] = ["Boost-Energy-Potential", "Boost-Energy-Dihedral"];

/// Step column of an AMBER GaMD log.
pub const AMBER_STEP_COLUMN: &str = "total_nstep";

/// Largest grid, in total bins, accepted by the binning engine.
pub const MAX_GRID_BINS: usize = 1 << 24;
