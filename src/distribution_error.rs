//! Error types of the tension distributor.
//!
//! Only configuration problems are fatal; everything that can go wrong
//! during a control cycle is reported through
//! [`SolveStatus`](crate::distribution::SolveStatus) on the returned
//! distribution instead, so the cycle is never interrupted.

/// Fatal configuration errors, raised once when the distributor is built.
#[derive(Debug)]
pub enum ConfigError {
    TooFewCables { cables: usize, required: usize },
    /// The barycenter method projects the feasible polytope onto a
    /// 2-dimensional redundancy slice and therefore requires exactly
    /// 8 cables (redundancy order 2).
    UnsupportedRedundancy { cables: usize },
    InvalidTensionBounds { tau_min: f64, tau_max: f64 },
    NonPositiveMass { mass: f64 },
    NonPositiveRateLimit { delta: f64 },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ConfigError::TooFewCables { cables, required } =>
                write!(f, "Too few cables: {} provided, at least {} required", cables, required),
            ConfigError::UnsupportedRedundancy { cables } =>
                write!(f, "Barycenter method requires exactly 8 cables (2-D redundancy), got {}", cables),
            ConfigError::InvalidTensionBounds { tau_min, tau_max } =>
                write!(f, "Invalid tension bounds: tau_min {} must be below tau_max {}", tau_min, tau_max),
            ConfigError::NonPositiveMass { mass } =>
                write!(f, "Platform mass must be positive, got {}", mass),
            ConfigError::NonPositiveRateLimit { delta } =>
                write!(f, "Rate limit delta must be positive, got {}", delta),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-cycle usage errors: the caller handed the distributor inputs that
/// do not match its configuration. These indicate a programming error in
/// the surrounding control loop, not an infeasible robot state.
#[derive(Debug)]
pub enum DistributionError {
    /// The wrench matrix is not 6 x n for the configured cable count.
    WrenchMatrixShape { rows: usize, cols: usize, cables: usize },
    /// A wrench or error vector is not 6-dimensional.
    WrenchLength { len: usize },
    /// `distribute` was called on a distributor in gain-augmented mode,
    /// which needs the tracking errors; use `distribute_with_gains`.
    GainsRequired,
    /// `distribute_with_gains` was called on a distributor whose mode has
    /// no gain variables.
    GainsNotSupported,
}

impl std::fmt::Display for DistributionError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            DistributionError::WrenchMatrixShape { rows, cols, cables } =>
                write!(f, "Wrench matrix is {}x{}, expected 6x{}", rows, cols, cables),
            DistributionError::WrenchLength { len } =>
                write!(f, "Wrench vector has length {}, expected 6", len),
            DistributionError::GainsRequired =>
                write!(f, "Gain-augmented mode needs tracking errors, use distribute_with_gains"),
            DistributionError::GainsNotSupported =>
                write!(f, "distribute_with_gains is only valid in gain-augmented mode"),
        }
    }
}

impl std::error::Error for DistributionError {}
