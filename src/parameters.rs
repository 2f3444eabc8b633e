//! Robot-side parameters the tension distributor is configured with.
//!
//! The kinematic and dynamic model of the robot lives outside this crate;
//! only the few scalars the distribution algorithms need are taken here,
//! validated once at construction time.

use crate::distribution_error::ConfigError;

/// Parameters of the cable robot relevant for tension distribution.
#[derive(Debug, Clone, Copy)]
pub struct RobotParameters {
    /// Number of cables driving the platform. Spatial redundancy requires
    /// at least 6 (the wrench is a 6-vector).
    pub cables: usize,

    /// Mass of the platform in kg. Enters the feasibility radius of the
    /// closed-form redistribution.
    pub mass: f64,

    /// Lower tension bound per cable, in N. Usually positive: cables can
    /// only pull, and a small pre-tension keeps them taut.
    pub tau_min: f64,

    /// Upper tension bound per cable, in N.
    pub tau_max: f64,
}

impl RobotParameters {
    /// Validates and creates the parameter set. Fails if the cable count
    /// leaves no 6-dimensional wrench coverage, the bounds are inverted
    /// or the mass is not positive.
    pub fn new(cables: usize, mass: f64, tau_min: f64, tau_max: f64) -> Result<Self, ConfigError> {
        if cables < 6 {
            return Err(ConfigError::TooFewCables { cables, required: 6 });
        }
        if !(tau_min < tau_max) {
            return Err(ConfigError::InvalidTensionBounds { tau_min, tau_max });
        }
        if !(mass > 0.0) {
            return Err(ConfigError::NonPositiveMass { mass });
        }
        Ok(RobotParameters {
            cables,
            mass,
            tau_min,
            tau_max,
        })
    }

    /// Midpoint of the tension range, the reference tension of the
    /// closed-form method.
    pub fn midrange(&self) -> f64 {
        (self.tau_max + self.tau_min) / 2.0
    }

    /// Redundancy order: degrees of freedom in tension space beyond those
    /// fixed by the wrench equality.
    pub fn redundancy(&self) -> usize {
        self.cables - 6
    }
}
