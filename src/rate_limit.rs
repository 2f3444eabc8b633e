//! Optional per-cycle rate limiting of cable tensions.
//!
//! When enabled, the inequality right-hand side of the QP formulations is
//! tightened around the previous cycle's tensions so no cable is asked to
//! change by more than a configured delta in one cycle. The limiter is
//! disarmed until it has seen a first solution; while disarmed it writes
//! the plain tension box, which also discards caps left in the template
//! by cycles before a reset.

extern crate nalgebra as na;
use na::DVector;

use crate::parameters::RobotParameters;

pub struct RateLimiter {
    max_delta: f64,
    previous: Option<DVector<f64>>,
}

impl RateLimiter {
    pub fn new(max_delta: f64) -> Self {
        RateLimiter {
            max_delta,
            previous: None,
        }
    }

    /// Rewrites the tension rows of `d`. Armed, they tighten around the
    /// previous tensions: tau[i] ≤ min(tauMax, prev[i] + Δ) and
    /// tau[i] ≥ max(tauMin, prev[i] − Δ). Disarmed, they are restored to
    /// the plain box, so caps from before a reset cannot linger in the
    /// problem template.
    pub fn tighten(&self, d: &mut DVector<f64>, params: &RobotParameters) {
        let n = params.cables;
        match &self.previous {
            Some(previous) => {
                for i in 0..n {
                    d[i] = params.tau_max.min(previous[i] + self.max_delta);
                    d[i + n] = -params.tau_min.max(previous[i] - self.max_delta);
                }
            }
            None => {
                for i in 0..n {
                    d[i] = params.tau_max;
                    d[i + n] = -params.tau_min;
                }
            }
        }
    }

    /// Remembers the tensions just produced, arming the limiter for the
    /// next cycle.
    pub fn record(&mut self, tau: &DVector<f64>) {
        match &mut self.previous {
            Some(previous) => previous.copy_from(tau),
            None => self.previous = Some(tau.clone()),
        }
    }

    /// Forgets the previous solution, e.g. after the robot was re-homed.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> RobotParameters {
        RobotParameters::new(8, 100.0, 0.0, 100.0).unwrap()
    }

    #[test]
    fn test_disarmed_restores_plain_box() {
        let limiter = RateLimiter::new(0.5);
        let mut d = DVector::from_element(16, 7.0);
        limiter.tighten(&mut d, &params());
        for i in 0..8 {
            assert_eq!(d[i], 100.0);
            assert_eq!(d[i + 8], -0.0);
        }
    }

    #[test]
    fn test_tightens_around_previous() {
        let mut limiter = RateLimiter::new(0.5);
        limiter.record(&DVector::from_element(8, 10.0));
        let p = params();
        let mut d = DVector::zeros(16);
        for i in 0..8 {
            d[i] = p.tau_max;
            d[i + 8] = -p.tau_min;
        }
        limiter.tighten(&mut d, &p);
        for i in 0..8 {
            assert_eq!(d[i], 10.5);
            assert_eq!(d[i + 8], -9.5);
        }
    }

    #[test]
    fn test_never_widens_beyond_box() {
        let mut limiter = RateLimiter::new(50.0);
        limiter.record(&DVector::from_element(8, 90.0));
        let p = params();
        let mut d = DVector::zeros(16);
        limiter.tighten(&mut d, &p);
        for i in 0..8 {
            assert_eq!(d[i], 100.0); // min(100, 140)
            assert_eq!(d[i + 8], -40.0);
        }
    }

    #[test]
    fn test_reset_discards_stale_caps() {
        let mut limiter = RateLimiter::new(0.5);
        let p = params();
        limiter.record(&DVector::from_element(8, 10.0));
        let mut d = DVector::zeros(16);
        limiter.tighten(&mut d, &p);
        assert_eq!(d[0], 10.5);

        // After a reset the tightened rows must not survive in d.
        limiter.reset();
        limiter.tighten(&mut d, &p);
        for i in 0..8 {
            assert_eq!(d[i], 100.0);
            assert_eq!(d[i + 8], -0.0);
        }
    }
}
