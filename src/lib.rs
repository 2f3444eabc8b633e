//! Tension distribution for redundant cable-driven parallel robots.
//!
//! A cable-driven parallel robot moves its platform with more cables than
//! the six degrees of freedom of a spatial wrench, so the mapping from a
//! desired wrench to cable tensions is under-determined. This crate
//! resolves that redundancy each control cycle, respecting per-cable
//! tension bounds, under a choice of criteria:
//!
//! - **Unconstrained**: plain pseudo-inverse, violations reported only.
//! - **MinNorm**: minimum-norm tensions realizing the wrench exactly.
//! - **MinWrenchError**: closest realizable wrench when the desired one
//!   may be infeasible.
//! - **MinNormInterp**: interpolates between the previous and the desired
//!   wrench when the full step would leave the tension box.
//! - **AugmentedGain**: co-optimizes bounded controller gains with the
//!   tensions.
//! - **ClosedForm**: one-shot minimum deviation from midrange tension,
//!   with iterative redistribution of saturated cables.
//! - **Barycenter**: the tension solution at the centroid of the feasible
//!   polytope, projected onto the 2-D redundancy slice (8 cables).
//!
//! The constrained formulations are bounded least-squares problems solved
//! by an active-set method with optional warm starting across cycles; an
//! optional rate limiter caps the tension change per cycle. Recoverable
//! conditions (infeasible wrench, non-convergence, empty polytope) are
//! reported on the returned [`Distribution`](distribution::Distribution)
//! and never interrupt the control loop.
//!
//! The robot model itself is not part of this crate: the caller supplies
//! the cable count, platform mass and tension bounds at construction and
//! the fresh wrench matrix and desired wrench every cycle.

pub mod parameters;

pub mod distribution_error;

pub mod linalg;

pub mod problem;

pub mod qp;

pub mod rate_limit;

pub mod closed_form;

pub mod polytope;

pub mod telemetry;

pub mod distribution;
