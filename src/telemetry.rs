//! Telemetry seam for visualization of intermediate geometry.
//!
//! The barycenter method publishes the projected bounds of the feasible
//! polytope so an external tool can plot it. Publishing is fire-and-forget:
//! the sink must never block the control cycle, and the core ignores any
//! outcome of the publish.

/// Sink for intermediate geometry frames. Implementations wrap whatever
/// transport the application uses (a ROS topic, a channel, a file).
pub trait TelemetrySink {
    /// Publish one frame of values, best effort. For the barycenter
    /// geometry the frame holds, per cable, the two kernel-projection
    /// coefficients followed by the lower and upper projected bound.
    fn publish(&self, values: &[f32]);
}

/// Default sink that discards everything.
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn publish(&self, _values: &[f32]) {}
}
