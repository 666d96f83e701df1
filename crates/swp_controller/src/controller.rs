//! The core [`Controller`] trait.

/// A control strategy turning an observation into an actuator command.
///
/// Implementations own whatever state their law needs (integral terms,
/// previous error, a clamping history for anti-windup) and are not
/// expected to be `Clone`; each controlled loop gets its own instance.
pub trait Controller {
    /// Computes the next control output given `observation` and the
    /// elapsed time `dt` since the previous call.
    ///
    /// `dt` is assumed positive; callers that skip a tick should not call
    /// this with `dt == 0.0` (derivative terms would divide by zero).
    fn compute_action(&mut self, observation: f64, dt: f64) -> f64;

    /// Assigns the controller's target value. Does not reset any internal
    /// accumulator (e.g. a PID's integral term survives a setpoint change).
    fn set_setpoint(&mut self, value: f64);

    /// The controller's current setpoint.
    fn setpoint(&self) -> f64;
}
