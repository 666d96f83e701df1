//! The canonical PID controller with clamped-integrator anti-windup.

use crate::controller::Controller;

/// A PID controller.
///
/// Gains may be negative to express reverse-acting loops (e.g. opening a
/// gate lowers the level it controls, so the gain that maps level error to
/// opening command is negative).
///
/// Anti-windup: the integral term is skipped for a tick when the previous
/// output was clamped AND the current error has the same sign as the
/// previous (clamped) output — i.e. the controller would otherwise keep
/// driving further into saturation.
#[derive(Debug, Clone)]
pub struct Pid {
    kp: f64,
    ki: f64,
    kd: f64,
    min_output: f64,
    max_output: f64,
    setpoint: f64,
    integral: f64,
    prev_error: f64,
    prev_output_clamped: bool,
    prev_output: f64,
    first_call: bool,
}

impl Pid {
    /// Creates a PID controller with the given gains and output bounds.
    /// The setpoint starts at `0.0`; call [`Controller::set_setpoint`] to
    /// assign one.
    #[must_use]
    pub fn new(kp: f64, ki: f64, kd: f64, min_output: f64, max_output: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            min_output,
            max_output,
            setpoint: 0.0,
            integral: 0.0,
            prev_error: 0.0,
            prev_output_clamped: false,
            prev_output: 0.0,
            first_call: true,
        }
    }
}

impl Controller for Pid {
    fn compute_action(&mut self, observation: f64, dt: f64) -> f64 {
        let error = self.setpoint - observation;

        let windup_blocked = self.prev_output_clamped
            && error.signum() == self.prev_output.signum()
            && error != 0.0;
        if !windup_blocked {
            self.integral += error * dt;
        }

        let derivative = if self.first_call {
            0.0
        } else {
            (error - self.prev_error) / dt
        };

        let raw = self.kp * error + self.ki * self.integral + self.kd * derivative;
        let output = raw.clamp(self.min_output, self.max_output);

        self.prev_error = error;
        self.prev_output_clamped = output != raw;
        self.prev_output = output;
        self.first_call = false;

        output
    }

    fn set_setpoint(&mut self, value: f64) {
        self.setpoint = value;
    }

    fn setpoint(&self) -> f64 {
        self.setpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proportional_only_tracks_error() {
        let mut pid = Pid::new(2.0, 0.0, 0.0, -100.0, 100.0);
        pid.set_setpoint(10.0);
        let output = pid.compute_action(4.0, 1.0);
        assert!((output - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_output_clamped_to_bounds() {
        let mut pid = Pid::new(100.0, 0.0, 0.0, -1.0, 1.0);
        pid.set_setpoint(100.0);
        let output = pid.compute_action(0.0, 1.0);
        assert_eq!(output, 1.0);
    }

    #[test]
    fn test_set_setpoint_does_not_reset_integral() {
        let mut pid = Pid::new(0.0, 1.0, 0.0, -1000.0, 1000.0);
        pid.set_setpoint(10.0);
        pid.compute_action(0.0, 1.0);
        let integral_before = pid.integral;
        pid.set_setpoint(20.0);
        assert_eq!(pid.integral, integral_before);
    }

    #[test]
    fn test_anti_windup_skips_integration_when_saturated_same_sign() {
        let mut pid = Pid::new(0.0, 10.0, 0.0, -1.0, 1.0);
        pid.set_setpoint(100.0);
        // First call saturates the output high, same sign as error.
        pid.compute_action(0.0, 1.0);
        let integral_after_first = pid.integral;
        pid.compute_action(0.0, 1.0);
        assert_eq!(pid.integral, integral_after_first);
    }

    #[test]
    fn test_anti_windup_resumes_once_error_changes_sign() {
        let mut pid = Pid::new(0.0, 10.0, 0.0, -1.0, 1.0);
        pid.set_setpoint(100.0);
        pid.compute_action(0.0, 1.0);
        let integral_after_first = pid.integral;
        // Error flips sign (observation overshoots setpoint): integration
        // should resume even though the previous output was clamped.
        pid.compute_action(200.0, 1.0);
        assert!(pid.integral < integral_after_first);
    }

    #[test]
    fn test_negative_gain_supports_reverse_acting_loop() {
        let mut pid = Pid::new(-2.0, 0.0, 0.0, -100.0, 100.0);
        pid.set_setpoint(10.0);
        let output = pid.compute_action(15.0, 1.0);
        assert!((output - 10.0).abs() < 1e-9);
    }
}
