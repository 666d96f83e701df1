//! A thin seam over an externally supplied optimizer.

use crate::controller::Controller;

/// Wraps a closure as a [`Controller`], for callers who want to drive a
/// loop with a model-predictive or other external optimizer instead of a
/// closed-form law.
///
/// This core does not implement an optimizer; `McpFacade` only provides the
/// plumbing so a [`LocalControlAgent`](../swp_agent/agent/local_control/struct.LocalControlAgent.html)
/// or the orchestrated harness can hold one alongside [`crate::Pid`] and
/// [`crate::BangBang`] through the same trait object.
pub struct McpFacade {
    setpoint: f64,
    solve: Box<dyn FnMut(f64, f64, f64) -> f64>,
}

impl McpFacade {
    /// Wraps `solve`, called as `solve(setpoint, observation, dt)` on each
    /// [`Controller::compute_action`].
    pub fn new(solve: impl FnMut(f64, f64, f64) -> f64 + 'static) -> Self {
        Self {
            setpoint: 0.0,
            solve: Box::new(solve),
        }
    }
}

impl std::fmt::Debug for McpFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpFacade")
            .field("setpoint", &self.setpoint)
            .finish_non_exhaustive()
    }
}

impl Controller for McpFacade {
    fn compute_action(&mut self, observation: f64, dt: f64) -> f64 {
        (self.solve)(self.setpoint, observation, dt)
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
    fn test_delegates_to_injected_closure() {
        let mut facade = McpFacade::new(|setpoint, observation, _dt| setpoint - observation);
        facade.set_setpoint(5.0);
        assert_eq!(facade.compute_action(2.0, 1.0), 3.0);
    }
}
