//! Gate — a rate-limited orifice with orifice-flow discharge.

use swp_bus::value::FieldsExt;
use swp_bus::{Fields, Message, ScalarValue, Topic};
use swp_diag::SimError;

use crate::action::Action;
use crate::component::{record_missing_key, Component};

/// Gravitational acceleration, m/s^2, used by the orifice-flow equation.
const GRAVITY: f64 = 9.81;

/// A gate whose opening moves toward a target at a capped rate, discharging
/// water through an orifice-flow equation. No reverse flow: if the upstream
/// head is at or below the downstream head, outflow is zero.
#[derive(Debug, Clone)]
pub struct Gate {
    id: String,
    parameters: Fields,
    opening: f64,
    target_opening: f64,
    last_outflow: f64,
    diagnostics: Vec<String>,
}

impl Gate {
    /// Parameter key: gate width, m.
    pub const PARAM_WIDTH: &'static str = "width";
    /// Parameter key: discharge coefficient, dimensionless.
    pub const PARAM_DISCHARGE_COEFFICIENT: &'static str = "discharge_coefficient";
    /// Parameter key: maximum opening, m.
    pub const PARAM_MAX_OPENING: &'static str = "max_opening";
    /// Parameter key: maximum rate of change of opening, m/s.
    pub const PARAM_MAX_RATE_OF_CHANGE: &'static str = "max_rate_of_change";

    /// Creates a gate. `initial_opening` is clamped into `[0, max_opening]`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] if `width`,
    /// `discharge_coefficient`, `max_opening`, or `max_rate_of_change` is
    /// non-positive.
    pub fn new(
        id: impl Into<String>,
        parameters: Fields,
        initial_opening: f64,
    ) -> Result<Self, SimError> {
        let id = id.into();
        for (key, default) in [
            (Self::PARAM_WIDTH, 0.0),
            (Self::PARAM_DISCHARGE_COEFFICIENT, 0.0),
            (Self::PARAM_MAX_OPENING, 0.0),
            (Self::PARAM_MAX_RATE_OF_CHANGE, 0.0),
        ] {
            if parameters.get_f64_or(key, default) <= 0.0 {
                return Err(SimError::InvalidParameter {
                    component_id: id,
                    parameter: key.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }

        let max_opening = parameters.get_f64_or(Self::PARAM_MAX_OPENING, 0.0);
        let opening = initial_opening.clamp(0.0, max_opening);

        Ok(Self {
            id,
            parameters,
            opening,
            target_opening: opening,
            last_outflow: 0.0,
            diagnostics: Vec::new(),
        })
    }

    fn max_opening(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_MAX_OPENING, 0.0)
    }

    fn max_rate_of_change(&self) -> f64 {
        self.parameters
            .get_f64_or(Self::PARAM_MAX_RATE_OF_CHANGE, 0.0)
    }

    fn width(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_WIDTH, 0.0)
    }

    fn discharge_coefficient(&self) -> f64 {
        self.parameters
            .get_f64_or(Self::PARAM_DISCHARGE_COEFFICIENT, 0.0)
    }
}

impl Component for Gate {
    fn id(&self) -> &str {
        &self.id
    }

    fn parameters(&self) -> &Fields {
        &self.parameters
    }

    fn get_state(&self) -> Fields {
        let mut state = Fields::new();
        state.insert("opening".to_string(), ScalarValue::Float(self.opening));
        state.insert(
            "outflow".to_string(),
            ScalarValue::Float(self.last_outflow),
        );
        state
    }

    fn step(&mut self, action: &Action, dt: f64) -> Result<Fields, SimError> {
        if dt <= 0.0 {
            return Err(SimError::StepFault {
                component_id: self.id.clone(),
                tick: 0,
                reason: "dt must be positive".to_string(),
            });
        }
        if !action.contains("upstream_head") {
            record_missing_key(&mut self.diagnostics, &self.id, "upstream_head");
        }

        // A direct control signal (orchestrated mode or a bus handler that
        // set it) takes priority over a previously-set `target_opening`.
        if action.contains("control_signal") {
            self.target_opening = action.control_signal().clamp(0.0, 1.0) * self.max_opening();
        }

        let max_step = self.max_rate_of_change() * dt;
        let delta = (self.target_opening - self.opening).clamp(-max_step, max_step);
        self.opening = (self.opening + delta).clamp(0.0, self.max_opening());

        let h_up = action.upstream_head();
        let h_down = action.downstream_head();
        self.last_outflow = if h_up <= h_down {
            0.0
        } else {
            self.discharge_coefficient()
                * self.width()
                * self.opening
                * (2.0 * GRAVITY * (h_up - h_down)).sqrt()
        }
        .max(0.0);

        Ok(self.get_state())
    }

    fn set_inflow(&mut self, _value: f64) {
        // Gates do not accumulate storage; inflow disturbances don't apply.
    }

    fn set_state(&mut self, key: &str, value: ScalarValue) {
        if key == "opening" {
            self.opening = value.as_f64().clamp(0.0, self.max_opening());
            self.target_opening = self.opening;
        }
    }

    fn on_message(&mut self, _topic: &Topic, message: &Message) -> Result<(), String> {
        if let Some(target) = message.fields.get("target_opening") {
            self.target_opening = target.as_f64().clamp(0.0, self.max_opening());
        } else if let Some(signal) = message.fields.get("control_signal") {
            self.target_opening = signal.as_f64().clamp(0.0, 1.0) * self.max_opening();
        }
        Ok(())
    }

    fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Fields {
        let mut p = Fields::new();
        p.insert(Gate::PARAM_WIDTH.to_string(), ScalarValue::Float(10.0));
        p.insert(
            Gate::PARAM_DISCHARGE_COEFFICIENT.to_string(),
            ScalarValue::Float(0.6),
        );
        p.insert(Gate::PARAM_MAX_OPENING.to_string(), ScalarValue::Float(2.0));
        p.insert(
            Gate::PARAM_MAX_RATE_OF_CHANGE.to_string(),
            ScalarValue::Float(0.1),
        );
        p
    }

    #[test]
    fn test_opening_clamped_to_bounds() {
        let gate = Gate::new("g1", params(), 5.0).unwrap();
        assert!(gate.opening <= gate.max_opening());
        assert!(gate.opening >= 0.0);
    }

    #[test]
    fn test_opening_rate_limited() {
        let mut gate = Gate::new("g1", params(), 0.0).unwrap();
        gate.set_state("opening", ScalarValue::Float(0.0));
        let action = Action::default()
            .with("control_signal", 1.0)
            .with("upstream_head", 10.0)
            .with("downstream_head", 5.0)
            .with("dt", 1.0);
        let state = gate.step(&action, 1.0).unwrap();
        let opening = state.get("opening").unwrap().as_f64();
        assert!(opening <= 0.1 + 1e-9);
    }

    #[test]
    fn test_no_reverse_flow() {
        let mut gate = Gate::new("g1", params(), 1.0).unwrap();
        let action = Action::default()
            .with("upstream_head", 5.0)
            .with("downstream_head", 10.0)
            .with("dt", 1.0);
        let state = gate.step(&action, 1.0).unwrap();
        assert_eq!(state.get("outflow").unwrap().as_f64(), 0.0);
    }

    #[test]
    fn test_outflow_positive_when_head_differential_positive() {
        let mut gate = Gate::new("g1", params(), 1.0).unwrap();
        let action = Action::default()
            .with("upstream_head", 14.0)
            .with("downstream_head", 10.0)
            .with("dt", 1.0);
        let state = gate.step(&action, 1.0).unwrap();
        assert!(state.get("outflow").unwrap().as_f64() > 0.0);
    }
}
