//! Pipe — a pressurized conduit with head-driven flow.

use swp_bus::value::FieldsExt;
use swp_bus::{Fields, ScalarValue};
use swp_diag::SimError;

use crate::action::Action;
use crate::component::{record_missing_key, Component};

/// A pipe carrying flow proportional to the square root of the head
/// differential: `Q = conveyance * sqrt(max(0, h_up - h_down))`. No reverse
/// flow: a non-positive differential yields zero flow.
#[derive(Debug, Clone)]
pub struct Pipe {
    id: String,
    parameters: Fields,
    last_flow: f64,
    diagnostics: Vec<String>,
}

impl Pipe {
    /// Parameter key: conveyance coefficient, m^2.5/s.
    pub const PARAM_CONVEYANCE: &'static str = "conveyance";

    /// Creates a pipe.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] if `conveyance` is
    /// non-positive.
    pub fn new(id: impl Into<String>, parameters: Fields) -> Result<Self, SimError> {
        let id = id.into();
        if parameters.get_f64_or(Self::PARAM_CONVEYANCE, 0.0) <= 0.0 {
            return Err(SimError::InvalidParameter {
                component_id: id,
                parameter: Self::PARAM_CONVEYANCE.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            id,
            parameters,
            last_flow: 0.0,
            diagnostics: Vec::new(),
        })
    }

    fn conveyance(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_CONVEYANCE, 0.0)
    }
}

impl Component for Pipe {
    fn id(&self) -> &str {
        &self.id
    }

    fn parameters(&self) -> &Fields {
        &self.parameters
    }

    fn get_state(&self) -> Fields {
        let mut state = Fields::new();
        state.insert("flow".to_string(), ScalarValue::Float(self.last_flow));
        state.insert("outflow".to_string(), ScalarValue::Float(self.last_flow));
        state
    }

    fn step(&mut self, action: &Action, _dt: f64) -> Result<Fields, SimError> {
        if !action.contains("upstream_head") || !action.contains("downstream_head") {
            record_missing_key(&mut self.diagnostics, &self.id, "upstream_head/downstream_head");
        }

        let differential = (action.upstream_head() - action.downstream_head()).max(0.0);
        self.last_flow = self.conveyance() * differential.sqrt();

        Ok(self.get_state())
    }

    fn set_inflow(&mut self, _value: f64) {}

    fn set_state(&mut self, key: &str, value: ScalarValue) {
        if key == "flow" {
            self.last_flow = value.as_f64().max(0.0);
        }
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
        p.insert(Pipe::PARAM_CONVEYANCE.to_string(), ScalarValue::Float(5.0));
        p
    }

    #[test]
    fn test_rejects_non_positive_conveyance() {
        let mut p = Fields::new();
        p.insert(Pipe::PARAM_CONVEYANCE.to_string(), ScalarValue::Float(0.0));
        assert!(Pipe::new("p1", p).is_err());
    }

    #[test]
    fn test_no_reverse_flow() {
        let mut pipe = Pipe::new("p1", params()).unwrap();
        let action = Action::default()
            .with("upstream_head", 2.0)
            .with("downstream_head", 8.0);
        let state = pipe.step(&action, 1.0).unwrap();
        assert_eq!(state.get("flow").unwrap().as_f64(), 0.0);
    }

    #[test]
    fn test_flow_increases_with_head_differential() {
        let mut pipe = Pipe::new("p1", params()).unwrap();
        let low = pipe
            .step(
                &Action::default()
                    .with("upstream_head", 11.0)
                    .with("downstream_head", 10.0),
                1.0,
            )
            .unwrap()
            .get("flow")
            .unwrap()
            .as_f64();
        let high = pipe
            .step(
                &Action::default()
                    .with("upstream_head", 20.0)
                    .with("downstream_head", 10.0),
                1.0,
            )
            .unwrap()
            .get("flow")
            .unwrap()
            .as_f64();
        assert!(high > low);
    }
}
