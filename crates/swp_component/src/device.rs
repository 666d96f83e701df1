//! Rate-limited actuator devices: [`Pump`], [`Valve`], [`Turbine`].
//!
//! All three share the same shape — a setpoint that moves toward a target
//! at a capped rate and a flow derived from the setpoint — differing only
//! in their flow relationship and parameter names. The shared mechanics
//! live in [`RateLimitedDevice`]; each public type wraps one with its own
//! flow law.

use swp_bus::value::FieldsExt;
use swp_bus::{Fields, Message, ScalarValue, Topic};
use swp_diag::SimError;

use crate::action::Action;
use crate::component::{record_missing_key, Component};

/// Parameter key shared by all rate-limited devices: maximum setpoint.
const PARAM_MAX_SETPOINT: &str = "max_setpoint";
/// Parameter key shared by all rate-limited devices: maximum rate of
/// change of the setpoint, units/s.
const PARAM_MAX_RATE_OF_CHANGE: &str = "max_rate_of_change";

/// The flow law a [`RateLimitedDevice`] applies to its current setpoint.
trait FlowLaw: std::fmt::Debug {
    fn flow(&self, parameters: &Fields, setpoint: f64, action: &Action) -> f64;
}

#[derive(Debug, Clone)]
struct RateLimitedDevice {
    id: String,
    parameters: Fields,
    setpoint: f64,
    target_setpoint: f64,
    last_flow: f64,
    diagnostics: Vec<String>,
}

impl RateLimitedDevice {
    fn new(
        id: impl Into<String>,
        parameters: Fields,
        initial_setpoint: f64,
    ) -> Result<Self, SimError> {
        let id = id.into();
        for key in [PARAM_MAX_SETPOINT, PARAM_MAX_RATE_OF_CHANGE] {
            if parameters.get_f64_or(key, 0.0) <= 0.0 {
                return Err(SimError::InvalidParameter {
                    component_id: id,
                    parameter: key.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        let max_setpoint = parameters.get_f64_or(PARAM_MAX_SETPOINT, 0.0);
        let setpoint = initial_setpoint.clamp(0.0, max_setpoint);

        Ok(Self {
            id,
            parameters,
            setpoint,
            target_setpoint: setpoint,
            last_flow: 0.0,
            diagnostics: Vec::new(),
        })
    }

    fn max_setpoint(&self) -> f64 {
        self.parameters.get_f64_or(PARAM_MAX_SETPOINT, 0.0)
    }

    fn max_rate_of_change(&self) -> f64 {
        self.parameters.get_f64_or(PARAM_MAX_RATE_OF_CHANGE, 0.0)
    }

    fn step(&mut self, action: &Action, dt: f64, law: &dyn FlowLaw) -> Result<Fields, SimError> {
        if dt <= 0.0 {
            return Err(SimError::StepFault {
                component_id: self.id.clone(),
                tick: 0,
                reason: "dt must be positive".to_string(),
            });
        }
        if action.contains("control_signal") {
            self.target_setpoint =
                action.control_signal().clamp(0.0, 1.0) * self.max_setpoint();
        } else {
            record_missing_key(&mut self.diagnostics, &self.id, "control_signal");
        }

        let max_step = self.max_rate_of_change() * dt;
        let delta = (self.target_setpoint - self.setpoint).clamp(-max_step, max_step);
        self.setpoint = (self.setpoint + delta).clamp(0.0, self.max_setpoint());

        self.last_flow = law.flow(&self.parameters, self.setpoint, action).max(0.0);

        Ok(self.get_state())
    }

    fn get_state(&self) -> Fields {
        let mut state = Fields::new();
        state.insert("setpoint".to_string(), ScalarValue::Float(self.setpoint));
        state.insert("flow".to_string(), ScalarValue::Float(self.last_flow));
        state.insert("outflow".to_string(), ScalarValue::Float(self.last_flow));
        state
    }

    fn set_state(&mut self, key: &str, value: ScalarValue) {
        if key == "setpoint" {
            self.setpoint = value.as_f64().clamp(0.0, self.max_setpoint());
            self.target_setpoint = self.setpoint;
        }
    }

    fn on_message(&mut self, message: &Message) -> Result<(), String> {
        if let Some(target) = message.fields.get("target_setpoint") {
            self.target_setpoint = target.as_f64().clamp(0.0, self.max_setpoint());
        } else if let Some(signal) = message.fields.get("control_signal") {
            self.target_setpoint = signal.as_f64().clamp(0.0, 1.0) * self.max_setpoint();
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PumpFlowLaw;
impl FlowLaw for PumpFlowLaw {
    fn flow(&self, parameters: &Fields, setpoint: f64, _action: &Action) -> f64 {
        let rated_flow = parameters.get_f64_or("rated_flow", 0.0);
        let max_setpoint = parameters.get_f64_or(PARAM_MAX_SETPOINT, 1.0).max(1e-12);
        rated_flow * (setpoint / max_setpoint)
    }
}

#[derive(Debug)]
struct ValveFlowLaw;
impl FlowLaw for ValveFlowLaw {
    fn flow(&self, parameters: &Fields, setpoint: f64, action: &Action) -> f64 {
        let conveyance = parameters.get_f64_or("conveyance", 0.0);
        let max_setpoint = parameters.get_f64_or(PARAM_MAX_SETPOINT, 1.0).max(1e-12);
        let differential = (action.upstream_head() - action.downstream_head()).max(0.0);
        conveyance * (setpoint / max_setpoint) * differential.sqrt()
    }
}

#[derive(Debug)]
struct TurbineFlowLaw;
impl FlowLaw for TurbineFlowLaw {
    fn flow(&self, parameters: &Fields, setpoint: f64, _action: &Action) -> f64 {
        let rated_flow = parameters.get_f64_or("rated_flow", 0.0);
        let max_setpoint = parameters.get_f64_or(PARAM_MAX_SETPOINT, 1.0).max(1e-12);
        rated_flow * (setpoint / max_setpoint)
    }
}

macro_rules! rate_limited_device {
    ($name:ident, $law:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone)]
        pub struct $name(RateLimitedDevice);

        impl $name {
            /// Parameter key: maximum setpoint (full travel / full speed).
            pub const PARAM_MAX_SETPOINT: &'static str = PARAM_MAX_SETPOINT;
            /// Parameter key: maximum rate of change of the setpoint, units/s.
            pub const PARAM_MAX_RATE_OF_CHANGE: &'static str = PARAM_MAX_RATE_OF_CHANGE;

            /// Creates the device. `initial_setpoint` is clamped into
            /// `[0, max_setpoint]`.
            ///
            /// # Errors
            ///
            /// Returns [`SimError::InvalidParameter`] if `max_setpoint` or
            /// `max_rate_of_change` is non-positive.
            pub fn new(
                id: impl Into<String>,
                parameters: Fields,
                initial_setpoint: f64,
            ) -> Result<Self, SimError> {
                Ok(Self(RateLimitedDevice::new(id, parameters, initial_setpoint)?))
            }
        }

        impl Component for $name {
            fn id(&self) -> &str {
                &self.0.id
            }

            fn parameters(&self) -> &Fields {
                &self.0.parameters
            }

            fn get_state(&self) -> Fields {
                self.0.get_state()
            }

            fn step(&mut self, action: &Action, dt: f64) -> Result<Fields, SimError> {
                self.0.step(action, dt, &$law)
            }

            fn set_inflow(&mut self, _value: f64) {}

            fn set_state(&mut self, key: &str, value: ScalarValue) {
                self.0.set_state(key, value);
            }

            fn on_message(&mut self, _topic: &Topic, message: &Message) -> Result<(), String> {
                self.0.on_message(message)
            }

            fn diagnostics(&self) -> &[String] {
                &self.0.diagnostics
            }
        }
    };
}

rate_limited_device!(Pump, PumpFlowLaw, "A pump whose setpoint drives flow linearly up to a rated capacity.");
rate_limited_device!(Valve, ValveFlowLaw, "A valve whose setpoint scales an orifice-style head-driven flow.");
rate_limited_device!(Turbine, TurbineFlowLaw, "A turbine whose setpoint (gate position / load) drives flow linearly up to a rated capacity.");
