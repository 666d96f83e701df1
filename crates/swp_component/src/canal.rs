//! Canal — a unified component with five selectable pool-routing models.

use std::collections::VecDeque;

use swp_bus::value::FieldsExt;
use swp_bus::{Fields, Message, ScalarValue, Topic};
use swp_diag::SimError;

use crate::action::Action;
use crate::component::{record_missing_key, Component};

/// Which pool-routing model a [`Canal`] runs.
///
/// The first four are driven by the ordinary [`Component::step`] call; the
/// fifth, [`CanalModel::StVenant`], is not — it exposes
/// [`Canal::get_equations`] and [`Canal::update_state`] for an external
/// [`crate::NetworkSolver`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanalModel {
    /// Single integrator of pool storage: `level += (inflow - outflow)/area * dt`.
    Integral,
    /// An [`Integral`](CanalModel::Integral) pool with inflow delayed by a
    /// configured transport time, the delay buffer warm-started with the
    /// canal's initial inflow.
    IntegralDelay,
    /// Same transport delay as [`IntegralDelay`](CanalModel::IntegralDelay),
    /// but the delay buffer starts filled with zeros (cold start) rather
    /// than the initial inflow.
    IntegralDelayZero,
    /// A linear-reservoir routing model: `outflow = level / time_constant`,
    /// with no externally set target outflow.
    LinearReservoir,
    /// Full unsteady open-channel flow, solved jointly with neighboring
    /// `st_venant` canals by an injected [`crate::NetworkSolver`].
    StVenant,
}

/// The linearized coefficients an [`crate::NetworkSolver`] needs to include
/// this reach in its joint solve for the current tick.
#[derive(Debug, Clone, Copy)]
pub struct StVenantEquations {
    pub depth: f64,
    pub flow: f64,
    pub bed_slope: f64,
    pub length: f64,
}

#[derive(Debug, Clone)]
pub struct Canal {
    id: String,
    parameters: Fields,
    model: CanalModel,
    level: f64,
    /// Release set via bus messages (`"target_outflow"`); ignored on a
    /// tick where the harness supplies `outflow_demand` from a downstream
    /// head-driven actuator.
    target_outflow: f64,
    last_outflow: f64,
    /// Used only by `IntegralDelay`/`IntegralDelayZero`: the FIFO of inflow
    /// samples awaiting release after the configured transport delay.
    delay_buffer: VecDeque<f64>,
    /// Used only by `StVenant`: current depth and flow state, mutated
    /// directly by `update_state` rather than `step`.
    depth: f64,
    flow: f64,
    diagnostics: Vec<String>,
}

impl Canal {
    /// Parameter key: free-surface area, m^2 (integral / delay models).
    pub const PARAM_SURFACE_AREA: &'static str = "surface_area";
    /// Parameter key: linear-reservoir time constant, s.
    pub const PARAM_TIME_CONSTANT: &'static str = "time_constant";
    /// Parameter key: transport delay, s (delay models).
    pub const PARAM_TRANSPORT_DELAY: &'static str = "transport_delay";
    /// Parameter key: bed slope, dimensionless (`st_venant`).
    pub const PARAM_BED_SLOPE: &'static str = "bed_slope";
    /// Parameter key: reach length, m (`st_venant`).
    pub const PARAM_LENGTH: &'static str = "length";

    /// Creates a canal running `model`, with `initial_level` (or, for
    /// `st_venant`, `initial_level` read as initial depth) and
    /// `initial_inflow` used to warm-start delay buffers.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] if a parameter required by
    /// `model` is missing or non-positive, or `initial_level` is negative.
    pub fn new(
        id: impl Into<String>,
        parameters: Fields,
        model: CanalModel,
        initial_level: f64,
        initial_inflow: f64,
        dt: f64,
    ) -> Result<Self, SimError> {
        let id = id.into();
        if initial_level < 0.0 {
            return Err(SimError::InvalidParameter {
                component_id: id,
                parameter: "initial_level".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }

        let require_positive = |key: &str| -> Result<f64, SimError> {
            let value = parameters.get_f64_or(key, 0.0);
            if value <= 0.0 {
                return Err(SimError::InvalidParameter {
                    component_id: id.clone(),
                    parameter: key.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            Ok(value)
        };

        let delay_buffer = match model {
            CanalModel::IntegralDelay | CanalModel::IntegralDelayZero => {
                require_positive(Self::PARAM_SURFACE_AREA)?;
                let delay = require_positive(Self::PARAM_TRANSPORT_DELAY)?;
                if dt <= 0.0 {
                    return Err(SimError::InvalidParameter {
                        component_id: id,
                        parameter: "dt".to_string(),
                        reason: "must be positive".to_string(),
                    });
                }
                let steps = (delay / dt).round().max(1.0) as usize;
                let fill = if model == CanalModel::IntegralDelayZero {
                    0.0
                } else {
                    initial_inflow
                };
                VecDeque::from(vec![fill; steps])
            }
            CanalModel::Integral => {
                require_positive(Self::PARAM_SURFACE_AREA)?;
                VecDeque::new()
            }
            CanalModel::LinearReservoir => {
                require_positive(Self::PARAM_TIME_CONSTANT)?;
                VecDeque::new()
            }
            CanalModel::StVenant => {
                require_positive(Self::PARAM_BED_SLOPE)?;
                require_positive(Self::PARAM_LENGTH)?;
                VecDeque::new()
            }
        };

        Ok(Self {
            id,
            parameters,
            model,
            level: initial_level,
            target_outflow: 0.0,
            last_outflow: 0.0,
            delay_buffer,
            depth: initial_level,
            flow: initial_inflow,
            diagnostics: Vec::new(),
        })
    }

    #[must_use]
    pub fn model(&self) -> CanalModel {
        self.model
    }

    fn surface_area(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_SURFACE_AREA, 1.0)
    }

    fn time_constant(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_TIME_CONSTANT, 1.0)
    }

    /// The linearized coefficients this reach contributes to a joint
    /// `st_venant` solve. Callers outside a [`crate::NetworkSolver`] should
    /// not call this; it is meaningless for the other four models.
    #[must_use]
    pub fn get_equations(&self) -> StVenantEquations {
        StVenantEquations {
            depth: self.depth,
            flow: self.flow,
            bed_slope: self.parameters.get_f64_or(Self::PARAM_BED_SLOPE, 0.0),
            length: self.parameters.get_f64_or(Self::PARAM_LENGTH, 0.0),
        }
    }

    /// Applies a solver-computed increment to this reach's depth and flow
    /// state. Only meaningful for `st_venant`; callers of other models use
    /// `step` instead.
    pub fn update_state(&mut self, d_h: f64, d_q: f64) {
        self.depth += d_h;
        self.flow += d_q;
    }

    fn requested_outflow(&self, action: &Action) -> f64 {
        if action.contains("outflow_demand") {
            action.outflow_demand()
        } else {
            self.target_outflow
        }
    }

    fn step_integral(&mut self, action: &Action, dt: f64) {
        let max_drainable = (self.level * self.surface_area() / dt).max(0.0);
        let outflow = self.requested_outflow(action).clamp(0.0, max_drainable);
        let balance = (action.inflow() - outflow) / self.surface_area() * dt;
        self.level = (self.level + balance).max(0.0);
        self.last_outflow = outflow;
    }

    fn step_delay(&mut self, action: &Action, dt: f64) {
        self.delay_buffer.push_back(action.inflow());
        let delayed_inflow = self.delay_buffer.pop_front().unwrap_or(0.0);
        let max_drainable = (self.level * self.surface_area() / dt).max(0.0);
        let outflow = self.requested_outflow(action).clamp(0.0, max_drainable);
        let balance = (delayed_inflow - outflow) / self.surface_area() * dt;
        self.level = (self.level + balance).max(0.0);
        self.last_outflow = outflow;
    }

    fn step_linear_reservoir(&mut self, action: &Action, dt: f64) {
        let outflow = self.level / self.time_constant();
        self.level = (self.level + (action.inflow() - outflow) * dt).max(0.0);
        self.last_outflow = outflow;
    }
}

impl Component for Canal {
    fn id(&self) -> &str {
        &self.id
    }

    fn parameters(&self) -> &Fields {
        &self.parameters
    }

    fn get_state(&self) -> Fields {
        let mut state = Fields::new();
        match self.model {
            CanalModel::StVenant => {
                state.insert("depth".to_string(), ScalarValue::Float(self.depth));
                state.insert("flow".to_string(), ScalarValue::Float(self.flow));
                state.insert(
                    "water_level".to_string(),
                    ScalarValue::Float(self.depth),
                );
                state.insert("outflow".to_string(), ScalarValue::Float(self.flow));
            }
            _ => {
                state.insert("level".to_string(), ScalarValue::Float(self.level));
                state.insert(
                    "water_level".to_string(),
                    ScalarValue::Float(self.level),
                );
                state.insert(
                    "outflow".to_string(),
                    ScalarValue::Float(self.last_outflow),
                );
            }
        }
        state
    }

    fn step(&mut self, action: &Action, dt: f64) -> Result<Fields, SimError> {
        if self.model == CanalModel::StVenant {
            return Err(SimError::StepFault {
                component_id: self.id.clone(),
                tick: 0,
                reason: "st_venant canals are driven by a NetworkSolver, not step"
                    .to_string(),
            });
        }
        if dt <= 0.0 {
            return Err(SimError::StepFault {
                component_id: self.id.clone(),
                tick: 0,
                reason: "dt must be positive".to_string(),
            });
        }
        if !action.contains("inflow") {
            record_missing_key(&mut self.diagnostics, &self.id, "inflow");
        }

        match self.model {
            CanalModel::Integral => self.step_integral(action, dt),
            CanalModel::IntegralDelay | CanalModel::IntegralDelayZero => {
                self.step_delay(action, dt);
            }
            CanalModel::LinearReservoir => self.step_linear_reservoir(action, dt),
            CanalModel::StVenant => unreachable!("handled above"),
        }

        Ok(self.get_state())
    }

    fn set_inflow(&mut self, _value: f64) {
        // Disturbance inflow enters the topology graph, not this side
        // channel, for canal pools.
    }

    fn set_state(&mut self, key: &str, value: ScalarValue) {
        match key {
            "level" => self.level = value.as_f64().max(0.0),
            "outflow" => self.target_outflow = value.as_f64().max(0.0),
            "depth" => self.depth = value.as_f64(),
            "flow" => self.flow = value.as_f64(),
            _ => {}
        }
    }

    fn on_message(&mut self, _topic: &Topic, message: &Message) -> Result<(), String> {
        if let Some(target) = message.fields.get("target_outflow") {
            self.target_outflow = target.as_f64().max(0.0);
        }
        Ok(())
    }

    fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}
