//! Reservoir / lake — a simple water-balance storage component.

use swp_bus::value::FieldsExt;
use swp_bus::{Fields, Message, ScalarValue, Topic};
use swp_diag::SimError;

use crate::action::Action;
use crate::component::{record_missing_key, Component};

/// A reservoir (or lake) storing water and exposing `water_level` derived
/// from `volume` via a linear surface-area relationship.
///
/// Water balance per tick:
/// `volume <- clamp(volume + (inflow - outflow - evap) * dt, 0, max_volume)`.
/// If the requested outflow would drain more than `volume/dt`, it is
/// clamped so volume cannot go negative. `outflow` is the harness's
/// `outflow_demand` (the previous tick's combined successor outflow) when
/// a downstream component is wired, otherwise the last value set via
/// `set_state`/`on_message`.
#[derive(Debug, Clone)]
pub struct Reservoir {
    id: String,
    parameters: Fields,
    volume: f64,
    /// Requested outflow for the current tick, set via bus messages or
    /// [`Component::set_state`] (`"outflow"`); defaults to `0.0`. Ignored
    /// for a tick where the harness supplies `outflow_demand` (a
    /// downstream head-driven actuator is present).
    target_outflow: f64,
    /// The outflow actually realized by the last `step`, after clamping
    /// to available volume; this is what `get_state` reports and what
    /// downstream components see as their `inflow`.
    last_outflow: f64,
    /// Disturbance inflow overlaid on top of the topology-derived inflow.
    disturbance_inflow: f64,
    diagnostics: Vec<String>,
}

impl Reservoir {
    /// Parameter key: reservoir surface area, m^2 (used to derive
    /// `water_level` from `volume` when no storage curve is supplied).
    pub const PARAM_SURFACE_AREA: &'static str = "surface_area";
    /// Parameter key: maximum storable volume, m^3.
    pub const PARAM_MAX_VOLUME: &'static str = "max_volume";
    /// Parameter key: evaporation rate, m^3/s.
    pub const PARAM_EVAPORATION_RATE: &'static str = "evaporation_rate";

    /// Creates a reservoir with the given parameters and initial volume.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidParameter`] if `surface_area` or
    /// `max_volume` is non-positive, or `initial_volume` is negative.
    pub fn new(
        id: impl Into<String>,
        parameters: Fields,
        initial_volume: f64,
    ) -> Result<Self, SimError> {
        let id = id.into();
        let surface_area = parameters.get_f64_or(Self::PARAM_SURFACE_AREA, 0.0);
        let max_volume = parameters.get_f64_or(Self::PARAM_MAX_VOLUME, f64::INFINITY);

        if surface_area <= 0.0 {
            return Err(SimError::InvalidParameter {
                component_id: id,
                parameter: Self::PARAM_SURFACE_AREA.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if max_volume <= 0.0 {
            return Err(SimError::InvalidParameter {
                component_id: id,
                parameter: Self::PARAM_MAX_VOLUME.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if initial_volume < 0.0 {
            return Err(SimError::InvalidParameter {
                component_id: id,
                parameter: "initial_volume".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }

        Ok(Self {
            id,
            parameters,
            volume: initial_volume.min(max_volume),
            target_outflow: 0.0,
            last_outflow: 0.0,
            disturbance_inflow: 0.0,
            diagnostics: Vec::new(),
        })
    }

    fn surface_area(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_SURFACE_AREA, 1.0)
    }

    fn max_volume(&self) -> f64 {
        self.parameters
            .get_f64_or(Self::PARAM_MAX_VOLUME, f64::INFINITY)
    }

    fn evaporation_rate(&self) -> f64 {
        self.parameters.get_f64_or(Self::PARAM_EVAPORATION_RATE, 0.0)
    }

    fn water_level(&self) -> f64 {
        self.volume / self.surface_area()
    }
}

impl Component for Reservoir {
    fn id(&self) -> &str {
        &self.id
    }

    fn parameters(&self) -> &Fields {
        &self.parameters
    }

    fn get_state(&self) -> Fields {
        let mut state = Fields::new();
        state.insert("volume".to_string(), ScalarValue::Float(self.volume));
        state.insert(
            "water_level".to_string(),
            ScalarValue::Float(self.water_level()),
        );
        state.insert(
            "outflow".to_string(),
            ScalarValue::Float(self.last_outflow),
        );
        state
    }

    fn step(&mut self, action: &Action, dt: f64) -> Result<Fields, SimError> {
        if !action.contains("inflow") {
            record_missing_key(&mut self.diagnostics, &self.id, "inflow");
        }
        if dt <= 0.0 {
            return Err(SimError::StepFault {
                component_id: self.id.clone(),
                tick: 0,
                reason: "dt must be positive".to_string(),
            });
        }

        let inflow = action.inflow() + self.disturbance_inflow;
        let max_drainable = self.volume / dt;
        let requested_outflow = if action.contains("outflow_demand") {
            action.outflow_demand()
        } else {
            self.target_outflow
        };
        let outflow = requested_outflow.clamp(0.0, max_drainable.max(0.0));
        self.last_outflow = outflow;

        let balance = (inflow - outflow - self.evaporation_rate()) * dt;
        self.volume = (self.volume + balance).clamp(0.0, self.max_volume());

        Ok(self.get_state())
    }

    fn set_inflow(&mut self, value: f64) {
        self.disturbance_inflow = value;
    }

    fn set_state(&mut self, key: &str, value: ScalarValue) {
        match key {
            "volume" => self.volume = value.as_f64().clamp(0.0, self.max_volume()),
            "outflow" => self.target_outflow = value.as_f64().max(0.0),
            _ => {}
        }
    }

    fn on_message(&mut self, _topic: &Topic, message: &Message) -> Result<(), String> {
        // Disturbance agents (rainfall, water use) publish `inflow_rate`.
        if let Some(rate) = message.fields.get("inflow_rate") {
            self.disturbance_inflow = rate.as_f64();
        }
        if let Some(outflow) = message.fields.get("outflow_rate") {
            self.target_outflow = outflow.as_f64().max(0.0);
        }
        Ok(())
    }

    fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}
