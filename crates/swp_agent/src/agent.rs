//! The core [`Agent`] trait, [`AgentContext`], and the canonical library.

use swp_bus::MessageBus;

pub mod central_dispatcher;
pub mod disturbance;
pub mod local_control;
pub mod parameter_identification;
pub mod perception;
pub mod scenario;
pub mod station_control;

pub use central_dispatcher::{CentralDispatcher, Comparison, ThresholdRule};
pub use disturbance::{CsvInflowAgent, DynamicRainfallAgent, RainfallAgent, WaterUseAgent};
pub use local_control::LocalControlAgent;
pub use parameter_identification::ParameterIdentificationAgent;
pub use perception::DigitalTwinAgent;
pub use scenario::{ScenarioAgent, ScenarioEvent};
pub use station_control::{
    DecompositionRule, HydropowerStationControlAgent, PumpControlAgent,
    PumpStationControlAgent, ValveStationControlAgent,
};

/// Per-tick context handed to every agent's [`Agent::run`], in registration
/// order, during Phase A.
pub struct AgentContext<'a> {
    pub current_time: f64,
    pub tick: u64,
    pub dt: f64,
    pub bus: &'a MessageBus,
}

/// A participant that drives the bus but owns no physical state of its
/// own. Most agents do their real work through bus callbacks registered at
/// construction; `run` is typically just a scheduling hook (publish
/// perception, check an activation window, replay a scripted event).
pub trait Agent {
    /// The agent's unique identifier.
    fn id(&self) -> &str;

    /// Called once per tick, in registration order, during Phase A.
    fn run(&mut self, ctx: &AgentContext);
}
