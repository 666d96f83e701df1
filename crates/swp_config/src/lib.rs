//! Declarative scenario loading: parses a JSON/YAML document into a
//! [`ScenarioConfig`] and materializes it into a ready-to-run
//! [`swp_harness::SimulationHarness`] via class-name registries.

pub mod loader;
pub mod registry;
pub mod scenario_config;

pub use loader::{Format, LoadedScenario, ScenarioLoader};
pub use registry::{AgentBuildContext, AgentRegistry, ComponentRegistry, ControllerRegistry};
pub use scenario_config::{
    AgentConfig, ComponentConfig, ControllerConfig, ControllerWiring, DisturbanceConfig, EdgeConfig,
    ScenarioConfig, ScenarioScriptConfig, SimulationSettings,
};
