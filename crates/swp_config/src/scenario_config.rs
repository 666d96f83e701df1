//! The declarative, tree-structured scenario format: JSON or YAML in,
//! deserialized directly with `serde`.

use serde::Deserialize;
use swp_bus::Fields;
use swp_component::CanalModel;

/// Top-level scenario document.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub simulation_settings: SimulationSettings,
    pub components: Vec<ComponentConfig>,
    #[serde(default)]
    pub topology: Vec<EdgeConfig>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
    #[serde(default)]
    pub disturbances: Vec<DisturbanceConfig>,
    #[serde(default)]
    pub scenario_script: Vec<ScenarioScriptConfig>,
}

/// `{dt, num_steps | duration}`. Exactly one of `num_steps`/`duration` must
/// be present; [`crate::loader::ScenarioLoader`] resolves `duration` into a
/// step count by dividing by `dt` and rounding up.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationSettings {
    pub dt: f64,
    #[serde(default)]
    pub num_steps: Option<u64>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// One component entry. `model` only applies to `class: "canal"`; it is
/// ignored (and may be omitted) for every other class.
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub parameters: Fields,
    #[serde(default)]
    pub initial_state: Fields,
    #[serde(default)]
    pub model: Option<CanalModel>,
    /// Topic this component's `on_message` is bound to, for disturbance or
    /// state-update traffic.
    #[serde(default)]
    pub subscribes_to: Option<String>,
    /// A second topic bound the same way as `subscribes_to`, conventionally
    /// used for actuator command traffic (e.g. a `LocalControlAgent`'s
    /// `control_signal`). Mechanically identical to `subscribes_to` — a
    /// component only exposes one `on_message` seam, so both are wired with
    /// [`swp_harness::SimulationHarness::bind_component_topic`].
    #[serde(default)]
    pub action_topic: Option<String>,
}

/// A directed topology edge, `upstream -> downstream`.
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    pub upstream: String,
    pub downstream: String,
}

/// One agent entry. `config` is class-specific and parsed by the
/// corresponding [`crate::registry::AgentRegistry`] constructor.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// One orchestrated-mode controller entry: `{id, type, params, wiring}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub class: String,
    #[serde(default)]
    pub params: Fields,
    pub wiring: ControllerWiring,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerWiring {
    pub controlled_id: String,
    pub observed_id: String,
    pub observation_key: String,
}

/// One timed disturbance: at `time_step`, deliver `value` under key
/// `action` to `component_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct DisturbanceConfig {
    pub time_step: u64,
    pub component_id: String,
    pub action: String,
    pub value: f64,
}

/// One scripted bus event, fired once `time` is reached.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioScriptConfig {
    pub time: f64,
    pub topic: String,
    #[serde(default)]
    pub message: Fields,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_json_document_parses() {
        let json = r#"{
            "simulation_settings": {"dt": 1.0, "num_steps": 10},
            "components": [
                {"id": "r1", "class": "reservoir",
                 "parameters": {"surface_area": 100.0, "max_volume": 1000.0},
                 "initial_state": {"volume": 10.0}}
            ]
        }"#;
        let config: ScenarioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.components.len(), 1);
        assert_eq!(config.simulation_settings.num_steps, Some(10));
    }

    #[test]
    fn test_yaml_document_parses() {
        let yaml = "
simulation_settings:
  dt: 1.0
  duration: 10.0
components:
  - id: r1
    class: reservoir
    parameters:
      surface_area: 100.0
      max_volume: 1000.0
    initial_state:
      volume: 10.0
";
        let config: ScenarioConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.simulation_settings.duration, Some(10.0));
    }

    #[test]
    fn test_canal_model_field_parses_snake_case() {
        let json = r#"{"id":"c1","class":"canal","model":"integral_delay"}"#;
        let config: ComponentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.model, Some(CanalModel::IntegralDelay));
    }
}
