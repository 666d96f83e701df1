//! Name-to-constructor registries the loader uses to materialize
//! components, controllers, and agents by class-name string.
//!
//! Each registry is a typed map from a class name to a constructor
//! function; [`register_defaults`] populates one with every canonical
//! class this core ships. A scenario referencing an unregistered class
//! name fails with [`SimError::UnknownClass`].

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::rc::Rc;
use std::cell::RefCell;

use serde::Deserialize;
use swp_bus::{Fields, MessageBus, Topic};
use swp_component::{Canal, CanalModel, ComponentHandle, Gate, Pipe, Pump, Reservoir, Turbine, Valve};
use swp_controller::{BangBang, Controller, Pid};
use swp_diag::SimError;

use swp_agent::agent::central_dispatcher::{CentralDispatcher, Comparison, ThresholdRule};
use swp_agent::agent::disturbance::{CsvInflowAgent, RainfallAgent, WaterUseAgent};
use swp_agent::agent::local_control::LocalControlAgent;
use swp_agent::agent::parameter_identification::ParameterIdentificationAgent;
use swp_agent::agent::perception::DigitalTwinAgent;
use swp_agent::agent::scenario::{ScenarioAgent, ScenarioEvent};
use swp_agent::agent::station_control::{
    DecompositionRule, HydropowerStationControlAgent, PumpControlAgent, PumpStationControlAgent,
    ValveStationControlAgent,
};
use swp_agent::Agent;

fn invalid(reason: impl Into<String>) -> SimError {
    SimError::InvalidConfig { reason: reason.into() }
}

fn parse_config<T: for<'de> Deserialize<'de>>(class: &str, config: &serde_json::Value) -> Result<T, SimError> {
    serde_json::from_value(config.clone())
        .map_err(|e| invalid(format!("agent class '{class}': malformed config: {e}")))
}

// ---------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------

type ComponentConstructor = fn(&str, &Fields, &Fields, Option<CanalModel>, f64) -> Result<ComponentHandle, SimError>;

fn build_reservoir(id: &str, parameters: &Fields, initial_state: &Fields, _model: Option<CanalModel>, _dt: f64) -> Result<ComponentHandle, SimError> {
    let initial_volume = initial_state.get("volume").map_or(0.0, |v| v.as_f64());
    let reservoir = Reservoir::new(id, parameters.clone(), initial_volume)?;
    Ok(Rc::new(RefCell::new(reservoir)))
}

fn build_gate(id: &str, parameters: &Fields, initial_state: &Fields, _model: Option<CanalModel>, _dt: f64) -> Result<ComponentHandle, SimError> {
    let initial_opening = initial_state.get("opening").map_or(0.0, |v| v.as_f64());
    let gate = Gate::new(id, parameters.clone(), initial_opening)?;
    Ok(Rc::new(RefCell::new(gate)))
}

fn build_canal(id: &str, parameters: &Fields, initial_state: &Fields, model: Option<CanalModel>, dt: f64) -> Result<ComponentHandle, SimError> {
    let model = model.unwrap_or(CanalModel::Integral);
    if model == CanalModel::StVenant {
        return Err(invalid(format!(
            "component '{id}': st_venant canals must be wired with add_st_venant_canal and a NetworkSolver, not the component registry"
        )));
    }
    let initial_level = initial_state.get("level").map_or(0.0, |v| v.as_f64());
    let initial_inflow = initial_state.get("inflow").map_or(0.0, |v| v.as_f64());
    let canal = Canal::new(id, parameters.clone(), model, initial_level, initial_inflow, dt)?;
    Ok(Rc::new(RefCell::new(canal)))
}

fn build_pipe(id: &str, parameters: &Fields, _initial_state: &Fields, _model: Option<CanalModel>, _dt: f64) -> Result<ComponentHandle, SimError> {
    let pipe = Pipe::new(id, parameters.clone())?;
    Ok(Rc::new(RefCell::new(pipe)))
}

fn build_pump(id: &str, parameters: &Fields, initial_state: &Fields, _model: Option<CanalModel>, _dt: f64) -> Result<ComponentHandle, SimError> {
    let initial_setpoint = initial_state.get("setpoint").map_or(0.0, |v| v.as_f64());
    let pump = Pump::new(id, parameters.clone(), initial_setpoint)?;
    Ok(Rc::new(RefCell::new(pump)))
}

fn build_valve(id: &str, parameters: &Fields, initial_state: &Fields, _model: Option<CanalModel>, _dt: f64) -> Result<ComponentHandle, SimError> {
    let initial_setpoint = initial_state.get("setpoint").map_or(0.0, |v| v.as_f64());
    let valve = Valve::new(id, parameters.clone(), initial_setpoint)?;
    Ok(Rc::new(RefCell::new(valve)))
}

fn build_turbine(id: &str, parameters: &Fields, initial_state: &Fields, _model: Option<CanalModel>, _dt: f64) -> Result<ComponentHandle, SimError> {
    let initial_setpoint = initial_state.get("setpoint").map_or(0.0, |v| v.as_f64());
    let turbine = Turbine::new(id, parameters.clone(), initial_setpoint)?;
    Ok(Rc::new(RefCell::new(turbine)))
}

/// The name-to-constructor map the loader uses to materialize components.
pub struct ComponentRegistry {
    constructors: HashMap<String, ComponentConstructor>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { constructors: HashMap::new() }
    }

    pub fn register(&mut self, class: impl Into<String>, constructor: ComponentConstructor) {
        self.constructors.insert(class.into(), constructor);
    }

    /// Registers every canonical component class: `reservoir`, `gate`,
    /// `canal`, `pipe`, `pump`, `valve`, `turbine`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("reservoir", build_reservoir);
        registry.register("gate", build_gate);
        registry.register("canal", build_canal);
        registry.register("pipe", build_pipe);
        registry.register("pump", build_pump);
        registry.register("valve", build_valve);
        registry.register("turbine", build_turbine);
        registry
    }

    /// # Errors
    ///
    /// Returns [`SimError::UnknownClass`] if `class` is not registered.
    pub fn build(
        &self,
        class: &str,
        id: &str,
        parameters: &Fields,
        initial_state: &Fields,
        model: Option<CanalModel>,
        dt: f64,
    ) -> Result<ComponentHandle, SimError> {
        let constructor = self.constructors.get(class).ok_or_else(|| SimError::UnknownClass {
            family: "component".to_string(),
            class_name: class.to_string(),
        })?;
        constructor(id, parameters, initial_state, model, dt)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------
// Controllers
// ---------------------------------------------------------------------

type ControllerConstructor = fn(&Fields) -> Result<Box<dyn Controller>, SimError>;

fn build_pid(params: &Fields) -> Result<Box<dyn Controller>, SimError> {
    let kp = params.get("kp").map_or(0.0, |v| v.as_f64());
    let ki = params.get("ki").map_or(0.0, |v| v.as_f64());
    let kd = params.get("kd").map_or(0.0, |v| v.as_f64());
    let min_output = params.get("min_output").map_or(f64::NEG_INFINITY, |v| v.as_f64());
    let max_output = params.get("max_output").map_or(f64::INFINITY, |v| v.as_f64());
    Ok(Box::new(Pid::new(kp, ki, kd, min_output, max_output)))
}

fn build_bang_bang(params: &Fields) -> Result<Box<dyn Controller>, SimError> {
    let low = params.get("low").map_or(0.0, |v| v.as_f64());
    let high = params.get("high").map_or(1.0, |v| v.as_f64());
    let hysteresis = params.get("hysteresis").map_or(0.0, |v| v.as_f64());
    Ok(Box::new(BangBang::new(low, high, hysteresis)))
}

/// The name-to-constructor map the loader uses to materialize controllers.
///
/// `McpFacade` is intentionally absent: it wraps a Rust closure supplied by
/// the embedding program, which a data-driven scenario document cannot
/// express. Callers who need it build a harness programmatically instead
/// of going through [`crate::loader::ScenarioLoader`].
pub struct ControllerRegistry {
    constructors: HashMap<String, ControllerConstructor>,
}

impl ControllerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { constructors: HashMap::new() }
    }

    pub fn register(&mut self, class: impl Into<String>, constructor: ControllerConstructor) {
        self.constructors.insert(class.into(), constructor);
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("pid", build_pid);
        registry.register("bang_bang", build_bang_bang);
        registry
    }

    /// # Errors
    ///
    /// Returns [`SimError::UnknownClass`] if `class` is not registered.
    pub fn build(&self, class: &str, params: &Fields) -> Result<Box<dyn Controller>, SimError> {
        let constructor = self.constructors.get(class).ok_or_else(|| SimError::UnknownClass {
            family: "controller".to_string(),
            class_name: class.to_string(),
        })?;
        constructor(params)
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------

/// Collaborators an agent constructor may need beyond its own `config`
/// block: the bus to subscribe/publish against, and the already-built
/// components it might bind to by ID.
pub struct AgentBuildContext<'a> {
    pub bus: &'a MessageBus,
    pub components: &'a BTreeMap<String, ComponentHandle>,
    pub dt: f64,
}

impl<'a> AgentBuildContext<'a> {
    fn component(&self, class: &str, id: &str) -> Result<ComponentHandle, SimError> {
        self.components.get(id).cloned().ok_or_else(|| SimError::WiringError {
            referrer_id: format!("agent class '{class}'"),
            referenced_id: id.to_string(),
        })
    }
}

type AgentConstructor = fn(&str, &serde_json::Value, &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError>;

#[derive(Deserialize)]
struct DigitalTwinConfig {
    component_id: String,
    state_topic: String,
    #[serde(default)]
    smoothing_keys: Vec<String>,
    #[serde(default = "default_alpha")]
    alpha: f64,
}

fn default_alpha() -> f64 {
    1.0
}

fn build_digital_twin(id: &str, config: &serde_json::Value, ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: DigitalTwinConfig = parse_config("digital_twin", config)?;
    let component = ctx.component("digital_twin", &cfg.component_id)?;
    Ok(Box::new(DigitalTwinAgent::new(id, component, cfg.state_topic, cfg.smoothing_keys, cfg.alpha)))
}

#[derive(Deserialize)]
struct ControllerSpec {
    #[serde(rename = "type")]
    class: String,
    #[serde(default)]
    params: Fields,
}

#[derive(Deserialize)]
struct LocalControlConfig {
    controller: ControllerSpec,
    observation_topic: String,
    observation_key: String,
    action_topic: String,
    #[serde(default)]
    command_topic: Option<String>,
    #[serde(default)]
    feedback_topic: Option<String>,
}

fn build_local_control(id: &str, config: &serde_json::Value, ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: LocalControlConfig = parse_config("local_control", config)?;
    let controllers = ControllerRegistry::with_defaults();
    let controller = controllers.build(&cfg.controller.class, &cfg.controller.params)?;
    Ok(Box::new(LocalControlAgent::new(
        id,
        ctx.bus,
        controller,
        cfg.observation_topic,
        cfg.observation_key,
        cfg.action_topic,
        cfg.command_topic.map(Topic::new),
        cfg.feedback_topic.map(Topic::new),
    )))
}

#[derive(Deserialize)]
struct StateTopicSpec {
    topic: String,
    key: String,
}

#[derive(Deserialize)]
struct RuleSpec {
    observation_key: String,
    comparison: String,
    threshold: f64,
    command_topic: String,
    command_key: String,
    command_value: f64,
}

#[derive(Deserialize)]
struct CentralDispatcherConfig {
    state_topics: Vec<StateTopicSpec>,
    rules: Vec<RuleSpec>,
}

fn build_central_dispatcher(id: &str, config: &serde_json::Value, ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: CentralDispatcherConfig = parse_config("central_dispatcher", config)?;
    let state_topics = cfg.state_topics.into_iter().map(|s| (Topic::new(s.topic), s.key)).collect();
    let mut rules = Vec::with_capacity(cfg.rules.len());
    for rule in cfg.rules {
        let comparison = match rule.comparison.as_str() {
            "greater_than" => Comparison::GreaterThan,
            "less_than" => Comparison::LessThan,
            other => {
                return Err(invalid(format!(
                    "central_dispatcher '{id}': unknown comparison '{other}', expected 'greater_than' or 'less_than'"
                )))
            }
        };
        rules.push(ThresholdRule {
            observation_key: rule.observation_key,
            comparison,
            threshold: rule.threshold,
            command_topic: Topic::new(rule.command_topic),
            command_key: rule.command_key,
            command_value: rule.command_value,
        });
    }
    Ok(Box::new(CentralDispatcher::new(id, ctx.bus, state_topics, rules, None)))
}

#[derive(Deserialize)]
struct RainfallConfig {
    topic: String,
    start_time: f64,
    end_time: f64,
    rate: f64,
}

fn build_rainfall(id: &str, config: &serde_json::Value, _ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: RainfallConfig = parse_config("rainfall", config)?;
    Ok(Box::new(RainfallAgent::new(id, cfg.topic, cfg.start_time, cfg.end_time, cfg.rate)))
}

fn build_water_use(id: &str, config: &serde_json::Value, _ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: RainfallConfig = parse_config("water_use", config)?;
    Ok(Box::new(WaterUseAgent::new(id, cfg.topic, cfg.start_time, cfg.end_time, cfg.rate)))
}

#[derive(Deserialize)]
struct CsvInflowConfig {
    topic: String,
    path: String,
}

fn build_csv_inflow(id: &str, config: &serde_json::Value, _ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: CsvInflowConfig = parse_config("csv_inflow", config)?;
    let agent = CsvInflowAgent::from_csv(id, cfg.topic, cfg.path)?;
    Ok(Box::new(agent))
}

#[derive(Deserialize)]
struct ScenarioEventSpec {
    time: f64,
    topic: String,
    #[serde(default)]
    message: Fields,
}

#[derive(Deserialize)]
struct ScenarioAgentConfig {
    events: Vec<ScenarioEventSpec>,
}

fn build_scenario(id: &str, config: &serde_json::Value, _ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: ScenarioAgentConfig = parse_config("scenario", config)?;
    let events = cfg
        .events
        .into_iter()
        .map(|e| ScenarioEvent {
            time: e.time,
            topic: Topic::new(e.topic),
            message: swp_bus::Message::new(e.message),
        })
        .collect();
    Ok(Box::new(ScenarioAgent::new(id, events)))
}

#[derive(Deserialize)]
struct ParameterIdentificationConfig {
    component_id: String,
    input_topic: String,
    observation_topic: String,
    identification_interval: usize,
}

fn build_parameter_identification(id: &str, config: &serde_json::Value, ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
    let cfg: ParameterIdentificationConfig = parse_config("parameter_identification", config)?;
    let component = ctx.component("parameter_identification", &cfg.component_id)?;
    Ok(Box::new(ParameterIdentificationAgent::new(
        id,
        ctx.bus,
        component,
        cfg.input_topic,
        cfg.observation_topic,
        cfg.identification_interval,
    )))
}

#[derive(Deserialize)]
struct DeviceSpec {
    id: String,
    topic: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DecompositionRuleConfig {
    CountBased,
    Proportional { weights: BTreeMap<String, f64> },
    Prioritized { capacities: Vec<(String, f64)> },
}

impl From<DecompositionRuleConfig> for DecompositionRule {
    fn from(config: DecompositionRuleConfig) -> Self {
        match config {
            DecompositionRuleConfig::CountBased => DecompositionRule::CountBased,
            DecompositionRuleConfig::Proportional { weights } => DecompositionRule::Proportional { weights },
            DecompositionRuleConfig::Prioritized { capacities } => DecompositionRule::Prioritized { capacities },
        }
    }
}

#[derive(Deserialize)]
struct StationControlConfig {
    goal_topic: String,
    devices: Vec<DeviceSpec>,
    rule: DecompositionRuleConfig,
}

macro_rules! station_constructor {
    ($fn_name:ident, $agent_ty:ident, $class:literal) => {
        fn $fn_name(id: &str, config: &serde_json::Value, ctx: &AgentBuildContext<'_>) -> Result<Box<dyn Agent>, SimError> {
            let cfg: StationControlConfig = parse_config($class, config)?;
            let devices = cfg.devices.into_iter().map(|d| (d.id, Topic::new(d.topic))).collect();
            Ok(Box::new($agent_ty::new(id, ctx.bus, cfg.goal_topic, devices, cfg.rule.into())))
        }
    };
}

station_constructor!(build_pump_control, PumpControlAgent, "pump_control");
station_constructor!(build_pump_station_control, PumpStationControlAgent, "pump_station_control");
station_constructor!(build_valve_station_control, ValveStationControlAgent, "valve_station_control");
station_constructor!(build_hydropower_station_control, HydropowerStationControlAgent, "hydropower_station_control");

/// The name-to-constructor map the loader uses to materialize agents.
///
/// `DynamicRainfallAgent` is intentionally absent (its rate law is a Rust
/// closure, not data); `McpFacade`-backed local control is unreachable the
/// same way. Both remain available to callers building a harness by hand.
pub struct AgentRegistry {
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { constructors: HashMap::new() }
    }

    pub fn register(&mut self, class: impl Into<String>, constructor: AgentConstructor) {
        self.constructors.insert(class.into(), constructor);
    }

    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("digital_twin", build_digital_twin as AgentConstructor);
        registry.register("local_control", build_local_control as AgentConstructor);
        registry.register("central_dispatcher", build_central_dispatcher as AgentConstructor);
        registry.register("rainfall", build_rainfall as AgentConstructor);
        registry.register("water_use", build_water_use as AgentConstructor);
        registry.register("csv_inflow", build_csv_inflow as AgentConstructor);
        registry.register("scenario", build_scenario as AgentConstructor);
        registry.register("parameter_identification", build_parameter_identification as AgentConstructor);
        registry.register("pump_control", build_pump_control as AgentConstructor);
        registry.register("pump_station_control", build_pump_station_control as AgentConstructor);
        registry.register("valve_station_control", build_valve_station_control as AgentConstructor);
        registry.register("hydropower_station_control", build_hydropower_station_control as AgentConstructor);
        registry
    }

    /// # Errors
    ///
    /// Returns [`SimError::UnknownClass`] if `class` is not registered.
    pub fn build(
        &self,
        class: &str,
        id: &str,
        config: &serde_json::Value,
        ctx: &AgentBuildContext<'_>,
    ) -> Result<Box<dyn Agent>, SimError> {
        let constructor = self.constructors.get(class).ok_or_else(|| SimError::UnknownClass {
            family: "agent".to_string(),
            class_name: class.to_string(),
        })?;
        constructor(id, config, ctx)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
