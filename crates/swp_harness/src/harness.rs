//! The topology-aware, two-phase simulation loop.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use swp_agent::{Agent, AgentContext};
use swp_bus::value::FieldsExt;
use swp_bus::{Message, MessageBus, Topic};
use swp_component::{Action, Canal, ComponentHandle, NetworkSolver};
use swp_controller::Controller;
use swp_diag::SimError;

use crate::sink::{HistorySink, NullSink};
use crate::tick::TickResult;
use crate::topology::Topology;

/// Whether control during Phase A comes from registered agents driving the
/// bus (`Mas`), or from controllers the harness itself invokes directly
/// (`Orchestrated`). Both modes share Phase B unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Orchestrated,
    Mas,
}

struct ControllerBinding {
    controlled_id: String,
    observed_id: String,
    observation_key: String,
    controller: RefCell<Box<dyn Controller>>,
}

/// Owns the bus, the component registry, the agent registry, the topology,
/// and the accumulated history for one simulation run.
pub struct SimulationHarness {
    bus: Rc<MessageBus>,
    components: BTreeMap<String, ComponentHandle>,
    st_venant: Vec<(String, Rc<RefCell<Canal>>)>,
    agents: Vec<Box<dyn Agent>>,
    controllers: Vec<ControllerBinding>,
    network_solver: Option<Box<dyn NetworkSolver>>,
    edges: Vec<(String, String)>,
    topology: Option<Topology>,
    history: Vec<TickResult>,
    sink: Box<dyn HistorySink>,
    dt: f64,
}

impl SimulationHarness {
    /// Creates an empty harness with its own fresh bus and timestep `dt`.
    ///
    /// # Panics
    ///
    /// Does not panic; `dt` is validated at [`Self::build`].
    #[must_use]
    pub fn new(dt: f64) -> Self {
        Self {
            bus: Rc::new(MessageBus::new()),
            components: BTreeMap::new(),
            st_venant: Vec::new(),
            agents: Vec::new(),
            controllers: Vec::new(),
            network_solver: None,
            edges: Vec::new(),
            topology: None,
            history: Vec::new(),
            sink: Box::new(NullSink),
            dt,
        }
    }

    /// The harness's bus, for constructing bus-aware components and agents
    /// before they are registered.
    #[must_use]
    pub fn bus(&self) -> &Rc<MessageBus> {
        &self.bus
    }

    /// Registers an ordinary component, stepped in topological order during
    /// Phase B.
    #[must_use]
    pub fn add_component(mut self, id: impl Into<String>, component: ComponentHandle) -> Self {
        self.components.insert(id.into(), component);
        self
    }

    /// Registers a `st_venant` canal. Unlike [`Self::add_component`], this
    /// keeps the concrete type so a [`NetworkSolver`] can mutate it
    /// directly; `build` requires a solver to be registered whenever this
    /// is called at least once.
    #[must_use]
    pub fn add_st_venant_canal(mut self, id: impl Into<String>, canal: Rc<RefCell<Canal>>) -> Self {
        let id = id.into();
        self.components.insert(id.clone(), canal.clone());
        self.st_venant.push((id, canal));
        self
    }

    /// Registers the collaborator that solves every `st_venant` canal
    /// together, once per tick.
    #[must_use]
    pub fn with_network_solver(mut self, solver: Box<dyn NetworkSolver>) -> Self {
        self.network_solver = Some(solver);
        self
    }

    /// Subscribes `component_id`'s [`Component::on_message`](swp_component::Component::on_message)
    /// to `topic`, per a config component's `subscribes_to` entry. A
    /// no-op if `component_id` is not registered.
    #[must_use]
    pub fn bind_component_topic(self, topic: impl Into<Topic>, component_id: impl Into<String>) -> Self {
        let component_id = component_id.into();
        if let Some(component) = self.components.get(&component_id) {
            let component = component.clone();
            let topic: Topic = topic.into();
            let topic_for_handler = topic.clone();
            self.bus.subscribe(topic, move |msg: &Message| {
                component.borrow_mut().on_message(&topic_for_handler, msg)
            });
        }
        self
    }

    /// Registers an agent; agents run in registration order during Phase A
    /// of MAS-mode runs.
    #[must_use]
    pub fn add_agent(mut self, agent: Box<dyn Agent>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Declares a directed wiring edge from `upstream_id` to
    /// `downstream_id`.
    #[must_use]
    pub fn add_connection(mut self, upstream_id: impl Into<String>, downstream_id: impl Into<String>) -> Self {
        self.edges.push((upstream_id.into(), downstream_id.into()));
        self
    }

    /// Registers a controller the harness itself invokes in orchestrated
    /// mode: each tick, `controller` observes `observed_id`'s
    /// `observation_key` and its output becomes `controlled_id`'s
    /// `control_signal` for that tick's Phase B.
    #[must_use]
    pub fn add_controller(
        mut self,
        controlled_id: impl Into<String>,
        observed_id: impl Into<String>,
        observation_key: impl Into<String>,
        controller: Box<dyn Controller>,
    ) -> Self {
        self.controllers.push(ControllerBinding {
            controlled_id: controlled_id.into(),
            observed_id: observed_id.into(),
            observation_key: observation_key.into(),
            controller: RefCell::new(controller),
        });
        self
    }

    /// Installs a streaming history sink, replacing the default
    /// [`NullSink`].
    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn HistorySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validates wiring, computes the topological order, and rejects any
    /// `st_venant` canal left without a registered [`NetworkSolver`].
    ///
    /// # Errors
    ///
    /// Returns [`SimError::WiringError`] if a connection endpoint is not a
    /// registered component, [`SimError::CycleDetected`] if the topology is
    /// not a DAG, or [`SimError::InvalidConfig`] if `st_venant` canals are
    /// present without a solver, or `dt` is non-positive.
    pub fn build(mut self) -> Result<Self, SimError> {
        if self.dt <= 0.0 {
            return Err(SimError::InvalidConfig {
                reason: "dt must be positive".to_string(),
            });
        }

        for (upstream, downstream) in &self.edges {
            if !self.components.contains_key(upstream) {
                return Err(SimError::WiringError {
                    referrer_id: downstream.clone(),
                    referenced_id: upstream.clone(),
                });
            }
            if !self.components.contains_key(downstream) {
                return Err(SimError::WiringError {
                    referrer_id: upstream.clone(),
                    referenced_id: downstream.clone(),
                });
            }
        }

        if !self.st_venant.is_empty() && self.network_solver.is_none() {
            return Err(SimError::InvalidConfig {
                reason: "st_venant canals are registered but no NetworkSolver was provided"
                    .to_string(),
            });
        }

        let node_ids: Vec<String> = self.components.keys().cloned().collect();
        let topology = Topology::build(&node_ids, &self.edges)?;
        self.topology = Some(topology);

        Ok(self)
    }

    /// The accumulated per-tick history.
    #[must_use]
    pub fn history(&self) -> &[TickResult] {
        &self.history
    }

    fn topology(&self) -> &Topology {
        self.topology
            .as_ref()
            .expect("run called before build; SimulationHarness::build must succeed first")
    }

    fn average_field_live(&self, ids: &[String], key: &str) -> f64 {
        let values: Vec<f64> = ids
            .iter()
            .filter_map(|id| self.components.get(id))
            .filter_map(|c| c.borrow().get_state().get(key).map(|v| v.as_f64()))
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    fn average_field_snapshot(&self, ids: &[String], snapshot: &BTreeMap<String, swp_bus::Fields>, key: &str) -> f64 {
        let values: Vec<f64> = ids
            .iter()
            .filter_map(|id| snapshot.get(id))
            .filter_map(|state| state.get(key).map(|v| v.as_f64()))
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Runs `num_steps` ticks of the two-phase loop.
    ///
    /// # Errors
    ///
    /// Returns an error (other than [`SimError::HandlerFault`], which the
    /// bus recovers from internally) the first time a phase fails; the
    /// history accumulated up to that tick remains available via
    /// [`Self::history`].
    pub fn run(&mut self, mode: RunMode, num_steps: u64) -> Result<(), SimError> {
        let st_venant_ids: std::collections::BTreeSet<String> =
            self.st_venant.iter().map(|(id, _)| id.clone()).collect();

        for tick in 0..num_steps {
            let current_time = tick as f64 * self.dt;

            let start_of_tick_snapshot: BTreeMap<String, swp_bus::Fields> = self
                .components
                .iter()
                .map(|(id, component)| (id.clone(), component.borrow().get_state()))
                .collect();

            let mut orchestrated_signals: BTreeMap<String, f64> = BTreeMap::new();

            match mode {
                RunMode::Mas => {
                    let ctx = AgentContext {
                        current_time,
                        tick,
                        dt: self.dt,
                        bus: self.bus.as_ref(),
                    };
                    for agent in &mut self.agents {
                        agent.run(&ctx);
                    }
                }
                RunMode::Orchestrated => {
                    for binding in &self.controllers {
                        let observation = start_of_tick_snapshot
                            .get(&binding.observed_id)
                            .map(|state| state.get_f64_or(&binding.observation_key, 0.0))
                            .unwrap_or(0.0);
                        let output = binding
                            .controller
                            .borrow_mut()
                            .compute_action(observation, self.dt);
                        orchestrated_signals.insert(binding.controlled_id.clone(), output);
                    }
                }
            }

            if let Some(solver) = self.network_solver.as_mut() {
                if !self.st_venant.is_empty() {
                    let mut canals: Vec<_> = self
                        .st_venant
                        .iter()
                        .map(|(_, canal)| canal.borrow_mut())
                        .collect();
                    let mut refs: Vec<&mut Canal> = canals.iter_mut().map(|r| &mut **r).collect();
                    solver.solve(&mut refs)?;
                }
            }

            for id in self.topology().order() {
                if st_venant_ids.contains(id) {
                    continue;
                }
                let Some(component) = self.components.get(id) else {
                    continue;
                };

                let predecessors = self.topology().predecessors(id).to_vec();
                let successors = self.topology().successors(id).to_vec();

                let inflow: f64 = predecessors
                    .iter()
                    .filter_map(|p| self.components.get(p))
                    .map(|p| p.borrow().get_state().get_f64_or("outflow", 0.0))
                    .sum();
                let upstream_head = self.average_field_live(&predecessors, "water_level");
                let downstream_head = self.average_field_snapshot(&successors, &start_of_tick_snapshot, "water_level");

                let mut action = Action::new(swp_bus::Fields::new())
                    .with("inflow", inflow)
                    .with("dt", self.dt)
                    .with("upstream_head", upstream_head)
                    .with("downstream_head", downstream_head);

                if !successors.is_empty() {
                    let outflow_demand: f64 = successors
                        .iter()
                        .filter_map(|s| start_of_tick_snapshot.get(s))
                        .map(|state| state.get_f64_or("outflow", 0.0))
                        .sum();
                    action = action.with("outflow_demand", outflow_demand);
                }

                if let Some(signal) = orchestrated_signals.get(id) {
                    action = action.with("control_signal", *signal);
                }

                let result = component.borrow_mut().step(&action, self.dt);
                if let Err(err) = result {
                    let err = match err {
                        SimError::StepFault { component_id, reason, .. } => SimError::StepFault {
                            component_id,
                            tick,
                            reason,
                        },
                        other => other,
                    };
                    return Err(err);
                }
            }

            let states: BTreeMap<String, swp_bus::Fields> = self
                .components
                .iter()
                .map(|(id, component)| (id.clone(), component.borrow().get_state()))
                .collect();
            let tick_result = TickResult {
                tick,
                time: current_time,
                states,
            };
            self.sink.on_tick(&tick_result)?;
            self.history.push(tick_result);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use swp_bus::{Fields, ScalarValue};
    use swp_component::Reservoir;

    use super::*;

    fn reservoir_handle(id: &str, area: f64, max_volume: f64, initial: f64) -> ComponentHandle {
        let mut params = Fields::new();
        params.insert(Reservoir::PARAM_SURFACE_AREA.to_string(), ScalarValue::Float(area));
        params.insert(Reservoir::PARAM_MAX_VOLUME.to_string(), ScalarValue::Float(max_volume));
        Rc::new(RefCell::new(Reservoir::new(id, params, initial).unwrap()))
    }

    #[test]
    fn test_single_reservoir_runs_requested_ticks() {
        let harness = SimulationHarness::new(1.0)
            .add_component("r1", reservoir_handle("r1", 100.0, 1000.0, 10.0))
            .build()
            .unwrap();
        let mut harness = harness;
        harness.run(RunMode::Mas, 5).unwrap();
        assert_eq!(harness.history().len(), 5);
    }

    #[test]
    fn test_tick_times_match_dt_multiples() {
        let mut harness = SimulationHarness::new(2.0)
            .add_component("r1", reservoir_handle("r1", 100.0, 1000.0, 10.0))
            .build()
            .unwrap();
        harness.run(RunMode::Mas, 3).unwrap();
        let times: Vec<f64> = harness.history().iter().map(|r| r.time).collect();
        assert_eq!(times, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_wiring_error_on_unknown_connection_endpoint() {
        let err = SimulationHarness::new(1.0)
            .add_component("r1", reservoir_handle("r1", 100.0, 1000.0, 10.0))
            .add_connection("r1", "ghost")
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::WiringError { .. }));
    }

    #[test]
    fn test_cycle_rejected_with_no_history() {
        let err = SimulationHarness::new(1.0)
            .add_component("a", reservoir_handle("a", 100.0, 1000.0, 10.0))
            .add_component("b", reservoir_handle("b", 100.0, 1000.0, 10.0))
            .add_connection("a", "b")
            .add_connection("b", "a")
            .build()
            .unwrap_err();
        assert!(matches!(err, SimError::CycleDetected { .. }));
    }

    #[test]
    fn test_inflow_propagates_downstream_same_tick() {
        let upstream = reservoir_handle("up", 10.0, 1_000_000.0, 1000.0);
        {
            upstream.borrow_mut().set_state("outflow", ScalarValue::Float(50.0));
        }
        let downstream = reservoir_handle("down", 10.0, 1_000_000.0, 0.0);

        let mut harness = SimulationHarness::new(1.0)
            .add_component("up", upstream)
            .add_component("down", downstream)
            .add_connection("up", "down")
            .build()
            .unwrap();
        harness.run(RunMode::Mas, 1).unwrap();

        let down_volume = harness.history()[0].states["down"].get("volume").unwrap().as_f64();
        assert!(down_volume > 0.0);
    }
}
