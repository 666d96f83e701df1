//! The core [`Component`] trait.

use swp_bus::{Message, ScalarValue, Topic};
use swp_diag::SimError;

use crate::action::Action;

/// The physical-model abstraction every water-system element implements.
///
/// A component owns its parameters and current state; readers obtain
/// copies via [`get_state`](Component::get_state), never a shared
/// reference. Mutation happens only through the component's own `step` or
/// its own `on_message` handler — the harness never reaches into a
/// component's private fields.
pub trait Component {
    /// The component's unique identifier.
    fn id(&self) -> &str;

    /// The component's immutable construction-time parameters.
    fn parameters(&self) -> &swp_bus::Fields;

    /// Returns a copy of the component's current state.
    fn get_state(&self) -> swp_bus::Fields;

    /// Advances the component by `dt` simulated seconds given `action`,
    /// storing and returning the new state.
    ///
    /// `action` always carries at least `inflow` and `dt`; other keys are
    /// component-specific and default to `0.0` when absent (see
    /// [`Action::get_or_zero`]).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::StepFault`] if the component cannot compute a
    /// next state (this is fatal to the tick and the run).
    fn step(&mut self, action: &Action, dt: f64) -> Result<swp_bus::Fields, SimError>;

    /// Harness-only side channel: overrides the inflow the component will
    /// see in its next `step`, used for disturbance injection outside the
    /// topology graph.
    fn set_inflow(&mut self, value: f64);

    /// Harness-only side channel: directly overrides one state key, used
    /// by `ParameterUpdate`-style disturbances and test setup.
    fn set_state(&mut self, key: &str, value: ScalarValue);

    /// Bus-driven components override this to react to action messages
    /// (e.g. updating a `target_opening`). The default does nothing, which
    /// is correct for components that are not bus-aware.
    ///
    /// Returning `Err` is reported as a [`SimError::HandlerFault`] by the
    /// bus and does not abort message delivery to other subscribers.
    fn on_message(&mut self, _topic: &Topic, _message: &Message) -> Result<(), String> {
        Ok(())
    }

    /// Diagnostics accumulated since construction (e.g. "missing key
    /// treated as zero" notices). Components that don't track diagnostics
    /// return an empty slice.
    fn diagnostics(&self) -> &[String] {
        &[]
    }

    /// Re-fits this component's parameters from a batch of observed
    /// input/observation samples, for
    /// [`ParameterIdentificationAgent`](../swp_agent/agent/parameter_identification/struct.ParameterIdentificationAgent.html)-style
    /// callers. Parameter identification is out of this core's scope
    /// (black-box optimizers are an external collaborator); the default
    /// rejects the call.
    fn identify_parameters(&mut self, _batch: &[swp_bus::Fields]) -> Result<(), SimError> {
        Err(SimError::InvalidParameter {
            component_id: self.id().to_string(),
            parameter: "*".to_string(),
            reason: "this component does not support parameter identification".to_string(),
        })
    }
}

/// Records that `key` was missing from an action mapping and the caller
/// substituted `0.0`, per the "ill-formed action" failure semantics shared
/// by every canonical component.
pub fn record_missing_key(diagnostics: &mut Vec<String>, component_id: &str, key: &str) {
    let note = format!("component '{component_id}': action missing '{key}', treated as 0");
    tracing::debug!(component_id, key, "missing action key defaulted to zero");
    diagnostics.push(note);
}
