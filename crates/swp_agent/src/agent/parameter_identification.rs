//! Buffers samples and periodically re-fits a component's parameters.

use std::cell::RefCell;
use std::rc::Rc;

use swp_bus::{Fields, Message, MessageBus, Topic};
use swp_component::ComponentHandle;

use super::{Agent, AgentContext};

/// Subscribes to an input topic and an observation topic; once
/// `identification_interval` paired samples have accumulated, calls the
/// bound component's `identify_parameters(batch)` and clears the buffer.
///
/// A sample is paired when both an input and an observation message have
/// arrived since the last pairing; unmatched messages are held until their
/// counterpart arrives.
pub struct ParameterIdentificationAgent {
    id: String,
    component: ComponentHandle,
    identification_interval: usize,
    buffer: Rc<RefCell<Vec<Fields>>>,
    pending_input: Rc<RefCell<Option<Fields>>>,
    pending_observation: Rc<RefCell<Option<Fields>>>,
}

impl ParameterIdentificationAgent {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        bus: &MessageBus,
        component: ComponentHandle,
        input_topic: impl Into<Topic>,
        observation_topic: impl Into<Topic>,
        identification_interval: usize,
    ) -> Self {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let pending_input = Rc::new(RefCell::new(None));
        let pending_observation = Rc::new(RefCell::new(None));

        let input_store = pending_input.clone();
        bus.subscribe(input_topic, move |msg: &Message| {
            *input_store.borrow_mut() = Some(msg.fields.clone());
            Ok(())
        });

        let obs_store = pending_observation.clone();
        let buffer_store = buffer.clone();
        let input_for_pairing = pending_input.clone();
        bus.subscribe(observation_topic, move |msg: &Message| {
            *obs_store.borrow_mut() = Some(msg.fields.clone());
            if let (Some(input), Some(observation)) =
                (input_for_pairing.borrow_mut().take(), obs_store.borrow_mut().take())
            {
                let mut sample = input;
                sample.extend(observation);
                buffer_store.borrow_mut().push(sample);
            }
            Ok(())
        });

        Self {
            id: id.into(),
            component,
            identification_interval,
            buffer,
            pending_input,
            pending_observation,
        }
    }
}

impl Agent for ParameterIdentificationAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, _ctx: &AgentContext) {
        if self.buffer.borrow().len() < self.identification_interval {
            return;
        }

        let batch = std::mem::take(&mut *self.buffer.borrow_mut());
        if let Err(err) = self.component.borrow_mut().identify_parameters(&batch) {
            tracing::warn!(%err, agent_id = %self.id, "parameter identification batch rejected");
        }
    }
}

#[cfg(test)]
mod tests {
    use swp_bus::ScalarValue;
    use swp_component::{Component, Reservoir};
    use std::cell::RefCell as Cell;
    use std::rc::Rc as R;

    use super::*;

    #[test]
    fn test_identification_fires_after_interval_samples() {
        let mut params = Fields::new();
        params.insert(
            Reservoir::PARAM_SURFACE_AREA.to_string(),
            ScalarValue::Float(100.0),
        );
        params.insert(
            Reservoir::PARAM_MAX_VOLUME.to_string(),
            ScalarValue::Float(1000.0),
        );
        let component: ComponentHandle = R::new(Cell::new(Reservoir::new("r1", params, 10.0).unwrap()));

        let bus = MessageBus::new();
        let mut agent =
            ParameterIdentificationAgent::new("pid1", &bus, component, "input", "observation", 2);

        for i in 0..2 {
            let mut input_fields = Fields::new();
            input_fields.insert("inflow".to_string(), (i as f64).into());
            bus.publish("input", Message::new(input_fields)).unwrap();

            let mut obs_fields = Fields::new();
            obs_fields.insert("volume".to_string(), (i as f64).into());
            bus.publish("observation", Message::new(obs_fields)).unwrap();
        }

        assert_eq!(agent.buffer.borrow().len(), 2);

        let ctx = AgentContext {
            current_time: 0.0,
            tick: 0,
            dt: 1.0,
            bus: &bus,
        };
        agent.run(&ctx);

        // Reservoir rejects identify_parameters by default, but the buffer
        // must still have been drained regardless of the outcome.
        assert_eq!(agent.buffer.borrow().len(), 0);
    }
}
