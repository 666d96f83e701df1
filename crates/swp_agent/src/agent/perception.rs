//! Perception agents: publish a bound component's state to the bus.

use std::collections::BTreeMap;

use swp_bus::{Fields, Message, Topic};
use swp_component::ComponentHandle;

use super::{Agent, AgentContext};

/// Reads its bound component's state each tick and publishes it (optionally
/// EMA-smoothed on a configured subset of keys) to `state_topic`.
///
/// Smoothing applies only to the keys named in `smoothing_keys`; every
/// other state key is forwarded unchanged. A key absent from the raw state
/// on a given tick is simply omitted that tick rather than carried forward
/// from the smoothed average.
pub struct DigitalTwinAgent {
    id: String,
    component: ComponentHandle,
    state_topic: Topic,
    smoothing_keys: Vec<String>,
    alpha: f64,
    smoothed: BTreeMap<String, f64>,
}

impl DigitalTwinAgent {
    /// Creates a digital-twin agent bound to `component`. `alpha` is the
    /// EMA smoothing factor (`1.0` disables smoothing entirely, behaving
    /// as a pass-through regardless of `smoothing_keys`).
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        component: ComponentHandle,
        state_topic: impl Into<Topic>,
        smoothing_keys: Vec<String>,
        alpha: f64,
    ) -> Self {
        Self {
            id: id.into(),
            component,
            state_topic: state_topic.into(),
            smoothing_keys,
            alpha,
            smoothed: BTreeMap::new(),
        }
    }
}

impl Agent for DigitalTwinAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let raw = self.component.borrow().get_state();
        let mut fields = Fields::new();

        for (key, value) in &raw {
            if self.smoothing_keys.iter().any(|k| k == key) {
                let sample = value.as_f64();
                let smoothed = self
                    .smoothed
                    .get(key)
                    .map_or(sample, |prev| self.alpha * sample + (1.0 - self.alpha) * prev);
                self.smoothed.insert(key.clone(), smoothed);
                fields.insert(key.clone(), smoothed.into());
            } else {
                fields.insert(key.clone(), value.clone());
            }
        }

        let mut message = Message::new(fields);
        message.tick = ctx.tick;
        message.time = ctx.current_time;
        let _ = ctx.bus.publish(self.state_topic.clone(), message);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use swp_bus::MessageBus;
    use swp_component::{Component, Reservoir, ScalarValue};

    use super::*;

    fn reservoir() -> ComponentHandle {
        let mut params = Fields::new();
        params.insert(
            Reservoir::PARAM_SURFACE_AREA.to_string(),
            ScalarValue::Float(100.0),
        );
        params.insert(
            Reservoir::PARAM_MAX_VOLUME.to_string(),
            ScalarValue::Float(1000.0),
        );
        Rc::new(RefCell::new(
            Reservoir::new("r1", params, 50.0).unwrap(),
        ))
    }

    #[test]
    fn test_smoothing_applies_only_to_configured_keys() {
        let component = reservoir();
        let bus = MessageBus::new();
        let received = Rc::new(RefCell::new(None));
        let received_clone = received.clone();
        bus.subscribe("twin/r1", move |msg| {
            *received_clone.borrow_mut() = Some(msg.fields.clone());
            Ok(())
        });

        let mut agent = DigitalTwinAgent::new(
            "twin1",
            component,
            "twin/r1",
            vec!["volume".to_string()],
            0.5,
        );
        let ctx = AgentContext {
            current_time: 0.0,
            tick: 0,
            dt: 1.0,
            bus: &bus,
        };
        agent.run(&ctx);
        agent.run(&ctx);

        let fields = received.borrow().clone().unwrap();
        // water_level is unsmoothed, so it equals the raw reservoir state.
        assert_eq!(
            fields.get("water_level").unwrap().as_f64(),
            50.0 / 100.0
        );
        // volume is smoothed but the component never changed, so the EMA
        // converges to the same constant value anyway.
        assert!((fields.get("volume").unwrap().as_f64() - 50.0).abs() < 1e-9);
    }
}
