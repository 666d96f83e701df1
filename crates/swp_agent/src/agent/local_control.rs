//! A single control loop bound to one controller instance.

use std::cell::RefCell;
use std::rc::Rc;

use swp_bus::{Fields, Message, MessageBus, Topic};
use swp_controller::Controller;

use super::{Agent, AgentContext};

/// Subscribes to `observation_topic`, runs `controller` against the
/// extracted `observation_key`, and publishes `{control_signal: x}` on
/// `action_topic`.
///
/// An optional `command_topic` updates the controller's setpoint from
/// messages carrying `new_setpoint`; an optional `feedback_topic` is
/// forwarded verbatim to a second internal buffer but otherwise unused by
/// the control law itself (reserved for controllers that want raw feedback
/// alongside the scalar observation).
pub struct LocalControlAgent {
    id: String,
    controller: Rc<RefCell<Box<dyn Controller>>>,
    observation_key: String,
    action_topic: Topic,
    latest_observation: Rc<RefCell<Option<f64>>>,
}

impl LocalControlAgent {
    /// Creates the agent and subscribes its bus handlers. `feedback_topic`,
    /// if given, is subscribed only to keep its cascade ordering consistent
    /// with `observation_topic` and `command_topic`; this core's controllers
    /// don't consume it directly.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        bus: &MessageBus,
        controller: Box<dyn Controller>,
        observation_topic: impl Into<Topic>,
        observation_key: impl Into<String>,
        action_topic: impl Into<Topic>,
        command_topic: Option<Topic>,
        feedback_topic: Option<Topic>,
    ) -> Self {
        let id = id.into();
        let controller = Rc::new(RefCell::new(controller));
        let latest_observation = Rc::new(RefCell::new(None));
        let observation_key = observation_key.into();

        let obs_store = latest_observation.clone();
        let obs_key = observation_key.clone();
        bus.subscribe(observation_topic, move |msg: &Message| {
            if let Some(value) = msg.fields.get(&obs_key) {
                *obs_store.borrow_mut() = Some(value.as_f64());
                Ok(())
            } else {
                Err(format!("observation message missing key '{obs_key}'"))
            }
        });

        if let Some(command_topic) = command_topic {
            let controller_handle = controller.clone();
            bus.subscribe(command_topic, move |msg: &Message| {
                if let Some(setpoint) = msg.fields.get("new_setpoint") {
                    controller_handle.borrow_mut().set_setpoint(setpoint.as_f64());
                    Ok(())
                } else {
                    Err("command message missing key 'new_setpoint'".to_string())
                }
            });
        }

        if let Some(feedback_topic) = feedback_topic {
            bus.subscribe(feedback_topic, |_msg: &Message| Ok(()));
        }

        Self {
            id,
            controller,
            observation_key,
            action_topic: action_topic.into(),
            latest_observation,
        }
    }
}

impl Agent for LocalControlAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let Some(observation) = *self.latest_observation.borrow() else {
            return;
        };

        let control_signal = self.controller.borrow_mut().compute_action(observation, ctx.dt);

        let mut fields = Fields::new();
        fields.insert("control_signal".to_string(), control_signal.into());
        let mut message = Message::new(fields);
        message.tick = ctx.tick;
        message.time = ctx.current_time;
        let _ = ctx.bus.publish(self.action_topic.clone(), message);
    }
}
