//! Central rule-table dispatch, with an optional pluggable solver fallback.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use swp_bus::{Fields, Message, MessageBus, Topic};

use super::{Agent, AgentContext};

/// The comparison a [`ThresholdRule`] applies between an observed value and
/// its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    LessThan,
}

/// One row of the dispatcher's rule table: if the named observation passes
/// the comparison against `threshold`, publish `{command_key: command_value}`
/// to `command_topic`. `command_key` is typically `"control_signal"` for a
/// directly-actuated component, or `"new_setpoint"` to retarget a
/// downstream [`LocalControlAgent`](super::LocalControlAgent).
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    pub observation_key: String,
    pub comparison: Comparison,
    pub threshold: f64,
    pub command_topic: Topic,
    pub command_key: String,
    pub command_value: f64,
}

/// A solver invoked when no rule matches, given the dispatcher's current
/// observation snapshot; returns a `(topic, fields)` command to publish, or
/// `None` to issue nothing this tick.
pub type FallbackSolver = Box<dyn FnMut(&BTreeMap<String, f64>) -> Option<(Topic, Fields)>>;

/// Subscribes to one or more state topics, evaluates an ordered rule table
/// against the latest observation of each named key (first match wins),
/// and publishes the matching rule's command. Falls back to an optional
/// injected solver when no rule matches.
pub struct CentralDispatcher {
    id: String,
    rules: Vec<ThresholdRule>,
    observations: Rc<RefCell<BTreeMap<String, f64>>>,
    fallback: Option<FallbackSolver>,
}

impl CentralDispatcher {
    /// Creates the dispatcher and subscribes it to every state topic named
    /// in `state_topics`, storing the latest value of `observation_key`
    /// from each under that same key.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        bus: &MessageBus,
        state_topics: Vec<(Topic, String)>,
        rules: Vec<ThresholdRule>,
        fallback: Option<FallbackSolver>,
    ) -> Self {
        let observations = Rc::new(RefCell::new(BTreeMap::new()));

        for (topic, observation_key) in state_topics {
            let store = observations.clone();
            let key = observation_key.clone();
            bus.subscribe(topic, move |msg: &Message| {
                if let Some(value) = msg.fields.get(&key) {
                    store.borrow_mut().insert(key.clone(), value.as_f64());
                    Ok(())
                } else {
                    Err(format!("dispatcher observation missing key '{key}'"))
                }
            });
        }

        Self {
            id: id.into(),
            rules,
            observations,
            fallback,
        }
    }
}

impl Agent for CentralDispatcher {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let observations = self.observations.borrow().clone();

        let matched = self.rules.iter().find(|rule| {
            observations.get(&rule.observation_key).is_some_and(|value| match rule.comparison {
                Comparison::GreaterThan => *value > rule.threshold,
                Comparison::LessThan => *value < rule.threshold,
            })
        });

        if let Some(rule) = matched {
            let mut fields = Fields::new();
            fields.insert(rule.command_key.clone(), rule.command_value.into());
            let mut message = Message::new(fields);
            message.tick = ctx.tick;
            message.time = ctx.current_time;
            let _ = ctx.bus.publish(rule.command_topic.clone(), message);
            return;
        }

        if let Some(solver) = self.fallback.as_mut() {
            if let Some((topic, fields)) = solver(&observations) {
                let mut message = Message::new(fields);
                message.tick = ctx.tick;
                message.time = ctx.current_time;
                let _ = ctx.bus.publish(topic, message);
            }
        }
    }
}
