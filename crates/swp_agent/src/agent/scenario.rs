//! Scripted, one-shot event playback.

use swp_bus::{Message, Topic};

use super::{Agent, AgentContext};

/// One scripted publish: fire `message` on `topic` once `time` has been
/// reached.
#[derive(Debug, Clone)]
pub struct ScenarioEvent {
    pub time: f64,
    pub topic: Topic,
    pub message: Message,
}

/// Holds a time-sorted list of events and publishes each exactly once, on
/// the first tick whose `current_time` reaches its scheduled time. Events
/// are consumed on firing, never replayed.
pub struct ScenarioAgent {
    id: String,
    events: Vec<ScenarioEvent>,
}

impl ScenarioAgent {
    /// Creates the agent, sorting `events` by scheduled time.
    #[must_use]
    pub fn new(id: impl Into<String>, mut events: Vec<ScenarioEvent>) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            id: id.into(),
            events,
        }
    }
}

impl Agent for ScenarioAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        while let Some(event) = self.events.first() {
            if event.time > ctx.current_time {
                break;
            }
            let event = self.events.remove(0);
            let mut message = event.message;
            message.tick = ctx.tick;
            message.time = ctx.current_time;
            let _ = ctx.bus.publish(event.topic, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use swp_bus::{Fields, MessageBus};

    use super::*;

    #[test]
    fn test_events_fire_once_reached_and_never_replay() {
        let bus = MessageBus::new();
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        bus.subscribe("halt", move |_msg| {
            *calls_clone.borrow_mut() += 1;
            Ok(())
        });

        let mut agent = ScenarioAgent::new(
            "script1",
            vec![ScenarioEvent {
                time: 5.0,
                topic: Topic::new("halt"),
                message: Message::new(Fields::new()),
            }],
        );

        let early = AgentContext {
            current_time: 1.0,
            tick: 1,
            dt: 1.0,
            bus: &bus,
        };
        agent.run(&early);
        assert_eq!(*calls.borrow(), 0);

        let on_time = AgentContext {
            current_time: 5.0,
            tick: 5,
            dt: 1.0,
            bus: &bus,
        };
        agent.run(&on_time);
        assert_eq!(*calls.borrow(), 1);

        let later = AgentContext {
            current_time: 10.0,
            tick: 10,
            dt: 1.0,
            bus: &bus,
        };
        agent.run(&later);
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_events_sorted_by_time_regardless_of_input_order() {
        let agent = ScenarioAgent::new(
            "script1",
            vec![
                ScenarioEvent {
                    time: 10.0,
                    topic: Topic::new("a"),
                    message: Message::new(Fields::new()),
                },
                ScenarioEvent {
                    time: 2.0,
                    topic: Topic::new("b"),
                    message: Message::new(Fields::new()),
                },
            ],
        );
        assert_eq!(agent.events[0].time, 2.0);
        assert_eq!(agent.events[1].time, 10.0);
    }
}
