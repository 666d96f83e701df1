//! Station-level control: decomposes one goal into per-device commands.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use swp_bus::{Fields, Message, MessageBus, Topic};

use super::{Agent, AgentContext};

/// How a station control agent splits a station-level target across its
/// member devices.
#[derive(Debug, Clone)]
pub enum DecompositionRule {
    /// Split the target evenly across every device.
    CountBased,
    /// Split the target proportionally to each device's configured weight
    /// (weights need not sum to `1.0`; they are normalized internally).
    Proportional { weights: BTreeMap<String, f64> },
    /// Fill devices to their configured capacity in priority order (the
    /// order of `capacities`' keys, as inserted) until the target is
    /// exhausted; remaining devices receive `0.0`.
    Prioritized { capacities: Vec<(String, f64)> },
}

fn decompose(rule: &DecompositionRule, total: f64, device_ids: &[String]) -> Vec<(String, f64)> {
    match rule {
        DecompositionRule::CountBased => {
            if device_ids.is_empty() {
                return Vec::new();
            }
            let share = total / device_ids.len() as f64;
            device_ids.iter().map(|id| (id.clone(), share)).collect()
        }
        DecompositionRule::Proportional { weights } => {
            let total_weight: f64 = device_ids.iter().map(|id| weights.get(id).copied().unwrap_or(0.0)).sum();
            if total_weight <= 0.0 {
                return device_ids.iter().map(|id| (id.clone(), 0.0)).collect();
            }
            device_ids
                .iter()
                .map(|id| {
                    let weight = weights.get(id).copied().unwrap_or(0.0);
                    (id.clone(), total * weight / total_weight)
                })
                .collect()
        }
        DecompositionRule::Prioritized { capacities } => {
            let mut remaining = total;
            let mut out = Vec::new();
            for (id, capacity) in capacities {
                let share = remaining.clamp(0.0, *capacity);
                out.push((id.clone(), share));
                remaining -= share;
            }
            out
        }
    }
}

/// The generic station-control core shared by [`PumpControlAgent`],
/// [`PumpStationControlAgent`], [`ValveStationControlAgent`], and
/// [`HydropowerStationControlAgent`] — each differs only in its `command_key`
/// and its registered class name, all sharing the same [`DecompositionRule`]
/// family.
struct StationCore {
    id: String,
    device_ids: Vec<String>,
    device_topics: Vec<Topic>,
    rule: DecompositionRule,
    command_key: &'static str,
    latest_goal: Rc<RefCell<Option<f64>>>,
}

impl StationCore {
    fn new(
        id: impl Into<String>,
        bus: &MessageBus,
        goal_topic: impl Into<Topic>,
        devices: Vec<(String, Topic)>,
        rule: DecompositionRule,
        command_key: &'static str,
    ) -> Self {
        let latest_goal = Rc::new(RefCell::new(None));
        let goal_store = latest_goal.clone();
        bus.subscribe(goal_topic, move |msg: &Message| {
            if let Some(value) = msg.fields.get("target") {
                *goal_store.borrow_mut() = Some(value.as_f64());
                Ok(())
            } else {
                Err("station goal message missing key 'target'".to_string())
            }
        });

        let (device_ids, device_topics) = devices.into_iter().unzip();

        Self {
            id: id.into(),
            device_ids,
            device_topics,
            rule,
            command_key,
            latest_goal,
        }
    }

    fn run(&mut self, ctx: &AgentContext) {
        let Some(goal) = *self.latest_goal.borrow() else {
            return;
        };

        for (device_id, share) in decompose(&self.rule, goal, &self.device_ids) {
            let Some(index) = self.device_ids.iter().position(|id| id == &device_id) else {
                continue;
            };
            let mut fields = Fields::new();
            fields.insert(self.command_key.to_string(), share.into());
            let mut message = Message::new(fields);
            message.tick = ctx.tick;
            message.time = ctx.current_time;
            let _ = ctx.bus.publish(self.device_topics[index].clone(), message);
        }
    }
}

macro_rules! station_control_agent {
    ($name:ident, $command_key:literal, $doc:literal) => {
        #[doc = $doc]
        pub struct $name(StationCore);

        impl $name {
            /// Creates the station agent. `devices` pairs each member
            /// device's ID with the topic its individual command is
            /// published on.
            #[must_use]
            pub fn new(
                id: impl Into<String>,
                bus: &MessageBus,
                goal_topic: impl Into<Topic>,
                devices: Vec<(String, Topic)>,
                rule: DecompositionRule,
            ) -> Self {
                Self(StationCore::new(id, bus, goal_topic, devices, rule, $command_key))
            }
        }

        impl Agent for $name {
            fn id(&self) -> &str {
                &self.0.id
            }

            fn run(&mut self, ctx: &AgentContext) {
                self.0.run(ctx);
            }
        }
    };
}

station_control_agent!(
    PumpControlAgent,
    "flow_command",
    "Decomposes a station flow-rate goal across member pumps."
);
station_control_agent!(
    PumpStationControlAgent,
    "flow_command",
    "Station-level pump coordinator, distinct from `PumpControlAgent` at the registry level but sharing the same decomposition core."
);
station_control_agent!(
    ValveStationControlAgent,
    "opening_command",
    "Decomposes a station discharge goal across member valves."
);
station_control_agent!(
    HydropowerStationControlAgent,
    "power_command",
    "Decomposes a station power goal across member turbines."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_based_splits_evenly() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let shares = decompose(&DecompositionRule::CountBased, 9.0, &ids);
        assert!(shares.iter().all(|(_, v)| (*v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_proportional_respects_weights() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let mut weights = BTreeMap::new();
        weights.insert("a".to_string(), 1.0);
        weights.insert("b".to_string(), 3.0);
        let shares = decompose(&DecompositionRule::Proportional { weights }, 8.0, &ids);
        let a = shares.iter().find(|(id, _)| id == "a").unwrap().1;
        let b = shares.iter().find(|(id, _)| id == "b").unwrap().1;
        assert!((a - 2.0).abs() < 1e-9);
        assert!((b - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_prioritized_fills_in_order_then_stops() {
        let capacities = vec![("a".to_string(), 5.0), ("b".to_string(), 5.0)];
        let shares = decompose(&DecompositionRule::Prioritized { capacities }, 7.0, &[]);
        let a = shares.iter().find(|(id, _)| id == "a").unwrap().1;
        let b = shares.iter().find(|(id, _)| id == "b").unwrap().1;
        assert!((a - 5.0).abs() < 1e-9);
        assert!((b - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pump_control_agent_publishes_per_device_commands() {
        let bus = MessageBus::new();
        let received = Rc::new(RefCell::new(Vec::new()));
        let received_clone = received.clone();
        bus.subscribe("pump/a/cmd", move |msg| {
            received_clone.borrow_mut().push(msg.fields.clone());
            Ok(())
        });

        let mut agent = PumpControlAgent::new(
            "station1",
            &bus,
            "station1/goal",
            vec![("a".to_string(), Topic::new("pump/a/cmd"))],
            DecompositionRule::CountBased,
        );

        let mut goal_fields = Fields::new();
        goal_fields.insert("target".to_string(), 10.0.into());
        bus.publish("station1/goal", Message::new(goal_fields)).unwrap();

        let ctx = AgentContext {
            current_time: 0.0,
            tick: 0,
            dt: 1.0,
            bus: &bus,
        };
        agent.run(&ctx);

        assert_eq!(received.borrow().len(), 1);
        assert_eq!(
            received.borrow()[0].get("flow_command").unwrap().as_f64(),
            10.0
        );
    }
}
