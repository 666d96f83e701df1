//! # swp_harness
//!
//! Ties the message bus, component library, controller library, and agent
//! library together into a runnable simulation: topological step ordering,
//! the two-phase tick loop, and history recording.

pub mod harness;
pub mod sink;
pub mod tick;
pub mod topology;

pub use harness::{RunMode, SimulationHarness};
pub use sink::{HistorySink, JsonLinesSink, NullSink};
pub use tick::TickResult;
pub use topology::Topology;
