//! # swp_component
//!
//! The physical-model abstraction: owns local state, exposes
//! `step(action, dt) -> state`, and optionally participates in the bus.
//!
//! This crate provides:
//!
//! - [`Component`] trait — the contract every physical model satisfies.
//! - [`Action`] — the typed view over the per-tick input mapping the
//!   harness builds for `step`.
//! - [`NetworkSolver`] — the seam `st_venant` canals require instead of an
//!   ordinary `step` call.
//! - The canonical component library: [`Reservoir`], [`Gate`], [`Canal`],
//!   [`Pipe`], and the rate-limited device family ([`Pump`], [`Valve`],
//!   [`Turbine`]).

pub mod action;
pub mod canal;
pub mod component;
pub mod device;
pub mod gate;
pub mod network_solver;
pub mod pipe;
pub mod reservoir;

pub use action::Action;
pub use canal::{Canal, CanalModel};
pub use component::Component;
pub use device::{Pump, Turbine, Valve};
pub use gate::Gate;
pub use network_solver::NetworkSolver;
pub use pipe::Pipe;
pub use reservoir::Reservoir;
pub use swp_bus::{Fields, ScalarValue};

/// Shared ownership handle for a component, used wherever a bus subscriber
/// or a bound agent (e.g.
/// [`DigitalTwinAgent`](../swp_agent/agent/perception/struct.DigitalTwinAgent.html))
/// needs access to the same component the harness steps.
pub type ComponentHandle = std::rc::Rc<std::cell::RefCell<dyn Component>>;
