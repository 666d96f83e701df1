//! # swp_agent
//!
//! The control-and-coordination abstraction that drives the bus during
//! Phase A of a tick: perception, local control, station-level
//! decomposition, central dispatch, disturbance injection, scripted
//! scenario playback, and parameter identification.
//!
//! This crate provides:
//!
//! - [`Agent`] trait and [`AgentContext`] — the contract and per-tick
//!   context every agent runs under.
//! - `agent::*` — the canonical agent library, one module per family.

pub mod agent;

pub use agent::Agent;
pub use agent::AgentContext;
