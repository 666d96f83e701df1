//! # swp_controller
//!
//! The control-strategy abstraction bound to a
//! [`LocalControlAgent`](../swp_agent/agent/local_control/struct.LocalControlAgent.html)
//! in MAS mode, or invoked directly by the harness in orchestrated mode.
//!
//! This crate provides:
//!
//! - [`Controller`] trait — the contract every control strategy satisfies.
//! - [`Pid`] — the canonical PID controller with anti-windup.
//! - [`BangBang`] — a two-level on/off controller.
//! - [`McpFacade`] — a thin seam over an injected closure, for callers who
//!   want to drive a component with an external optimizer instead of a
//!   closed-form law.

pub mod bang_bang;
pub mod controller;
pub mod mcp_facade;
pub mod pid;

pub use bang_bang::BangBang;
pub use controller::Controller;
pub use mcp_facade::McpFacade;
pub use pid::Pid;
