//! # swp_bus
//!
//! A synchronous, in-process publish/subscribe message bus.
//!
//! This crate provides:
//!
//! - [`ScalarValue`] / [`Fields`] — the scalar-map value type used for
//!   component state, parameters, and bus messages.
//! - [`Topic`] — a thin newtype over a slash-delimited topic string.
//! - [`Message`] — an immutable, timestamped mapping delivered on a topic.
//! - [`MessageBus`] — the synchronous, depth-first delivery bus itself.

pub mod bus;
pub mod message;
pub mod value;

pub use bus::{MessageBus, SubscriptionHandle};
pub use message::{Message, Topic};
pub use value::{Fields, ScalarValue};
