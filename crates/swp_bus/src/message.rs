//! Topics and messages exchanged over the bus.

use serde::{Deserialize, Serialize};

use crate::value::Fields;

/// A slash-delimited topic path, e.g. `state/reservoir/main`.
///
/// Topics are flat strings — the bus does not parse or enforce the
/// slash-delimited hierarchy; it is a convention for callers, not a
/// contract the bus checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    /// Creates a topic from anything string-like.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the topic path as a `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Topic::new(s)
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Topic::new(s)
    }
}

/// An immutable message delivered on a topic.
///
/// The bus has no notion of simulated time, so `tick`/`time` default to
/// zero on construction; publishers that care (agents, with the current
/// tick's [`AgentContext`](../swp_agent/agent/struct.AgentContext.html))
/// set them before calling `publish`. Handlers that need to retain a value
/// must copy it out of `fields`; `Message` carries no interior mutability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The message payload.
    pub fields: Fields,
    /// The tick index during which this message was published.
    pub tick: u64,
    /// The simulated time at which this message was published.
    pub time: f64,
}

impl Message {
    /// Constructs a message with the given payload and zeroed `tick`/`time`.
    /// [`crate::MessageBus`] has no notion of simulated time, so a caller
    /// that cares about delivery metadata (every agent does) sets `tick`/
    /// `time` on the message itself before calling
    /// [`crate::MessageBus::publish`].
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            tick: 0,
            time: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_display() {
        let t = Topic::new("state/reservoir/main");
        assert_eq!(t.to_string(), "state/reservoir/main");
    }

    #[test]
    fn test_topic_equality_is_structural() {
        assert_eq!(Topic::new("a/b"), Topic::from("a/b".to_string()));
    }

    #[test]
    fn test_message_new_has_zeroed_metadata() {
        let msg = Message::new(Fields::new());
        assert_eq!(msg.tick, 0);
        assert_eq!(msg.time, 0.0);
    }
}
