//! The simulation-wide error taxonomy.

use thiserror::Error;

/// Errors surfaced by the message bus, components, agents, the harness, and
/// the scenario loader.
///
/// Every non-recoverable variant carries enough context (tick index,
/// component/agent ID, originating topic, cause) to let a caller print a
/// single structured line naming the failure, as required of the CLI.
/// `HandlerFault` is the one variant the bus recovers from locally — it is
/// logged and publication continues.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration tree is malformed.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Human-readable description of what was wrong.
        reason: String,
    },

    /// A class name in config does not map to a registered constructor.
    #[error("unknown class '{class_name}' in {family} registry")]
    UnknownClass {
        /// Which registry was consulted (`component`, `agent`, `controller`).
        family: &'static str,
        /// The offending class name.
        class_name: String,
    },

    /// A parameter is out of its physical range.
    #[error("invalid parameter '{parameter}' on component '{component_id}': {reason}")]
    InvalidParameter {
        /// The component the parameter belongs to.
        component_id: String,
        /// The offending parameter name.
        parameter: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A referenced component/agent ID is missing.
    #[error("wiring error: '{referenced_id}' referenced by '{referrer_id}' does not exist")]
    WiringError {
        /// The ID that made the reference.
        referrer_id: String,
        /// The ID that could not be found.
        referenced_id: String,
    },

    /// Topology is not a DAG.
    #[error("cycle detected in topology, involving component '{component_id}'")]
    CycleDetected {
        /// One component ID known to participate in the cycle.
        component_id: String,
    },

    /// Bus publish re-entered beyond the allowed cascade depth.
    #[error("cascade depth exceeded {limit} while publishing to '{topic}'")]
    CascadeDepthExceeded {
        /// The topic whose publish triggered the overflow.
        topic: String,
        /// The configured depth limit.
        limit: usize,
    },

    /// A subscriber callback raised. Non-fatal: logged, publication
    /// continues.
    #[error("handler fault on topic '{topic}' (subscriber {subscriber_id}): {reason}")]
    HandlerFault {
        /// The topic being delivered when the handler failed.
        topic: String,
        /// The subscription handle of the failing handler.
        subscriber_id: u64,
        /// The handler's own error description.
        reason: String,
    },

    /// A component's `step` raised. Fatal to the tick and the run.
    #[error("step fault on component '{component_id}' at tick {tick}: {reason}")]
    StepFault {
        /// The component whose `step` failed.
        component_id: String,
        /// The tick index during which the failure occurred.
        tick: u64,
        /// The underlying reason.
        reason: String,
    },

    /// A solver call exceeded its configured bound.
    #[error("optimization timed out after {elapsed_ms}ms (bound {bound_ms}ms) for '{caller_id}'")]
    OptimizationTimeout {
        /// The agent or controller that issued the call.
        caller_id: String,
        /// Configured bound, in milliseconds.
        bound_ms: u64,
        /// Actual elapsed time, in milliseconds.
        elapsed_ms: u64,
    },

    /// An iterative hydraulic solver failed to converge.
    #[error("solver divergence in '{solver_id}' after {iterations} iterations")]
    SolverDivergence {
        /// The solver/component that failed to converge.
        solver_id: String,
        /// Iterations attempted before giving up.
        iterations: u32,
    },

    /// Failed to parse a JSON scenario file.
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to parse a YAML scenario file.
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Failed to read a scenario file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Returns the process exit code the CLI should use for this error, per
    /// the `run-scenario` exit-code table.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::InvalidConfig { .. }
            | SimError::UnknownClass { .. }
            | SimError::Json(_)
            | SimError::Yaml(_)
            | SimError::Io(_) => 2,
            SimError::WiringError { .. } => 3,
            SimError::CycleDetected { .. } => 4,
            SimError::InvalidParameter { .. }
            | SimError::CascadeDepthExceeded { .. }
            | SimError::HandlerFault { .. }
            | SimError::StepFault { .. }
            | SimError::OptimizationTimeout { .. }
            | SimError::SolverDivergence { .. } => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_config() {
        let err = SimError::InvalidConfig {
            reason: "missing dt".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_wiring_error() {
        let err = SimError::WiringError {
            referrer_id: "agent1".into(),
            referenced_id: "res1".into(),
        };
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_cycle_detected() {
        let err = SimError::CycleDetected {
            component_id: "a".into(),
        };
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_runtime_failure() {
        let err = SimError::StepFault {
            component_id: "gate1".into(),
            tick: 10,
            reason: "nan volume".into(),
        };
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_display_includes_context() {
        let err = SimError::HandlerFault {
            topic: "state/reservoir/main".into(),
            subscriber_id: 7,
            reason: "divide by zero".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("state/reservoir/main"));
        assert!(msg.contains('7'));
    }
}
