//! The per-tick action mapping passed to [`crate::Component::step`].

use swp_bus::{Fields, ScalarValue};

/// The input the harness builds for a component's `step` call each tick.
///
/// Always carries at least `inflow` and `dt`. Some components additionally
/// receive `upstream_head`, `downstream_head`, and `control_signal` — those
/// are read with a default of `0.0` and absence is not an error by itself
/// (only `inflow` and `dt` are guaranteed present by the harness; reading
/// any other key through [`Action::get_or_zero`] silently defaults, per the
/// "missing key treated as zero" contract).
#[derive(Debug, Clone, Default)]
pub struct Action {
    fields: Fields,
}

impl Action {
    /// Wraps a raw field map as an `Action`.
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    /// Sets a field, builder-style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a named field as `f64`, or `0.0` if absent. The caller is
    /// responsible for recording a diagnostic when absence is unexpected
    /// (see [`crate::component::Component::step`] implementations).
    #[must_use]
    pub fn get_or_zero(&self, key: &str) -> f64 {
        self.fields.get(key).map_or(0.0, |v| v.as_f64())
    }

    /// Returns whether `key` was present in the action mapping.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// The summed upstream outflow for this tick.
    #[must_use]
    pub fn inflow(&self) -> f64 {
        self.get_or_zero("inflow")
    }

    /// The tick's timestep, in simulated seconds.
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.get_or_zero("dt")
    }

    /// The arithmetic-mean head of upstream neighbors, if any.
    #[must_use]
    pub fn upstream_head(&self) -> f64 {
        self.get_or_zero("upstream_head")
    }

    /// The arithmetic-mean head of downstream neighbors (read from the
    /// start-of-tick snapshot), if any.
    #[must_use]
    pub fn downstream_head(&self) -> f64 {
        self.get_or_zero("downstream_head")
    }

    /// The direct control signal set by a bus handler or an orchestrated
    /// controller, if any.
    #[must_use]
    pub fn control_signal(&self) -> f64 {
        self.get_or_zero("control_signal")
    }

    /// The combined outflow demand of this component's immediate
    /// successors, read from their previous-tick state. Storage
    /// components (e.g. [`crate::Reservoir`]) that sit upstream of a
    /// head-driven actuator use this to size their own release so the
    /// actuator's computed discharge is honored with one tick of lag,
    /// rather than tracking an independently-set outflow target.
    #[must_use]
    pub fn outflow_demand(&self) -> f64 {
        self.get_or_zero("outflow_demand")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_defaults_to_zero() {
        let action = Action::default();
        assert_eq!(action.inflow(), 0.0);
        assert!(!action.contains("inflow"));
    }

    #[test]
    fn test_with_builds_fields() {
        let action = Action::default().with("inflow", 12.5).with("dt", 1.0);
        assert_eq!(action.inflow(), 12.5);
        assert_eq!(action.dt(), 1.0);
        assert!(action.contains("inflow"));
    }
}
