//! The per-tick snapshot recorded into a harness's history.

use std::collections::BTreeMap;

use swp_bus::Fields;

/// One tick's recorded snapshot: simulated time and every component's
/// post-step state, keyed by component ID.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TickResult {
    pub tick: u64,
    pub time: f64,
    pub states: BTreeMap<String, Fields>,
}
