//! Disturbance agents: inject exogenous inflow/outflow on an activation
//! window.

use std::path::Path;

use swp_bus::{Fields, Message, Topic};
use swp_diag::SimError;

use super::{Agent, AgentContext};

/// Publishes a constant `inflow_rate` while `current_time` is within
/// `[start_time, end_time)`, and `0.0` outside it.
pub struct RainfallAgent {
    id: String,
    topic: Topic,
    start_time: f64,
    end_time: f64,
    rate: f64,
}

impl RainfallAgent {
    #[must_use]
    pub fn new(id: impl Into<String>, topic: impl Into<Topic>, start_time: f64, end_time: f64, rate: f64) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            start_time,
            end_time,
            rate,
        }
    }

    fn active(&self, current_time: f64) -> bool {
        current_time >= self.start_time && current_time < self.end_time
    }
}

impl Agent for RainfallAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let value = if self.active(ctx.current_time) { self.rate } else { 0.0 };
        let mut fields = Fields::new();
        fields.insert("inflow_rate".to_string(), value.into());
        let mut message = Message::new(fields);
        message.tick = ctx.tick;
        message.time = ctx.current_time;
        let _ = ctx.bus.publish(self.topic.clone(), message);
    }
}

/// Like [`RainfallAgent`], but the rate within the activation window is
/// computed by a caller-supplied formula of elapsed time since
/// `start_time`, rather than held constant.
pub struct DynamicRainfallAgent {
    id: String,
    topic: Topic,
    start_time: f64,
    end_time: f64,
    formula: Box<dyn FnMut(f64) -> f64>,
}

impl DynamicRainfallAgent {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<Topic>,
        start_time: f64,
        end_time: f64,
        formula: impl FnMut(f64) -> f64 + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            start_time,
            end_time,
            formula: Box::new(formula),
        }
    }
}

impl Agent for DynamicRainfallAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let active = ctx.current_time >= self.start_time && ctx.current_time < self.end_time;
        let value = if active {
            (self.formula)(ctx.current_time - self.start_time)
        } else {
            0.0
        };
        let mut fields = Fields::new();
        fields.insert("inflow_rate".to_string(), value.into());
        let mut message = Message::new(fields);
        message.tick = ctx.tick;
        message.time = ctx.current_time;
        let _ = ctx.bus.publish(self.topic.clone(), message);
    }
}

/// Publishes a constant `outflow_rate` while active, modeling scheduled
/// water withdrawal.
pub struct WaterUseAgent {
    id: String,
    topic: Topic,
    start_time: f64,
    end_time: f64,
    rate: f64,
}

impl WaterUseAgent {
    #[must_use]
    pub fn new(id: impl Into<String>, topic: impl Into<Topic>, start_time: f64, end_time: f64, rate: f64) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            start_time,
            end_time,
            rate,
        }
    }
}

impl Agent for WaterUseAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let active = ctx.current_time >= self.start_time && ctx.current_time < self.end_time;
        let value = if active { self.rate } else { 0.0 };
        let mut fields = Fields::new();
        fields.insert("outflow_rate".to_string(), value.into());
        let mut message = Message::new(fields);
        message.tick = ctx.tick;
        message.time = ctx.current_time;
        let _ = ctx.bus.publish(self.topic.clone(), message);
    }
}

/// Reads `(time, value)` pairs from a CSV file at construction and
/// publishes the most recent sample whose time has been reached, as
/// `inflow_rate`. Samples are held constant between rows (zero-order hold).
pub struct CsvInflowAgent {
    id: String,
    topic: Topic,
    samples: Vec<(f64, f64)>,
}

impl CsvInflowAgent {
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if the file cannot be opened or
    /// a row fails to parse as `(time, value)`.
    pub fn from_csv(
        id: impl Into<String>,
        topic: impl Into<Topic>,
        path: impl AsRef<Path>,
    ) -> Result<Self, SimError> {
        let mut reader = csv::Reader::from_path(path.as_ref()).map_err(|e| SimError::InvalidConfig {
            reason: format!("failed to open csv inflow file {}: {e}", path.as_ref().display()),
        })?;

        let mut samples = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| SimError::InvalidConfig {
                reason: format!("malformed csv inflow row: {e}"),
            })?;
            let time: f64 = record.get(0).and_then(|s| s.parse().ok()).ok_or_else(|| {
                SimError::InvalidConfig {
                    reason: "csv inflow row missing numeric time column".to_string(),
                }
            })?;
            let value: f64 = record.get(1).and_then(|s| s.parse().ok()).ok_or_else(|| {
                SimError::InvalidConfig {
                    reason: "csv inflow row missing numeric value column".to_string(),
                }
            })?;
            samples.push((time, value));
        }
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(Self {
            id: id.into(),
            topic: topic.into(),
            samples,
        })
    }

    fn value_at(&self, current_time: f64) -> f64 {
        self.samples
            .iter()
            .rev()
            .find(|(time, _)| *time <= current_time)
            .map_or(0.0, |(_, value)| *value)
    }
}

impl Agent for CsvInflowAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn run(&mut self, ctx: &AgentContext) {
        let value = self.value_at(ctx.current_time);
        let mut fields = Fields::new();
        fields.insert("inflow_rate".to_string(), value.into());
        let mut message = Message::new(fields);
        message.tick = ctx.tick;
        message.time = ctx.current_time;
        let _ = ctx.bus.publish(self.topic.clone(), message);
    }
}
