//! Optional streaming-sink hook for long runs, per the harness's memory
//! model: history is append-only by default, but a sink can flush each
//! tick to disk instead of retaining everything in memory.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use swp_diag::SimError;

use crate::tick::TickResult;

/// Receives every [`TickResult`] as it is produced, in addition to (or
/// instead of) the in-memory `history` vector.
pub trait HistorySink {
    /// Called once per tick, immediately after the tick's snapshot is
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if the sink fails to persist the tick.
    fn on_tick(&mut self, result: &TickResult) -> Result<(), SimError>;
}

/// A sink that discards every tick; the default when no streaming sink is
/// configured.
#[derive(Debug, Default)]
pub struct NullSink;

impl HistorySink for NullSink {
    fn on_tick(&mut self, _result: &TickResult) -> Result<(), SimError> {
        Ok(())
    }
}

/// Writes one JSON object per line, flushing after every tick.
pub struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// # Errors
    ///
    /// Returns [`SimError::Io`] if `path` cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl HistorySink for JsonLinesSink {
    fn on_tick(&mut self, result: &TickResult) -> Result<(), SimError> {
        let line = serde_json::to_string(result)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}
