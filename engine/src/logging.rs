//! Study event log: one tab-separated line per event.
//!
//! Schema: `<HH:MM:SS.ffff>\t<event-name>[\t<payload>]`. The log is
//! observability, not control: a failed write warns once, disables the
//! sink, and never interrupts the gaze tick.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{Local, Timelike};
use tracing::warn;

use crate::arbiter::GazeEvent;

/// Best-effort line sink for gaze events.
pub struct EventLog {
    sink: Option<Box<dyn Write + Send>>,
    failed: bool,
}

impl EventLog {
    /// Log that drops everything.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            failed: false,
        }
    }

    /// Log appending to a freshly created file.
    pub fn to_file(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(BufWriter::new(file))))
    }

    /// Log writing to an arbitrary sink.
    pub fn from_writer(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Some(sink),
            failed: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some() && !self.failed
    }

    /// Write one timestamped event line. Best effort.
    pub fn record(&mut self, event: &GazeEvent) {
        if self.failed {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let now = Local::now();
        // `HH:MM:SS.ffff`: four fractional digits (ten-thousandths of a
        // second). chrono has no `%.4f` specifier, so render the
        // whole-second part and append the truncated fraction explicitly.
        let stamp = now.format("%H:%M:%S");
        let frac = now.nanosecond() / 100_000;
        let result = match event.payload() {
            Some(payload) => writeln!(
                sink,
                "{}.{:04}\t{}\t{}",
                stamp,
                frac,
                event.name(),
                payload
            ),
            None => writeln!(sink, "{}.{:04}\t{}", stamp, frac, event.name()),
        };
        if let Err(e) = result {
            warn!("event log write failed, disabling sink: {}", e);
            self.failed = true;
        }
    }

    /// Flush buffered lines, e.g. at the end of a sequence.
    pub fn flush(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!("event log flush failed: {}", e);
                self.failed = true;
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────
