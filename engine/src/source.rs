//! Seam to the gaze observation sensors.
//!
//! The arbiter polls one grid location per tick and never computes the
//! value itself. Sources may report stale or unchanged values; anything
//! malformed reads as "no gaze" rather than an error.

use std::collections::VecDeque;

use crate::grid::{NO_GAZE, PERSON_CELL};

/// Contract implemented by gaze observation sources.
pub trait ObservationSource {
    /// Latest grid cell the user appears to be looking at: 0 for none,
    /// 1-18 for table cells, 19 for the agent.
    fn grid_location(&mut self) -> u8;
}

/// Parse one line of gaze-tracker wire text, e.g. `Grid: 12`.
///
/// The tracker counts cells from 0, so on-table values shift up by one;
/// 99 means gaze at the agent and -1 means no grid location. Malformed
/// input reads as no gaze.
pub fn parse_grid_message(line: &str) -> u8 {
    let Some(rest) = line.trim().strip_prefix("Grid:") else {
        return NO_GAZE;
    };
    match rest.trim().parse::<i32>() {
        Ok(99) => PERSON_CELL,
        Ok(n) if (0..=17).contains(&n) => (n + 1) as u8,
        _ => NO_GAZE,
    }
}

// ── Scripted source ─────────────────────────────────────────

/// Fixed-timeline observation source for the driver and tests. Holds each
/// scripted cell for a number of ticks, then keeps reporting the last
/// cell once the script runs out.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    frames: VecDeque<u8>,
    last: u8,
}

impl ScriptedSource {
    /// Build from (cell, tick-count) segments.
    pub fn from_segments(segments: &[(u8, usize)]) -> Self {
        let mut frames = VecDeque::new();
        for &(cell, ticks) in segments {
            for _ in 0..ticks {
                frames.push_back(cell);
            }
        }
        Self {
            frames,
            last: NO_GAZE,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.frames.is_empty()
    }
}

impl ObservationSource for ScriptedSource {
    fn grid_location(&mut self) -> u8 {
        if let Some(cell) = self.frames.pop_front() {
            self.last = cell;
        }
        self.last
    }
}

// ── Tests ───────────────────────────────────────────────────
