//! Tabletop grid vocabulary and gaze fusion.
//!
//! The shared workspace is a 6-column x 3-row grid of 18 cells, numbered
//! left-to-right, bottom-to-top. Cell 0 means "no gaze target" and cell 19
//! is the pseudo-cell for the agent/person. Head-direction sensors are too
//! coarse to pin a single cell, so an observation can be expanded into its
//! bounds-checked 3x3 neighborhood before the arbiter consumes it.

/// No detected gaze target.
pub const NO_GAZE: u8 = 0;

/// Pseudo-cell for gaze directed at the agent/person.
pub const PERSON_CELL: u8 = 19;

/// Number of physical grid cells.
pub const GRID_CELLS: u8 = 18;

/// Columns in the grid.
pub const GRID_COLS: u8 = 6;

/// Rows in the grid.
pub const GRID_ROWS: u8 = 3;

/// Whether a value names a physical cell (1-18).
pub fn is_grid_cell(cell: u8) -> bool {
    (1..=GRID_CELLS).contains(&cell)
}

/// Zero-based row of a physical cell, counted bottom-to-top.
pub fn row(cell: u8) -> Option<u8> {
    is_grid_cell(cell).then(|| (cell - 1) / GRID_COLS)
}

/// Zero-based column of a physical cell, counted left-to-right.
pub fn col(cell: u8) -> Option<u8> {
    is_grid_cell(cell).then(|| (cell - 1) % GRID_COLS)
}

/// Derive the set of plausible current gaze cells from a raw observation.
///
/// Without expansion, or for 0 / 19 / out-of-range values, the set is just
/// the observation itself. With expansion the observed cell's vertical
/// neighbors are added, then each horizontally adjacent column that exists
/// (no wrapping across row boundaries) contributes its own vertical
/// triple. The first element is always the raw observation; the result
/// holds at most 9 cells and no duplicates.
pub fn candidate_set(observation: u8, expand: bool) -> Vec<u8> {
    if !expand || !is_grid_cell(observation) {
        return vec![observation];
    }

    let c = observation as i16;
    let mut cells: Vec<u8> = vec![observation];
    let mut add = |v: i16| {
        if (1..=GRID_CELLS as i16).contains(&v) {
            cells.push(v as u8);
        }
    };

    // the column including the observed cell
    add(c + 6);
    add(c - 6);

    // the column to the right
    if c % 6 != 0 {
        add(c + 1);
        add(c + 7);
        add(c - 5);
    }

    // the column to the left
    if c % 6 != 1 {
        add(c - 1);
        add(c + 5);
        add(c - 7);
    }

    cells
}

// ── Tests ───────────────────────────────────────────────────
