//! Cell-to-session match map construction.
//!
//! The raw index map arrives from the container oriented
//! (sessions × cells), with the upstream tool's 1-based local indices
//! and `0` meaning "not matched in this session". Construction
//! transposes to the canonical (cells × sessions) orientation and
//! applies the off-by-one correction in exactly one place,
//! [`correct_index`].

use ndarray::{Array2, ArrayView2};

/// Integer grid linking global cell identities to per-session local
/// indices. Shape is (num_global_cells × num_sessions), fixed at
/// construction and never altered afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchMap {
    map: Array2<i64>,
}

impl MatchMap {
    /// Sentinel for "not detected/matched in this session".
    pub const UNMATCHED: i64 = -1;

    /// Build a match map from the raw container array.
    ///
    /// No validation is performed here; the bounds and uniqueness
    /// properties of the columns are checked by callers that care
    /// (mirroring the upstream tool, which provides no safety net).
    #[must_use]
    pub fn build(raw: ArrayView2<f64>) -> Self {
        // Raw orientation is (sessions, cells); canonical is
        // (cells, sessions).
        let map = raw.t().mapv(correct_index);
        Self { map }
    }

    /// Reconstruct from an already-corrected grid (artifact loading).
    #[must_use]
    pub fn from_corrected(map: Array2<i64>) -> Self {
        Self { map }
    }

    /// Number of global cell identities (rows).
    #[must_use]
    pub fn num_cells(&self) -> usize {
        self.map.nrows()
    }

    /// Number of sessions (columns).
    #[must_use]
    pub fn num_sessions(&self) -> usize {
        self.map.ncols()
    }

    /// Local index of a global cell within one session, or `None` when
    /// the cell is unmatched there.
    #[must_use]
    pub fn local_index(&self, cell: usize, session: usize) -> Option<usize> {
        let v = self.map[[cell, session]];
        (v != Self::UNMATCHED).then_some(v as usize)
    }

    /// Number of matched cells in one session's column.
    #[must_use]
    pub fn column_cardinality(&self, session: usize) -> usize {
        self.map
            .column(session)
            .iter()
            .filter(|&&v| v != Self::UNMATCHED)
            .count()
    }

    /// The underlying (cells × sessions) grid.
    #[must_use]
    pub fn as_array(&self) -> ArrayView2<'_, i64> {
        self.map.view()
    }
}

/// The single place where the upstream 1-based, 0-as-unmatched indexing
/// convention is corrected: `0 → -1` (sentinel), `v > 0 → v - 1`.
fn correct_index(raw: f64) -> i64 {
    raw as i64 - 1
}
