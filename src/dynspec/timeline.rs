use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::warn;
use ndarray::{Array2, ArrayView2};

use crate::config::SourceId;

// ---------------------------------------------------------------------------
// AlignmentIndex
// ---------------------------------------------------------------------------

/// For each timestamp of a reconciled axis, the raw-record row it came
/// from. Built once per concatenation, consumed by row alignment, then
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentIndex {
    pub positions: Vec<usize>,
}

impl AlignmentIndex {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// True when the index maps every reconciled position to itself, i.e.
    /// the raw axis was already unique and sorted.
    pub fn is_identity(&self) -> bool {
        self.positions.iter().enumerate().all(|(i, &p)| i == p)
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Deduplicate a concatenated, possibly out-of-order timestamp sequence.
///
/// Exact duplicates keep their first occurrence (stable); the result is the
/// strictly increasing axis of unique timestamps plus the index of the raw
/// row backing each one. An already-unique ascending input maps to itself.
pub fn dedup_first(times: &[DateTime<Utc>]) -> (Vec<DateTime<Utc>>, AlignmentIndex) {
    let mut first_seen: BTreeMap<DateTime<Utc>, usize> = BTreeMap::new();
    for (row, &t) in times.iter().enumerate() {
        first_seen.entry(t).or_insert(row);
    }
    let mut axis = Vec::with_capacity(first_seen.len());
    let mut positions = Vec::with_capacity(first_seen.len());
    for (t, row) in first_seen {
        axis.push(t);
        positions.push(row);
    }
    (axis, AlignmentIndex { positions })
}

/// Align raw intensity rows onto a unique, sorted target axis.
///
/// Each raw record's timestamp is binary-searched in the target axis; rows
/// whose timestamp is absent from the target (e.g. a file extending past
/// the requested window) are discarded, and a duplicate timestamp keeps its
/// first occurrence. Rows the target axis has no record for stay NaN.
///
/// A length mismatch between the timestamp sequence and the available data
/// rows is a reportable warning, not a fatal error: the shorter of the two
/// bounds the rows considered.
pub fn align_rows(
    source: SourceId,
    target: &[DateTime<Utc>],
    raw_times: &[DateTime<Utc>],
    data: ArrayView2<f64>,
) -> Array2<f64> {
    let usable = raw_times.len().min(data.nrows());
    if raw_times.len() != data.nrows() {
        warn!(
            "{source}: {} timestamps vs {} data rows; aligning the first {usable}",
            raw_times.len(),
            data.nrows()
        );
    }

    let mut out = Array2::from_elem((target.len(), data.ncols()), f64::NAN);
    let mut filled = vec![false; target.len()];
    let mut dropped = 0usize;
    for row in 0..usable {
        match target.binary_search(&raw_times[row]) {
            Ok(pos) if !filled[pos] => {
                out.row_mut(pos).assign(&data.row(row));
                filled[pos] = true;
            }
            Ok(_) => {} // exact duplicate; first occurrence already won
            Err(_) => dropped += 1,
        }
    }
    if dropped > 0 {
        warn!("{source}: discarded {dropped} record(s) outside the reconciled time axis");
    }
    out
}

/// Full reconciliation of one instrument's concatenated files: build the
/// unique sorted axis, then select the matching intensity rows.
pub fn reconcile(
    source: SourceId,
    times: &[DateTime<Utc>],
    data: ArrayView2<f64>,
) -> (Vec<DateTime<Utc>>, Array2<f64>) {
    let (axis, _index) = dedup_first(times);
    let aligned = align_rows(source, &axis, times, data);
    (axis, aligned)
}
