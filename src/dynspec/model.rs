use chrono::{DateTime, Utc};
use log::warn;
use ndarray::{s, Array2};

use crate::config::SourceId;

// ---------------------------------------------------------------------------
// Spectrogram – one instrument's time/frequency intensity map
// ---------------------------------------------------------------------------

/// Unit state of the intensity matrix. Tracked explicitly so a stage can
/// refuse input it was never meant to see (re-running the background
/// normalizer, fusing raw counts against log power, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityUnit {
    /// Straight out of an adapter: raw digitizer counts.
    RawCounts,
    /// log10 of the clipped raw counts.
    LogPower,
    /// Baseline-subtracted (raw or log) intensity.
    BackgroundSubtracted,
}

/// One instrument's dynamic spectrum: a strictly increasing time axis, a
/// strictly increasing frequency axis in MHz, and an `(Nt, Nf)` intensity
/// matrix. NaN cells mean "no measurement" (synthetic gap channels, dropped
/// samples).
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub source: SourceId,
    pub times: Vec<DateTime<Utc>>,
    pub freqs: Vec<f64>,
    pub data: Array2<f64>,
    pub unit: IntensityUnit,
}

impl Spectrogram {
    /// An empty spectrogram: the "no data for this source" value. Every
    /// downstream stage treats it as a no-op contributor.
    pub fn empty(source: SourceId) -> Self {
        Spectrogram {
            source,
            times: Vec::new(),
            freqs: Vec::new(),
            data: Array2::zeros((0, 0)),
            unit: IntensityUnit::RawCounts,
        }
    }

    /// Assemble a spectrogram, restoring the shape invariant
    /// `data.shape() == [times.len(), freqs.len()]` by truncating to the
    /// shorter axis where the lengths disagree. The mismatch is reported;
    /// it is never handed downstream unresolved.
    pub fn from_parts(
        source: SourceId,
        mut times: Vec<DateTime<Utc>>,
        mut freqs: Vec<f64>,
        mut data: Array2<f64>,
        unit: IntensityUnit,
    ) -> Self {
        let nt = times.len().min(data.nrows());
        let nf = freqs.len().min(data.ncols());
        if times.len() != data.nrows() {
            warn!(
                "{source}: time axis has {} entries but data has {} rows; truncating to {nt}",
                times.len(),
                data.nrows()
            );
        }
        if freqs.len() != data.ncols() {
            warn!(
                "{source}: frequency axis has {} entries but data has {} columns; truncating to {nf}",
                freqs.len(),
                data.ncols()
            );
        }
        times.truncate(nt);
        freqs.truncate(nf);
        if data.dim() != (nt, nf) {
            data = data.slice_move(s![..nt, ..nf]);
        }
        Spectrogram {
            source,
            times,
            freqs,
            data,
            unit,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty() || self.freqs.is_empty()
    }

    /// Native frequency coverage interval `[min, max]` in MHz, ignoring
    /// synthetic NaN gap channels' intensities (the axis itself is real).
    pub fn freq_coverage(&self) -> Option<(f64, f64)> {
        match (self.freqs.first(), self.freqs.last()) {
            (Some(&lo), Some(&hi)) => Some((lo, hi)),
            _ => None,
        }
    }

    pub fn time_coverage(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match (self.times.first(), self.times.last()) {
            (Some(&t0), Some(&t1)) => Some((t0, t1)),
            _ => None,
        }
    }

    /// Median sample spacing in seconds. `None` for fewer than two samples.
    pub fn native_cadence(&self) -> Option<f64> {
        if self.times.len() < 2 {
            return None;
        }
        let mut deltas: Vec<i64> = self
            .times
            .windows(2)
            .filter_map(|w| (w[1] - w[0]).num_microseconds())
            .collect();
        if deltas.is_empty() {
            return None;
        }
        deltas.sort_unstable();
        Some(deltas[deltas.len() / 2] as f64 * 1e-6)
    }
}

// ---------------------------------------------------------------------------
// FusionGrid – the fused product
// ---------------------------------------------------------------------------

/// The common time/frequency lattice after merging all contributing
/// instruments. Cells no instrument covers are NaN.
#[derive(Debug, Clone)]
pub struct FusionGrid {
    /// Fixed-cadence time axis spanning the requested window.
    pub times: Vec<DateTime<Utc>>,
    /// Union of contributing frequencies inside the requested range,
    /// deduplicated and ascending.
    pub freqs: Vec<f64>,
    /// `(times.len(), freqs.len())` intensity matrix; NaN = missing.
    pub data: Array2<f64>,
}

impl FusionGrid {
    /// Fraction of cells with no covering instrument.
    pub fn missing_fraction(&self) -> f64 {
        if self.data.is_empty() {
            return 1.0;
        }
        let missing = self.data.iter().filter(|v| v.is_nan()).count();
        missing as f64 / self.data.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn from_parts_truncates_one_excess_time_row() {
        // 3 timestamps, 2 data rows: the classic edge-record disagreement.
        let data = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let sp = Spectrogram::from_parts(
            SourceId::SingleDish,
            vec![t(0), t(1), t(2)],
            vec![10.0, 20.0],
            data,
            IntensityUnit::RawCounts,
        );
        assert_eq!(sp.times.len(), 2);
        assert_eq!(sp.data.dim(), (2, 2), "shape invariant must hold");
        assert_eq!(sp.data.dim(), (sp.times.len(), sp.freqs.len()));
    }

    #[test]
    fn from_parts_truncates_excess_data_rows() {
        let data = Array2::zeros((3, 2));
        let sp = Spectrogram::from_parts(
            SourceId::SweepSpectrograph,
            vec![t(0), t(1)],
            vec![10.0, 20.0],
            data,
            IntensityUnit::RawCounts,
        );
        assert_eq!(sp.data.dim(), (2, 2));
    }

    #[test]
    fn empty_spectrogram_is_a_no_op_contributor() {
        let sp = Spectrogram::empty(SourceId::TiledLow);
        assert!(sp.is_empty());
        assert!(sp.freq_coverage().is_none());
        assert!(sp.native_cadence().is_none());
    }

    #[test]
    fn native_cadence_is_median_spacing() {
        let data = Array2::zeros((4, 1));
        let sp = Spectrogram::from_parts(
            SourceId::TiledHigh,
            vec![t(0), t(1), t(2), t(10)],
            vec![100.0],
            data,
            IntensityUnit::RawCounts,
        );
        // Spacings 1, 1, 8 s; the median ignores the file-boundary jump.
        assert_eq!(sp.native_cadence(), Some(1.0));
    }
}
